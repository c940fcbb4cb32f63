//! Cell-balancing hysteresis controller
//!
//! Two logical states held in one flag:
//!
//! ```text
//!            spread >= delta_start && min >= min_cell
//!   IDLE ─────────────────────────────────────────────▶ ACTIVE
//!     ▲                                                   │
//!     └───────── spread <= delta_stop || min < min_cell ──┘
//! ```
//!
//! While active, every cell within `delta_stop / 2` of the highest cell
//! and strictly above `min_cell` gets its bleed resistor.  While idle the
//! mask is zero.

use log::{info, warn};

use crate::app::ports::ActuatorPort;
use crate::config::BalancingConfig;
use crate::error::ActuatorError;

/// Hysteresis state plus the last mask the monitor acknowledged.
pub struct BalancingEvaluator {
    config: BalancingConfig,
    active: bool,
    applied_mask: Option<u8>,
}

impl BalancingEvaluator {
    pub fn new(config: BalancingConfig) -> Self {
        Self {
            config,
            active: false,
            applied_mask: None,
        }
    }

    /// Update the hysteresis from fresh cell voltages and return the mask.
    ///
    /// An empty sample forces idle.
    pub fn evaluate(&mut self, cells: &[u16]) -> u8 {
        let (Some(&min), Some(&max)) = (cells.iter().min(), cells.iter().max()) else {
            self.set_active(false, 0, 0);
            return 0;
        };
        let spread = max - min;
        let BalancingConfig {
            delta_start_mv,
            delta_stop_mv,
            min_cell_mv,
        } = self.config;

        let next = if self.active {
            !(spread <= delta_stop_mv || min < min_cell_mv)
        } else {
            spread >= delta_start_mv && min >= min_cell_mv
        };
        self.set_active(next, spread, min);

        if !self.active {
            return 0;
        }

        let floor = max.saturating_sub(delta_stop_mv / 2);
        cells
            .iter()
            .take(8)
            .enumerate()
            .filter(|&(_, &mv)| mv >= floor && mv > min_cell_mv)
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }

    /// Evaluate and command the cell monitor.
    ///
    /// Returns the mask now in effect.  `Err` means the mask could not be
    /// commanded, which is distinct from `Ok(0)` (balancing off).
    pub fn apply(
        &mut self,
        cells: &[u16],
        hw: &mut (impl ActuatorPort + ?Sized),
    ) -> Result<u8, ActuatorError> {
        let mask = self.evaluate(cells);
        if self.applied_mask == Some(mask) {
            return Ok(mask);
        }

        match hw.set_balancing_mask(mask) {
            Ok(()) => {
                self.applied_mask = Some(mask);
                Ok(mask)
            }
            Err(e) => {
                warn!("Balancing: set mask 0b{mask:08b} failed: {e}");
                self.applied_mask = None;
                Err(e)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Last mask the monitor acknowledged.
    pub fn applied_mask(&self) -> Option<u8> {
        self.applied_mask
    }

    /// Drop to idle without touching hardware (outputs were already cut).
    pub fn force_idle(&mut self) {
        self.active = false;
        self.applied_mask = None;
    }

    fn set_active(&mut self, next: bool, spread: u16, min: u16) {
        if next != self.active {
            if next {
                info!("Balancing: start (spread {spread} mV, min {min} mV)");
            } else {
                info!("Balancing: stop (spread {spread} mV, min {min} mV)");
            }
        }
        self.active = next;
    }
}
