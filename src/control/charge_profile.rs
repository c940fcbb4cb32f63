//! Charge-current profile selection
//!
//! Maps the battery voltage to a charger current limit in three bands:
//!
//! ```text
//!   battery_mv < precharge_below        -> precharge_ma   (pre-charge)
//!   precharge_below <= mv < taper_from  -> fast_ma        (fast charge)
//!   battery_mv >= taper_from            -> taper_ma       (taper)
//! ```
//!
//! No hysteresis at this layer: a reading that crosses a band edge
//! changes the target immediately.

use log::{info, warn};

use crate::app::ports::ActuatorPort;
use crate::config::ChargeProfileConfig;
use crate::error::ActuatorError;

/// Charging phase implied by the band the voltage falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePhase {
    PreCharge,
    Fast,
    Taper,
}

/// Selected phase and current limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeTarget {
    pub phase: ChargePhase,
    pub current_ma: u16,
}

/// Pure band lookup plus the last value successfully written to the charger.
pub struct ChargeProfileSelector {
    config: ChargeProfileConfig,
    applied: Option<ChargeTarget>,
}

impl ChargeProfileSelector {
    pub fn new(config: ChargeProfileConfig) -> Self {
        Self {
            config,
            applied: None,
        }
    }

    /// Band lookup.  Pure; no side effects.
    pub fn select(&self, battery_mv: u16) -> ChargeTarget {
        let c = &self.config;
        if battery_mv < c.precharge_below_mv {
            ChargeTarget {
                phase: ChargePhase::PreCharge,
                current_ma: c.precharge_ma,
            }
        } else if battery_mv < c.taper_from_mv {
            ChargeTarget {
                phase: ChargePhase::Fast,
                current_ma: c.fast_ma,
            }
        } else {
            ChargeTarget {
                phase: ChargePhase::Taper,
                current_ma: c.taper_ma,
            }
        }
    }

    /// Select and program the charger.
    ///
    /// The charger is only written when the target differs from the last
    /// successful write.  A failed write is returned, not retried; the
    /// next poll re-issues it because `applied` was cleared.
    pub fn apply(
        &mut self,
        battery_mv: u16,
        hw: &mut (impl ActuatorPort + ?Sized),
    ) -> Result<ChargeTarget, ActuatorError> {
        let target = self.select(battery_mv);
        if self.applied == Some(target) {
            return Ok(target);
        }

        match hw.set_charge_current(target.current_ma) {
            Ok(()) => {
                if self.applied.map(|t| t.phase) != Some(target.phase) {
                    info!(
                        "Charge profile: {:?} at {} mV -> {} mA",
                        target.phase, battery_mv, target.current_ma
                    );
                }
                self.applied = Some(target);
                Ok(target)
            }
            Err(e) => {
                warn!("Charge profile: set {} mA failed: {e}", target.current_ma);
                self.applied = None;
                Err(e)
            }
        }
    }

    /// Last target the charger acknowledged.
    pub fn applied(&self) -> Option<ChargeTarget> {
        self.applied
    }

    /// Forget the applied target (the charger was reset or disabled).
    pub fn reset(&mut self) {
        self.applied = None;
    }
}
