//! Power-path configuration parameters
//!
//! All tunable thresholds, periods and the cell count.  The core never
//! loads this itself; the integrator passes a validated value to
//! [`PowerPathController::new`](crate::app::service::PowerPathController::new).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on series cells the core can track (sizes every cell buffer).
pub const MAX_CELLS: usize = 8;

/// Core power-path configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerPathConfig {
    pub cells: CellConfig,
    pub charge_profile: ChargeProfileConfig,
    pub balancing: BalancingConfig,
    pub schedule: ScheduleConfig,
    pub safety: SafetyConfig,
}

/// Pack topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    /// Number of series cells reported by the cell monitor.
    pub count: u8,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Voltage bands for charge-current selection (per-cell millivolts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeProfileConfig {
    /// Below this voltage the pack is pre-charged.
    pub precharge_below_mv: u16,
    /// At or above this voltage the current tapers.
    pub taper_from_mv: u16,
    pub precharge_ma: u16,
    pub fast_ma: u16,
    pub taper_ma: u16,
}

impl Default for ChargeProfileConfig {
    fn default() -> Self {
        Self {
            precharge_below_mv: 3000,
            taper_from_mv: 3650,
            precharge_ma: 100,
            fast_ma: 5000,
            taper_ma: 1000,
        }
    }
}

/// Cell-balancing hysteresis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingConfig {
    /// Spread (max - min) that starts balancing.
    pub delta_start_mv: u16,
    /// Spread at or below which balancing stops.
    pub delta_stop_mv: u16,
    /// No balancing while any cell sits below this floor.
    pub min_cell_mv: u16,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            delta_start_mv: 25,
            delta_stop_mv: 10,
            min_cell_mv: 3200,
        }
    }
}

/// Scheduler cadence, expressed in base ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Duration of one `tick()` (informational; the caller owns the timer).
    pub base_tick_ms: u32,
    /// Telemetry poll period; the charge profile follows every fresh sample.
    pub sensor_poll_ticks: u32,
    pub balancing_ticks: u32,
    /// How long `Standby` may last before `Timeout` returns it to `Idle`.
    pub standby_timeout_ticks: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_tick_ms: 10,
            sensor_poll_ticks: 10,       // 100 ms
            balancing_ticks: 500,        // 5 s
            standby_timeout_ticks: 3000, // 30 s
        }
    }
}

/// Limits evaluated by the safety supervisor and charge-termination check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub max_charge_current_ma: i32,
    pub max_discharge_current_ma: i32,
    pub over_temperature_c: i16,
    /// Consecutive failed polls before `CommFault` is raised.
    pub comm_fault_threshold: u8,
    /// Per-cell voltage at which charging is considered complete.
    pub charge_done_cell_mv: u16,
    /// Charge current at or below which charging is considered complete.
    pub termination_current_ma: i32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_charge_current_ma: 6000,
            max_discharge_current_ma: 8000,
            over_temperature_c: 60,
            comm_fault_threshold: 3,
            charge_done_cell_mv: 3600,
            termination_current_ma: 150,
        }
    }
}

impl PowerPathConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the control loops unsafe or inert.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cells.count == 0 || self.cells.count as usize > MAX_CELLS {
            return Err(ConfigError::ValidationFailed("cells.count out of range"));
        }

        let p = &self.charge_profile;
        if p.precharge_below_mv >= p.taper_from_mv {
            return Err(ConfigError::ValidationFailed(
                "charge_profile.precharge_below_mv must be below taper_from_mv",
            ));
        }

        let b = &self.balancing;
        if b.delta_stop_mv >= b.delta_start_mv {
            return Err(ConfigError::ValidationFailed(
                "balancing.delta_stop_mv must be below delta_start_mv",
            ));
        }

        let s = &self.schedule;
        if s.sensor_poll_ticks == 0 || s.balancing_ticks == 0 || s.standby_timeout_ticks == 0 {
            return Err(ConfigError::ValidationFailed("schedule periods must be non-zero"));
        }

        if self.safety.comm_fault_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "safety.comm_fault_threshold must be non-zero",
            ));
        }
        if self.safety.max_charge_current_ma <= 0 || self.safety.max_discharge_current_ma <= 0 {
            return Err(ConfigError::ValidationFailed("safety current limits must be positive"));
        }

        Ok(())
    }
}
