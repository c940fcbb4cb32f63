//! Port traits: the boundary between the control core and the charger,
//! cell-monitor and power-switch drivers.
//!
//! ```text
//!   Driver adapter ──▶ Port trait ──▶ PowerPathController (core)
//! ```
//!
//! Register maps, bus speeds and peripheral families live entirely on the
//! adapter side.  Every call is fallible with a transport-level error; the
//! core decides whether a failure is retried on the next poll or escalated.

use serde::{Deserialize, Serialize};

use crate::error::{ActuatorError, SensorError};
use crate::sensors::{CellVoltages, FaultBits, PackTelemetry};

// ───────────────────────────────────────────────────────────────
// Power path selection
// ───────────────────────────────────────────────────────────────

/// Which source feeds the system rail.
///
/// A single value, so "at most one path enabled" holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PowerPath {
    /// Every enable signal de-asserted.
    #[default]
    Off = 0,
    /// USB-PD 60 W input through the charger.
    Usb60W = 1,
    /// USB-PD 100 W input through the charger.
    Usb100W = 2,
    /// Solar input through the MPPT stage.
    Mppt = 3,
    /// Battery output switch closed (discharging).
    Battery = 4,
}

impl PowerPath {
    /// True when this path charges the battery.
    pub fn is_charging(self) -> bool {
        matches!(self, Self::Usb60W | Self::Usb100W | Self::Mppt)
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driver → core)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the sampler calls this once per poll.
pub trait SensorPort {
    /// Per-cell voltages (mV), lowest cell first.
    fn read_cell_voltages(&mut self) -> Result<CellVoltages, SensorError>;

    /// Bus / battery voltage and current.
    fn read_pack_telemetry(&mut self) -> Result<PackTelemetry, SensorError>;

    /// Latched protection flags from the charger and cell monitor.
    fn read_fault_flags(&mut self) -> Result<FaultBits, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (core → driver)
// ───────────────────────────────────────────────────────────────

/// Write-side port: state actions and the control loops command outputs
/// through this.
pub trait ActuatorPort {
    /// Select the active power path.  Implementations break before make.
    fn set_power_path(&mut self, path: PowerPath) -> Result<(), ActuatorError>;

    /// Program the charger's current limit (mA).  `0` disables charging.
    fn set_charge_current(&mut self, ma: u16) -> Result<(), ActuatorError>;

    /// Bit `n` set = bleed resistor on cell `n`.
    fn set_balancing_mask(&mut self, mask: u8) -> Result<(), ActuatorError>;

    /// Drive every output to its safe level.
    ///
    /// Power path first.  Every step is attempted even if an earlier one
    /// fails; the first error is returned.
    fn all_off(&mut self) -> Result<(), ActuatorError> {
        let path = self.set_power_path(PowerPath::Off);
        let current = self.set_charge_current(0);
        let mask = self.set_balancing_mask(0);
        path.and(current).and(mask)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (core → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
