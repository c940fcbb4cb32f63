//! Telemetry subsystem: snapshot types and the [`TelemetrySampler`].
//!
//! The sampler wraps the [`SensorPort`](crate::app::ports::SensorPort)
//! collaborators and produces one [`TelemetrySnapshot`] per poll.  Each
//! channel carries its own freshness flag so a failed read never
//! corrupts the last-known-good values of the other channels.

pub mod telemetry;

use serde::{Deserialize, Serialize};

use crate::config::MAX_CELLS;

pub use telemetry::TelemetrySampler;

/// Per-cell voltages in millivolts, captured in one read.
pub type CellVoltages = heapless::Vec<u16, MAX_CELLS>;

/// Bus and battery measurements from the charger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackTelemetry {
    /// Input bus voltage (mV).
    pub bus_mv: u16,
    /// Input bus current (mA).
    pub bus_ma: i32,
    /// Pack voltage (mV).
    pub batt_mv: u16,
    /// Pack current (mA), positive into the battery.
    pub batt_ma: i32,
    /// Pack temperature (°C).
    pub temperature_c: i16,
}

// ── Fault bits ────────────────────────────────────────────────

/// Individual protection flags reported by the charger / cell monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultFlag {
    /// Cell monitor ALERT (OV/UV/SCD latched in the IC).
    BmsAlert = 0b0000_0001,
    /// Charger IC fault register non-zero.
    ChargerFault = 0b0000_0010,
    /// Thermistor beyond the IC's hot threshold.
    OverTemperature = 0b0000_0100,
    /// Over-current comparator tripped.
    OverCurrent = 0b0000_1000,
}

impl FaultFlag {
    pub const ALL: [FaultFlag; 4] = [
        FaultFlag::BmsAlert,
        FaultFlag::ChargerFault,
        FaultFlag::OverTemperature,
        FaultFlag::OverCurrent,
    ];

    /// Return the bitmask for this flag.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for FaultFlag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BmsAlert => write!(f, "BMS alert"),
            Self::ChargerFault => write!(f, "charger fault"),
            Self::OverTemperature => write!(f, "over temperature"),
            Self::OverCurrent => write!(f, "over current"),
        }
    }
}

/// Bitset of [`FaultFlag`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultBits(pub u8);

impl FaultBits {
    pub const NONE: FaultBits = FaultBits(0);

    pub fn contains(self, flag: FaultFlag) -> bool {
        self.0 & flag.mask() != 0
    }

    #[must_use]
    pub fn with(self, flag: FaultFlag) -> Self {
        Self(self.0 | flag.mask())
    }

    pub fn is_clear(self) -> bool {
        self.0 == 0
    }
}

// ── Snapshot ──────────────────────────────────────────────────

/// Latest telemetry with per-channel freshness.
///
/// A channel whose read failed keeps its previous value and has its
/// `*_fresh` flag cleared for this poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub cells: CellVoltages,
    pub pack: PackTelemetry,
    pub faults: FaultBits,
    pub cells_fresh: bool,
    pub pack_fresh: bool,
    pub faults_fresh: bool,
    /// Poll counter at which this snapshot was taken.
    pub sequence: u32,
}

impl TelemetrySnapshot {
    /// Every channel was read successfully on the latest poll.
    pub fn is_complete(&self) -> bool {
        self.cells_fresh && self.pack_fresh && self.faults_fresh
    }

    pub fn min_cell_mv(&self) -> Option<u16> {
        self.cells.iter().copied().min()
    }

    pub fn max_cell_mv(&self) -> Option<u16> {
        self.cells.iter().copied().max()
    }

    /// Highest minus lowest cell voltage.
    pub fn spread_mv(&self) -> Option<u16> {
        Some(self.max_cell_mv()? - self.min_cell_mv()?)
    }

    /// Average cell voltage derived from the pack voltage.
    pub fn pack_cell_mv(&self, cell_count: u8) -> u16 {
        if cell_count == 0 {
            return 0;
        }
        self.pack.batt_mv / u16::from(cell_count)
    }
}
