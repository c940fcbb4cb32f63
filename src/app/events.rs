//! Outbound application events.
//!
//! The [`PowerPathController`](super::service::PowerPathController) emits
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! on the other side decide what to do with them: log to serial, forward to
//! a supervisor, store for a host tool.

use serde::Serialize;

use crate::app::ports::PowerPath;
use crate::events::Event;
use crate::fsm::StateId;
use crate::fsm::context::{FaultLevel, FaultReason};

/// Structured events emitted by the control core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The controller has started (carries initial state).
    Started(StateId),

    /// The machine took a transition.
    StateChanged {
        from: StateId,
        to: StateId,
        event: Event,
    },

    /// The machine escalated to `Fault`.
    FaultLatched {
        reason: FaultReason,
        level: FaultLevel,
        from: StateId,
    },

    /// A hardware reset brought the machine back to `Idle`.
    Reset { from: StateId },

    /// The charger current limit changed.
    ChargeCurrentChanged(u16),

    /// Balancing started, stopped or changed its mask.
    BalancingChanged { active: bool, mask: u8 },

    /// An older event was overwritten in the queue since the last report.
    EventsDropped(u32),

    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),
}

/// A point-in-time summary suitable for logging or transmission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryData {
    pub state: &'static str,
    pub power_path: PowerPath,
    pub batt_mv: u16,
    pub batt_ma: i32,
    pub temperature_c: i16,
    pub min_cell_mv: Option<u16>,
    pub max_cell_mv: Option<u16>,
    pub charge_target_ma: Option<u16>,
    pub balancing_mask: u8,
    pub fault_count: u32,
}
