//! Shared mutable context threaded through every state and transition action.
//!
//! `PowerContext` is the blackboard the actions read and write: the latest
//! telemetry, the power path last commanded, the latched fault, the fault
//! log and a small outbox for events raised from `main()` actions.

use core::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::ports::{ActuatorPort, PowerPath};
use crate::config::PowerPathConfig;
use crate::diagnostics::{FaultCode, FaultLog, FaultRecord, FaultSource};
use crate::error::ActuatorError;
use crate::events::Event;
use crate::sensors::TelemetrySnapshot;

use super::StateId;

/// Capacity of the per-iteration outbox.
const OUTBOX_CAP: usize = 4;

// ---------------------------------------------------------------------------
// Fault classification
// ---------------------------------------------------------------------------

/// Why the machine entered `Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultReason {
    /// Cell monitor protection (OV/UV/short circuit).
    Bms = 0,
    /// Charger IC fault.
    ChargerError = 1,
    OverTemperature = 2,
    OverCurrent = 3,
    /// Telemetry bus unreachable.
    PeripheralBus = 4,
}

/// Severity recorded with a latched fault.
///
/// Every level transitions to `Fault`; the level is published so an
/// external supervisor can choose whether to issue a hardware reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultLevel {
    NonFatal,
    Fatal,
}

impl FaultReason {
    /// The fault an escalation event stands for, if any.
    pub fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::BmsFault => Some(Self::Bms),
            Event::ChargeError => Some(Self::ChargerError),
            Event::TempHigh => Some(Self::OverTemperature),
            Event::CurrentHigh => Some(Self::OverCurrent),
            Event::CommFault => Some(Self::PeripheralBus),
            _ => None,
        }
    }

    pub fn level(self) -> FaultLevel {
        match self {
            Self::Bms => FaultLevel::Fatal,
            _ => FaultLevel::NonFatal,
        }
    }

    fn source(self) -> FaultSource {
        match self {
            Self::Bms => FaultSource::CellMonitor,
            Self::ChargerError => FaultSource::Charger,
            Self::OverTemperature | Self::OverCurrent | Self::PeripheralBus => FaultSource::Core,
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bms => write!(f, "BMS protection"),
            Self::ChargerError => write!(f, "charger error"),
            Self::OverTemperature => write!(f, "over temperature"),
            Self::OverCurrent => write!(f, "over current"),
            Self::PeripheralBus => write!(f, "peripheral bus failure"),
        }
    }
}

/// The fault that put the machine in `Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatchedFault {
    pub reason: FaultReason,
    pub level: FaultLevel,
    /// State the machine was in when it escalated.
    pub from: StateId,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// PowerContext
// ---------------------------------------------------------------------------

/// The shared context passed to every action.
pub struct PowerContext {
    // -- Timing --
    /// Scheduler base ticks, refreshed by the controller before each call.
    pub now: u64,

    // -- Configuration --
    pub config: PowerPathConfig,

    // -- Telemetry --
    /// Latest snapshot from the sampler.
    pub telemetry: TelemetrySnapshot,

    // -- Outputs --
    /// Power path last acknowledged by the switch driver.
    pub power_path: PowerPath,
    /// Most recent output command failure, cleared on read.
    pub output_error: Option<ActuatorError>,

    // -- Safety --
    pub latched_fault: Option<LatchedFault>,
    pub fault_log: FaultLog,

    // -- Action requests --
    /// Deadline (ticks) requested by the state just entered.
    pub timeout_request: Option<u32>,
    /// `ChargeDone` already posted for the current charging session.
    pub charge_done_posted: bool,
    outbox: heapless::Vec<Event, OUTBOX_CAP>,
}

impl PowerContext {
    pub fn new(config: PowerPathConfig) -> Self {
        Self {
            now: 0,
            config,
            telemetry: TelemetrySnapshot::default(),
            power_path: PowerPath::Off,
            output_error: None,
            latched_fault: None,
            fault_log: FaultLog::new(),
            timeout_request: None,
            charge_done_posted: false,
            outbox: heapless::Vec::new(),
        }
    }

    /// Command a power path and track what the driver acknowledged.
    pub fn select_path(&mut self, hw: &mut dyn ActuatorPort, path: PowerPath) {
        match hw.set_power_path(path) {
            Ok(()) => self.power_path = path,
            Err(e) => self.note_output_error(e, FaultSource::PowerSwitch, path as u16),
        }
    }

    /// Drive every output to its safe level.
    pub fn cut_outputs(&mut self, hw: &mut dyn ActuatorPort) {
        match hw.all_off() {
            Ok(()) => self.power_path = PowerPath::Off,
            Err(e) => self.note_output_error(e, FaultSource::PowerSwitch, 0),
        }
    }

    /// Stop the charger without touching the path.
    pub fn stop_charger(&mut self, hw: &mut dyn ActuatorPort) {
        if let Err(e) = hw.set_charge_current(0) {
            self.note_output_error(e, FaultSource::Charger, 0);
        }
    }

    /// Record a transport failure on an output.
    pub fn note_output_error(&mut self, e: ActuatorError, source: FaultSource, value: u16) {
        warn!("Output command to {source:?} failed: {e}");
        self.output_error = Some(e);
        self.fault_log
            .record(FaultRecord::new(self.now, FaultCode::from(e), source).with_register(0, value));
    }

    /// Latch a fault and log it as a protection trip.
    pub fn latch_fault(
        &mut self,
        reason: FaultReason,
        from: StateId,
        event: Event,
    ) -> LatchedFault {
        let latched = LatchedFault {
            reason,
            level: reason.level(),
            from,
            tick: self.now,
        };
        self.latched_fault = Some(latched);
        self.fault_log.record(
            FaultRecord::new(self.now, FaultCode::ProtectionTrip, reason.source())
                .with_detail(event as u16)
                .with_register(from as u8, reason as u16),
        );
        latched
    }

    /// Queue an event raised by an action; drained into the event queue by
    /// the controller after the action returns.
    pub fn post(&mut self, event: Event) {
        if self.outbox.push(event).is_err() {
            warn!("Action outbox full, dropping {event:?}");
        }
    }

    /// Take every posted event, oldest first.
    pub fn drain_outbox(&mut self) -> heapless::Vec<Event, OUTBOX_CAP> {
        core::mem::take(&mut self.outbox)
    }

    /// Battery voltage as seen per cell.
    pub fn battery_cell_mv(&self) -> u16 {
        self.telemetry.pack_cell_mv(self.config.cells.count)
    }
}
