//! Safety supervisor.
//!
//! Runs after every sensor poll and turns protection conditions into
//! events.  It never touches an output: escalation is handled by the
//! transition table alone.
//!
//! ## Trip lifecycle
//!
//! 1. A condition appears (fault flag set, temperature or current beyond
//!    its limit).
//! 2. On the rising edge the supervisor sets the trip bit and pushes the
//!    matching event (`BmsFault`, `ChargeError`, `TempHigh`, `CurrentHigh`).
//! 3. While the condition persists nothing further is pushed, except that
//!    the controller calls [`SafetySupervisor::reassert`] after each state
//!    change so a held trip reaches the new state's table rows.
//! 4. When it clears, the bit is cleared; a later recurrence pushes again.
//!
//! Channels whose read failed on this poll keep their trip bits as they
//! were.  Stale data never raises or clears a trip.

use core::fmt;

use log::{error, info, warn};

use crate::config::SafetyConfig;
use crate::events::{Event, EventQueue};
use crate::sensors::{FaultFlag, TelemetrySnapshot};

/// Protection conditions tracked by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyTrip {
    BmsAlert = 0b0000_0001,
    ChargerFault = 0b0000_0010,
    OverTemperature = 0b0000_0100,
    OverCurrent = 0b0000_1000,
}

impl SafetyTrip {
    pub const ALL: [Self; 4] = [
        Self::BmsAlert,
        Self::ChargerFault,
        Self::OverTemperature,
        Self::OverCurrent,
    ];

    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// Event pushed on the rising edge.
    pub const fn event(self) -> Event {
        match self {
            Self::BmsAlert => Event::BmsFault,
            Self::ChargerFault => Event::ChargeError,
            Self::OverTemperature => Event::TempHigh,
            Self::OverCurrent => Event::CurrentHigh,
        }
    }
}

impl fmt::Display for SafetyTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BmsAlert => write!(f, "BMS alert"),
            Self::ChargerFault => write!(f, "charger fault"),
            Self::OverTemperature => write!(f, "over temperature"),
            Self::OverCurrent => write!(f, "over current"),
        }
    }
}

/// Safety supervisor.
pub struct SafetySupervisor {
    limits: SafetyConfig,
    /// Active trip bitmask.
    trips: u8,
}

impl SafetySupervisor {
    pub fn new(limits: SafetyConfig) -> Self {
        Self { limits, trips: 0 }
    }

    /// Evaluate every protection condition against the latest snapshot.
    /// Returns the updated trip bitmask.
    pub fn evaluate<const N: usize>(
        &mut self,
        snap: &TelemetrySnapshot,
        queue: &EventQueue<N>,
    ) -> u8 {
        let flags = snap.faults_fresh.then_some(snap.faults);
        let pack = snap.pack_fresh.then_some(snap.pack);

        // ── IC-reported faults ────────────────────────────────────
        if let Some(flags) = flags {
            self.eval_trip(SafetyTrip::BmsAlert, flags.contains(FaultFlag::BmsAlert), queue);
            self.eval_trip(
                SafetyTrip::ChargerFault,
                flags.contains(FaultFlag::ChargerFault),
                queue,
            );
        }

        // ── Temperature ───────────────────────────────────────────
        if flags.is_some() || pack.is_some() {
            let flagged = flags.is_some_and(|f| f.contains(FaultFlag::OverTemperature));
            let measured =
                pack.is_some_and(|p| p.temperature_c >= self.limits.over_temperature_c);
            // A stale channel keeps whatever it last contributed.
            let held = self.has_trip(SafetyTrip::OverTemperature)
                && (flags.is_none() || pack.is_none());
            self.eval_trip(SafetyTrip::OverTemperature, flagged || measured || held, queue);
        }

        // ── Current ───────────────────────────────────────────────
        if flags.is_some() || pack.is_some() {
            let flagged = flags.is_some_and(|f| f.contains(FaultFlag::OverCurrent));
            let measured = pack.is_some_and(|p| {
                p.batt_ma > self.limits.max_charge_current_ma
                    || p.batt_ma < -self.limits.max_discharge_current_ma
            });
            let held =
                self.has_trip(SafetyTrip::OverCurrent) && (flags.is_none() || pack.is_none());
            self.eval_trip(SafetyTrip::OverCurrent, flagged || measured || held, queue);
        }

        self.trips
    }

    /// Current trip bitmask.
    pub fn trips(&self) -> u8 {
        self.trips
    }

    pub fn has_trips(&self) -> bool {
        self.trips != 0
    }

    pub fn has_trip(&self, trip: SafetyTrip) -> bool {
        self.trips & trip.mask() != 0
    }

    /// Push the event of every trip still held.  Returns how many were
    /// pushed.
    pub fn reassert<const N: usize>(&self, queue: &EventQueue<N>) -> usize {
        let mut pushed = 0;
        for trip in SafetyTrip::ALL.into_iter().filter(|&t| self.has_trip(t)) {
            warn!("SAFETY TRIP HELD: {trip}");
            queue.push(trip.event());
            pushed += 1;
        }
        pushed
    }

    /// Forget every trip (after a hardware reset).
    pub fn reset(&mut self) {
        self.trips = 0;
    }

    // ── Internal ──────────────────────────────────────────────────

    fn eval_trip<const N: usize>(
        &mut self,
        trip: SafetyTrip,
        condition: bool,
        queue: &EventQueue<N>,
    ) {
        if condition {
            if self.trips & trip.mask() == 0 {
                error!("SAFETY TRIP SET: {trip}");
                queue.push(trip.event());
            }
            self.trips |= trip.mask();
        } else {
            if self.trips & trip.mask() != 0 {
                info!("SAFETY TRIP CLEARED: {trip}");
            }
            self.trips &= !trip.mask();
        }
    }
}
