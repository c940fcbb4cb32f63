//! Interrupt-safe control event queue.
//!
//! Events are produced by:
//! - GPIO ISRs (BMS alert line, charger INT, source detect)
//! - The telemetry sampler and safety supervisor (main loop)
//! - The scheduler's state deadline (`Timeout`)
//!
//! Events are consumed by the main loop, one per `run_once`, and fed to
//! the dispatcher.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ BMS ALERT   │────▶│                  │     │              │
//! │ Charger INT │────▶│   EventQueue<N>  │────▶│  run_once()  │
//! │ Sampler     │────▶│ (critical sect.) │     │  dispatch()  │
//! │ Timeout     │────▶│                  │     │              │
//! └─────────────┘     └──────────────────┘     └──────────────┘
//! ```
//!
//! The queue is bounded and never rejects a push: when full, the oldest
//! unread event is overwritten.  Both ends take the same critical section,
//! held only for a handful of index updates.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Default queue depth used by the controller and the simulation.
pub const EVENT_QUEUE_CAP: usize = 16;

/// Control events understood by the dispatcher.
///
/// Tags only; no payload.  Discriminants are grouped by concern and are
/// stable so they can cross an ISR or fuzz boundary as a `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Event {
    // ── Power sources ─────────────────────────────────────
    /// 60 W USB-PD contract negotiated.
    Connected60W           = 0,
    /// 100 W USB-PD contract negotiated.
    Connected100W          = 1,
    /// Solar input above the MPPT start voltage.
    ConnectedMppt          = 2,
    /// The active charge source went away.
    SourceDisconnected     = 3,
    /// Battery output rail is in regulation.
    PowerGood              = 4,

    // ── Charge progress ───────────────────────────────────
    /// Termination reached.
    ChargeDone             = 10,
    /// Charger IC reported a fault.
    ChargeError            = 11,

    // ── Protection ────────────────────────────────────────
    /// Cell monitor tripped a protection.
    BmsFault               = 20,
    /// Pack or charger over temperature.
    TempHigh               = 21,
    /// Pack current beyond the configured limit.
    CurrentHigh            = 22,
    /// Repeated telemetry transport failure.
    CommFault              = 23,

    // ── Time ──────────────────────────────────────────────
    /// The current state's deadline elapsed.
    Timeout                = 30,
}

impl Event {
    /// Every event, in discriminant order.
    pub const ALL: [Event; 12] = [
        Event::Connected60W,
        Event::Connected100W,
        Event::ConnectedMppt,
        Event::SourceDisconnected,
        Event::PowerGood,
        Event::ChargeDone,
        Event::ChargeError,
        Event::BmsFault,
        Event::TempHigh,
        Event::CurrentHigh,
        Event::CommFault,
        Event::Timeout,
    ];

    /// Decode a raw tag.  Unknown tags yield `None`.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0  => Some(Self::Connected60W),
            1  => Some(Self::Connected100W),
            2  => Some(Self::ConnectedMppt),
            3  => Some(Self::SourceDisconnected),
            4  => Some(Self::PowerGood),
            10 => Some(Self::ChargeDone),
            11 => Some(Self::ChargeError),
            20 => Some(Self::BmsFault),
            21 => Some(Self::TempHigh),
            22 => Some(Self::CurrentHigh),
            23 => Some(Self::CommFault),
            30 => Some(Self::Timeout),
            _  => None,
        }
    }
}

// ── Battery-monitor signals ───────────────────────────────────

/// Raw notifications from the battery-monitor / charger drivers.
///
/// These are richer than the dispatcher needs; [`BmsSignal::to_event`]
/// folds them into the [`Event`] tag space at the queue boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmsSignal {
    /// USB-PD source negotiated at the given wattage.
    PowerSourceConnected { watts: u16 },
    SolarConnected,
    PowerSourceDisconnected,
    ChargeComplete,
    BatteryTempFault,
    /// ALERT pin asserted by the cell monitor.
    BmsInterrupt,
    HighCurrent,
    ChargerCommFault,
    BmsCommFault,
    CellUndervoltage,
    CellOvervoltage,
    /// Front-panel button.  Informational only.
    UserButton,
}

impl BmsSignal {
    /// Map to a control event, or `None` when the dispatcher has no use for it.
    pub fn to_event(self) -> Option<Event> {
        match self {
            Self::PowerSourceConnected { watts } if watts >= 100 => Some(Event::Connected100W),
            Self::PowerSourceConnected { watts } if watts >= 60 => Some(Event::Connected60W),
            // Contracts below 60 W cannot run the charger.
            Self::PowerSourceConnected { .. } | Self::UserButton => None,
            Self::SolarConnected => Some(Event::ConnectedMppt),
            Self::PowerSourceDisconnected => Some(Event::SourceDisconnected),
            Self::ChargeComplete => Some(Event::ChargeDone),
            Self::BatteryTempFault => Some(Event::TempHigh),
            Self::BmsInterrupt | Self::CellUndervoltage | Self::CellOvervoltage => {
                Some(Event::BmsFault)
            }
            Self::HighCurrent => Some(Event::CurrentHigh),
            Self::ChargerCommFault | Self::BmsCommFault => Some(Event::CommFault),
        }
    }
}

// ── Bounded overwrite-oldest ring ─────────────────────────────

struct Ring<const N: usize> {
    slots: [Option<Event>; N],
    /// Next write index.
    head: usize,
    /// Next read index.
    tail: usize,
    /// Disambiguates `head == tail` between empty and full.
    is_empty: bool,
    /// Events lost to overwrite since construction.
    dropped: u32,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        Self {
            slots: [None; N],
            head: 0,
            tail: 0,
            is_empty: true,
            dropped: 0,
        }
    }

    fn is_full(&self) -> bool {
        !self.is_empty && self.head == self.tail
    }

    fn push(&mut self, event: Event) -> Option<Event> {
        let overwritten = if self.is_full() {
            let oldest = self.slots[self.tail].take();
            self.tail = (self.tail + 1) % N;
            self.dropped = self.dropped.wrapping_add(1);
            oldest
        } else {
            None
        };

        self.slots[self.head] = Some(event);
        self.head = (self.head + 1) % N;
        self.is_empty = false;
        overwritten
    }

    fn pop(&mut self) -> Option<Event> {
        if self.is_empty {
            return None;
        }
        let event = self.slots[self.tail].take();
        self.tail = (self.tail + 1) % N;
        if self.tail == self.head {
            self.is_empty = true;
        }
        event
    }

    fn len(&self) -> usize {
        if self.is_empty {
            0
        } else if self.head == self.tail {
            N
        } else {
            (self.head + N - self.tail) % N
        }
    }

    fn clear(&mut self) {
        self.slots = [None; N];
        self.head = 0;
        self.tail = 0;
        self.is_empty = true;
    }
}

/// Bounded, interrupt-safe FIFO of [`Event`]s.
///
/// `const`-constructible so firmware can place one in a `static` shared
/// with ISRs; tests simply build one per case.
pub struct EventQueue<const N: usize = EVENT_QUEUE_CAP> {
    ring: Mutex<CriticalSectionRawMutex, RefCell<Ring<N>>>,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        const { assert!(N > 0, "event queue capacity must be non-zero") };
        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Ring<N>) -> R) -> R {
        self.ring.lock(|cell| f(&mut *cell.borrow_mut()))
    }

    /// Enqueue an event.  Safe from ISR context; never blocks, never fails.
    ///
    /// Returns the event that was overwritten when the queue was full.
    pub fn push(&self, event: Event) -> Option<Event> {
        self.with(|ring| ring.push(event))
    }

    /// Translate and enqueue a driver signal.  Returns `false` when the
    /// signal has no control meaning and was discarded.
    pub fn post_signal(&self, signal: BmsSignal) -> bool {
        match signal.to_event() {
            Some(event) => {
                self.push(event);
                true
            }
            None => false,
        }
    }

    /// Dequeue the oldest event.
    pub fn pop(&self) -> Option<Event> {
        self.with(Ring::pop)
    }

    pub fn len(&self) -> usize {
        self.with(|ring| ring.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|ring| ring.is_empty)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of events lost to overwrite so far.
    pub fn dropped(&self) -> u32 {
        self.with(|ring| ring.dropped)
    }

    /// Discard every pending event.
    pub fn clear(&self) {
        self.with(Ring::clear);
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
