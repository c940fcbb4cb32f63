//! Fault log for post-mortem diagnostics.
//!
//! A fixed ring of [`FaultRecord`]s.  Once full, each new record
//! overwrites the oldest one at the head index.  The log can be exported
//! as a postcard blob (oldest record first) for persistence or upload by
//! the integrator.

use serde::{Deserialize, Serialize};

use crate::error::{ActuatorError, SensorError};

/// Number of records retained.
pub const FAULT_LOG_DEPTH: usize = 16;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultCode {
    /// Bus transaction failed.
    Transport = 1,
    /// Device identity or topology did not match configuration.
    IdMismatch = 2,
    Timeout = 3,
    /// Value outside the plausible range.
    Range = 4,
    /// Device refused the request in its current state.
    State = 5,
    /// A protection condition escalated the machine to `Fault`.
    ProtectionTrip = 8,
}

/// Which component reported the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultSource {
    Core = 0,
    Charger = 1,
    CellMonitor = 2,
    PowerSwitch = 3,
}

impl From<SensorError> for FaultCode {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::Transport => Self::Transport,
            SensorError::Timeout => Self::Timeout,
            SensorError::CellCountMismatch { .. } => Self::IdMismatch,
            SensorError::OutOfRange => Self::Range,
        }
    }
}

impl From<ActuatorError> for FaultCode {
    fn from(e: ActuatorError) -> Self {
        match e {
            ActuatorError::Transport => Self::Transport,
            ActuatorError::Timeout => Self::Timeout,
            ActuatorError::Rejected => Self::State,
        }
    }
}

/// One diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// Scheduler tick at which the fault was observed.
    pub tick: u64,
    pub code: FaultCode,
    /// Code-specific detail (event tag, fault reason, ...).
    pub detail: u16,
    pub source: FaultSource,
    /// Device register involved, if any.
    pub register: u8,
    /// Raw value read from / written to `register`.
    pub value: u16,
}

impl FaultRecord {
    pub fn new(tick: u64, code: FaultCode, source: FaultSource) -> Self {
        Self {
            tick,
            code,
            detail: 0,
            source,
            register: 0,
            value: 0,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: u16) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn with_register(mut self, register: u8, value: u16) -> Self {
        self.register = register;
        self.value = value;
        self
    }
}

/// Ring buffer of [`FaultRecord`]s.
#[derive(Debug, Clone)]
pub struct FaultLog {
    entries: [Option<FaultRecord>; FAULT_LOG_DEPTH],
    /// Next slot to write.
    head: usize,
    /// Total records ever written.
    total: u32,
    last_code: Option<FaultCode>,
}

impl Default for FaultLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultLog {
    pub const fn new() -> Self {
        Self {
            entries: [None; FAULT_LOG_DEPTH],
            head: 0,
            total: 0,
            last_code: None,
        }
    }

    /// Append a record, overwriting the oldest once full.
    pub fn record(&mut self, record: FaultRecord) {
        self.entries[self.head] = Some(record);
        self.head = (self.head + 1) % FAULT_LOG_DEPTH;
        self.total = self.total.wrapping_add(1);
        self.last_code = Some(record.code);
    }

    /// Records currently held (at most [`FAULT_LOG_DEPTH`]).
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Records ever written, including overwritten ones.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn last_code(&self) -> Option<FaultCode> {
        self.last_code
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &FaultRecord> + '_ {
        (0..FAULT_LOG_DEPTH)
            .map(move |i| &self.entries[(self.head + i) % FAULT_LOG_DEPTH])
            .filter_map(Option::as_ref)
    }

    pub fn latest(&self) -> Option<&FaultRecord> {
        let idx = (self.head + FAULT_LOG_DEPTH - 1) % FAULT_LOG_DEPTH;
        self.entries[idx].as_ref()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Serialize the held records, oldest first, into `buf`.
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        let ordered: heapless::Vec<FaultRecord, FAULT_LOG_DEPTH> = self.iter().copied().collect();
        postcard::to_slice(&ordered, buf)
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(
        bytes: &[u8],
    ) -> Result<heapless::Vec<FaultRecord, FAULT_LOG_DEPTH>, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
