//! Unified error types for the power-path core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! controller's error handling uniform.  All variants are `Copy` so they
//! can be recorded in the fault log and passed through the state machine
//! without allocation.

use core::fmt;

use crate::events::Event;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A telemetry read failed or returned implausible data.
    Sensor(SensorError),
    /// A charger / balancer / power-path command failed.
    Actuator(ActuatorError),
    /// Configuration is invalid or could not be parsed.
    Config(ConfigError),
    /// The transition table is malformed.
    Table(TableError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Table(e) => write!(f, "transition table: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Bus transaction to the monitor / charger IC failed.
    Transport,
    /// The IC did not answer in time.
    Timeout,
    /// The cell monitor reported a different number of cells than configured.
    CellCountMismatch { expected: u8, actual: u8 },
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "bus transport failed"),
            Self::Timeout => write!(f, "read timed out"),
            Self::CellCountMismatch { expected, actual } => {
                write!(f, "expected {expected} cells, got {actual}")
            }
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Bus write or GPIO set failed.
    Transport,
    /// The IC did not acknowledge in time.
    Timeout,
    /// The device refused the requested value.
    Rejected,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "bus transport failed"),
            Self::Timeout => write!(f, "write timed out"),
            Self::Rejected => write!(f, "command rejected"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating a [`PowerPathConfig`](crate::config::PowerPathConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// The serialized form could not be decoded.
    Parse,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Parse => write!(f, "could not parse configuration"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Transition table errors
// ---------------------------------------------------------------------------

/// Rejections raised by [`TransitionTable::new`](crate::fsm::table::TransitionTable::new).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Two rows share the same origin and event; the later one would be dead.
    DuplicateRow { first: usize, second: usize, event: Event },
    /// A row leaves `Fault`, which only a hardware reset may do.
    RowFromFault { index: usize },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateRow { first, second, event } => {
                write!(f, "rows {first} and {second} both handle {event:?}")
            }
            Self::RowFromFault { index } => write!(f, "row {index} leaves Fault"),
        }
    }
}

impl From<TableError> for Error {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
