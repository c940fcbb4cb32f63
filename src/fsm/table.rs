//! Transition table engine.
//!
//! Rows are `(origin, event) -> (action, to)`.  The origin is either a
//! concrete state or an abstract parent; parent rows are consulted only
//! when the current state has no row of its own for the event.
//!
//! Rows are scanned in declaration order and the first match wins.  The
//! constructor rejects two rows with the same `(origin, event)` key, so in
//! a valid table at most one row can match per origin.

use crate::error::TableError;
use crate::events::Event;

use super::context::PowerContext;
use super::{ParentId, StateId, Transition};
use crate::app::ports::ActuatorPort;

/// Signature for the per-row transition action.  Runs between the old
/// state's exit and the new state's entry.
pub type TransitionActionFn = fn(&mut PowerContext, &mut dyn ActuatorPort, &Transition);

/// Where a row applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    State(StateId),
    Parent(ParentId),
}

/// One row of the transition table.
#[derive(Clone, Copy)]
pub struct TransitionRow {
    pub origin: Origin,
    pub event: Event,
    pub action: Option<TransitionActionFn>,
    pub to: StateId,
}

impl TransitionRow {
    pub const fn new(origin: Origin, event: Event, to: StateId) -> Self {
        Self {
            origin,
            event,
            action: None,
            to,
        }
    }

    #[must_use]
    pub const fn with_action(mut self, action: TransitionActionFn) -> Self {
        self.action = Some(action);
        self
    }
}

impl core::fmt::Debug for TransitionRow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransitionRow")
            .field("origin", &self.origin)
            .field("event", &self.event)
            .field("action", &self.action.is_some())
            .field("to", &self.to)
            .finish()
    }
}

/// A validated, immutable set of rows.
#[derive(Debug, Clone, Copy)]
pub struct TransitionTable {
    rows: &'static [TransitionRow],
}

impl TransitionTable {
    /// Validate `rows`.
    ///
    /// Rejects duplicate `(origin, event)` keys and any row originating in
    /// `Fault`.
    pub fn new(rows: &'static [TransitionRow]) -> Result<Self, TableError> {
        for (i, row) in rows.iter().enumerate() {
            if row.origin == Origin::State(StateId::Fault) {
                return Err(TableError::RowFromFault { index: i });
            }
            if let Some(j) = rows[..i]
                .iter()
                .position(|prev| prev.origin == row.origin && prev.event == row.event)
            {
                return Err(TableError::DuplicateRow {
                    first: j,
                    second: i,
                    event: row.event,
                });
            }
        }
        Ok(Self { rows })
    }

    /// First row matching `(origin, event)`.
    pub fn find(&self, origin: Origin, event: Event) -> Option<&TransitionRow> {
        self.rows
            .iter()
            .find(|row| row.origin == origin && row.event == event)
    }

    pub fn rows(&self) -> &'static [TransitionRow] {
        self.rows
    }
}
