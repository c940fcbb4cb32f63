//! Hierarchical, table-driven state machine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  StateDescriptor (one per StateId, selected by match)          │
//! │  ┌──────────────┬──────────┬──────────┬──────────┬──────────┐  │
//! │  │ StateId      │ parent   │ on_enter │ on_main  │ on_exit  │  │
//! │  ├──────────────┼──────────┼──────────┼──────────┼──────────┤  │
//! │  │ Idle         │ -        │ fn       │ -        │ -        │  │
//! │  │ Charging60W  │ Charging │ fn       │ fn       │ fn       │  │
//! │  │ Charging100W │ Charging │ fn       │ fn       │ fn       │  │
//! │  │ ChargingMppt │ Charging │ fn       │ fn       │ fn       │  │
//! │  │ Discharging  │ -        │ fn       │ -        │ fn       │  │
//! │  │ Standby      │ -        │ fn       │ -        │ -        │  │
//! │  │ Fault        │ -        │ fn       │ fn       │ fn       │  │
//! │  └──────────────┴──────────┴──────────┴──────────┴──────────┘  │
//! │  TransitionTable: (State | Parent, Event) -> (action, to)      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `dispatch(event)` looks for a row keyed on the current state, then on
//! its parent.  A match runs `exit(from)`, the row action, then
//! `enter(to)`; entry and exit always run, including on parent matches.
//! `Fault` ignores every event; only [`PowerStateMachine::hardware_reset`]
//! leaves it.

pub mod context;
pub mod states;
pub mod table;

use context::PowerContext;
use log::{debug, info, warn};
use table::{Origin, TransitionActionFn, TransitionTable};

use crate::app::ports::ActuatorPort;
use crate::events::Event;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every concrete state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Charging60W = 1,
    Charging100W = 2,
    ChargingMppt = 3,
    Discharging = 4,
    Standby = 5,
    Fault = 6,
}

impl StateId {
    pub const COUNT: usize = 7;

    pub const ALL: [StateId; StateId::COUNT] = [
        StateId::Idle,
        StateId::Charging60W,
        StateId::Charging100W,
        StateId::ChargingMppt,
        StateId::Discharging,
        StateId::Standby,
        StateId::Fault,
    ];

    pub fn name(self) -> &'static str {
        states::descriptor(self).name
    }

    pub fn parent(self) -> Option<ParentId> {
        states::descriptor(self).parent
    }

    pub fn is_charging(self) -> bool {
        self.parent() == Some(ParentId::Charging)
    }
}

/// Abstract parent states.  Never current; only a row origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentId {
    /// Shared by the three charging sub-states.
    Charging,
}

impl ParentId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Charging => "HierarchicalCharging",
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter`, `on_main` and `on_exit`.
pub type StateActionFn = fn(&mut PowerContext, &mut dyn ActuatorPort);

// ---------------------------------------------------------------------------
// State descriptor
// ---------------------------------------------------------------------------

/// Static descriptor for a single state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub parent: Option<ParentId>,
    pub on_enter: Option<StateActionFn>,
    /// Polled once per `run_once` while resident.
    pub on_main: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
}

// ---------------------------------------------------------------------------
// Dispatch results
// ---------------------------------------------------------------------------

/// A transition that was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    pub event: Event,
    /// Matched on the parent's row rather than the state's own.
    pub via_parent: bool,
}

/// What [`PowerStateMachine::dispatch`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Transitioned(Transition),
    /// Machine is in `Fault`; the event was ignored.
    Latched,
    /// No row for the state or its parent; the event was dropped.
    Unhandled,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The power-path state machine.
///
/// Single owner of the current state.  Instances are independent, so tests
/// can run any number side by side.
pub struct PowerStateMachine {
    table: TransitionTable,
    current: StateId,
    /// `ctx.now` at which the current state was entered.
    entered_at: u64,
    transitions: u32,
}

impl PowerStateMachine {
    /// Construct in `Idle`.  Call [`start`](Self::start) before dispatching.
    pub fn new(table: TransitionTable) -> Self {
        Self {
            table,
            current: StateId::Idle,
            entered_at: 0,
            transitions: 0,
        }
    }

    /// Run the initial state's entry action.
    pub fn start(&mut self, ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
        info!("FSM starting in state: {}", self.current.name());
        self.entered_at = ctx.now;
        if let Some(enter) = states::descriptor(self.current).on_enter {
            enter(ctx, hw);
        }
    }

    /// Feed one event through the table.
    pub fn dispatch(
        &mut self,
        event: Event,
        ctx: &mut PowerContext,
        hw: &mut dyn ActuatorPort,
    ) -> DispatchOutcome {
        if self.current == StateId::Fault {
            debug!("FSM: {event:?} ignored, fault latched");
            return DispatchOutcome::Latched;
        }

        let from = self.current;
        let (row, via_parent) = match self.table.find(Origin::State(from), event) {
            Some(row) => (*row, false),
            None => match from
                .parent()
                .and_then(|p| self.table.find(Origin::Parent(p), event))
            {
                Some(row) => (*row, true),
                None => {
                    warn!("FSM: no transition for {event:?} in {}", from.name());
                    return DispatchOutcome::Unhandled;
                }
            },
        };

        let transition = Transition {
            from,
            to: row.to,
            event,
            via_parent,
        };
        self.transition(&transition, row.action, ctx, hw);
        DispatchOutcome::Transitioned(transition)
    }

    /// Run the current state's `main()` action, if any.
    pub fn run_main(&mut self, ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
        if let Some(main) = states::descriptor(self.current).on_main {
            main(ctx, hw);
        }
    }

    /// The only way out of `Fault`.  Re-initializes into `Idle` from any
    /// state, running exit and entry as usual.
    pub fn hardware_reset(&mut self, ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
        let from = self.current;
        if let Some(exit) = states::descriptor(from).on_exit {
            exit(ctx, hw);
        }
        ctx.latched_fault = None;
        self.current = StateId::Idle;
        self.entered_at = ctx.now;
        if let Some(enter) = states::descriptor(StateId::Idle).on_enter {
            enter(ctx, hw);
        }
        info!("FSM hardware reset: {} -> Idle", from.name());
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn ticks_in_current_state(&self, now: u64) -> u64 {
        now.saturating_sub(self.entered_at)
    }

    /// Transitions taken since construction.
    pub fn transition_count(&self) -> u32 {
        self.transitions
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(
        &mut self,
        t: &Transition,
        action: Option<TransitionActionFn>,
        ctx: &mut PowerContext,
        hw: &mut dyn ActuatorPort,
    ) {
        if let Some(exit) = states::descriptor(t.from).on_exit {
            exit(ctx, hw);
        }
        if let Some(action) = action {
            action(ctx, hw, t);
        }

        self.current = t.to;
        self.entered_at = ctx.now;
        self.transitions = self.transitions.wrapping_add(1);

        if let Some(enter) = states::descriptor(t.to).on_enter {
            enter(ctx, hw);
        }

        if t.via_parent {
            info!(
                "FSM transition: {} -> {} on {:?} (via {})",
                t.from.name(),
                t.to.name(),
                t.event,
                t.from.parent().map_or("?", ParentId::name)
            );
        } else {
            info!(
                "FSM transition: {} -> {} on {:?}",
                t.from.name(),
                t.to.name(),
                t.event
            );
        }
    }
}
