//! Concrete state actions, descriptors and the transition table.
//!
//! Each state is three plain `fn` pointers and each row an optional
//! fourth.  No closures, no heap.
//!
//! ```text
//!                 ┌──────── HierarchicalCharging ─────────┐
//!   IDLE ─[60W]──▶│ Charging60W ◀─▶ Charging100W ◀─▶ Mppt │─[ChargeDone]─▶ IDLE
//!    │  ─[100W]─▶ │                                       │
//!    │  ─[MPPT]─▶ └───────────────┬───────────────────────┘
//!    │                            │ [SourceDisconnected]
//!    │ [PowerGood]                ▼
//!    ▼                         STANDBY ─[Timeout]─▶ IDLE
//!  DISCHARGING ◀──[PowerGood]─────┘
//!
//!  Charging / Discharging / Idle / Standby ──[protection]──▶ FAULT
//!  FAULT ──[hardware reset only]──▶ IDLE
//! ```

use log::{error, info, trace};

use super::context::{FaultReason, PowerContext};
use super::table::{Origin, TransitionRow, TransitionTable};
use super::{ParentId, StateDescriptor, StateId, Transition};
use crate::app::ports::{ActuatorPort, PowerPath};
use crate::error::TableError;
use crate::events::Event;

// ═══════════════════════════════════════════════════════════════════════════
//  Descriptors
// ═══════════════════════════════════════════════════════════════════════════

static IDLE: StateDescriptor = StateDescriptor {
    id: StateId::Idle,
    name: "Idle",
    parent: None,
    on_enter: Some(idle_enter),
    on_main: None,
    on_exit: None,
};

static CHARGING_60W: StateDescriptor = StateDescriptor {
    id: StateId::Charging60W,
    name: "Charging60W",
    parent: Some(ParentId::Charging),
    on_enter: Some(charging_60w_enter),
    on_main: Some(charging_main),
    on_exit: Some(charging_exit),
};

static CHARGING_100W: StateDescriptor = StateDescriptor {
    id: StateId::Charging100W,
    name: "Charging100W",
    parent: Some(ParentId::Charging),
    on_enter: Some(charging_100w_enter),
    on_main: Some(charging_main),
    on_exit: Some(charging_exit),
};

static CHARGING_MPPT: StateDescriptor = StateDescriptor {
    id: StateId::ChargingMppt,
    name: "ChargingMPPT",
    parent: Some(ParentId::Charging),
    on_enter: Some(charging_mppt_enter),
    on_main: Some(charging_main),
    on_exit: Some(charging_exit),
};

static DISCHARGING: StateDescriptor = StateDescriptor {
    id: StateId::Discharging,
    name: "Discharging",
    parent: None,
    on_enter: Some(discharging_enter),
    on_main: None,
    on_exit: Some(discharging_exit),
};

static STANDBY: StateDescriptor = StateDescriptor {
    id: StateId::Standby,
    name: "Standby",
    parent: None,
    on_enter: Some(standby_enter),
    on_main: None,
    on_exit: None,
};

static FAULT: StateDescriptor = StateDescriptor {
    id: StateId::Fault,
    name: "Fault",
    parent: None,
    on_enter: Some(fault_enter),
    on_main: Some(fault_main),
    on_exit: Some(fault_exit),
};

/// Descriptor for `id`.
pub fn descriptor(id: StateId) -> &'static StateDescriptor {
    match id {
        StateId::Idle => &IDLE,
        StateId::Charging60W => &CHARGING_60W,
        StateId::Charging100W => &CHARGING_100W,
        StateId::ChargingMppt => &CHARGING_MPPT,
        StateId::Discharging => &DISCHARGING,
        StateId::Standby => &STANDBY,
        StateId::Fault => &FAULT,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Transition table
// ═══════════════════════════════════════════════════════════════════════════

const CHARGING: Origin = Origin::Parent(ParentId::Charging);
const IDLE_S: Origin = Origin::State(StateId::Idle);
const C60: Origin = Origin::State(StateId::Charging60W);
const C100: Origin = Origin::State(StateId::Charging100W);
const CMPPT: Origin = Origin::State(StateId::ChargingMppt);
const DISCH: Origin = Origin::State(StateId::Discharging);
const STBY: Origin = Origin::State(StateId::Standby);

const fn row(origin: Origin, event: Event, to: StateId) -> TransitionRow {
    TransitionRow::new(origin, event, to)
}

const fn trip(origin: Origin, event: Event) -> TransitionRow {
    TransitionRow::new(origin, event, StateId::Fault).with_action(escalate)
}

static TRANSITIONS: [TransitionRow; 33] = [
    // ── HierarchicalCharging (shared by every charging sub-state) ──
    trip(CHARGING, Event::ChargeError),
    trip(CHARGING, Event::TempHigh),
    trip(CHARGING, Event::BmsFault),
    trip(CHARGING, Event::CommFault),
    trip(CHARGING, Event::CurrentHigh),
    row(CHARGING, Event::SourceDisconnected, StateId::Standby),
    // ── Idle ──
    row(IDLE_S, Event::Connected60W, StateId::Charging60W),
    row(IDLE_S, Event::Connected100W, StateId::Charging100W),
    row(IDLE_S, Event::ConnectedMppt, StateId::ChargingMppt),
    row(IDLE_S, Event::PowerGood, StateId::Discharging),
    trip(IDLE_S, Event::BmsFault),
    // ── Charging60W ──
    row(C60, Event::ChargeDone, StateId::Idle),
    row(C60, Event::Connected100W, StateId::Charging100W),
    row(C60, Event::ConnectedMppt, StateId::ChargingMppt),
    // ── Charging100W ──
    row(C100, Event::ChargeDone, StateId::Idle),
    row(C100, Event::Connected60W, StateId::Charging60W),
    row(C100, Event::ConnectedMppt, StateId::ChargingMppt),
    // ── ChargingMPPT ──
    row(CMPPT, Event::ChargeDone, StateId::Idle),
    row(CMPPT, Event::Connected60W, StateId::Charging60W),
    row(CMPPT, Event::Connected100W, StateId::Charging100W),
    // ── Discharging ──
    row(DISCH, Event::Connected60W, StateId::Charging60W),
    row(DISCH, Event::Connected100W, StateId::Charging100W),
    row(DISCH, Event::ConnectedMppt, StateId::ChargingMppt),
    trip(DISCH, Event::BmsFault),
    trip(DISCH, Event::CurrentHigh),
    trip(DISCH, Event::CommFault),
    trip(DISCH, Event::TempHigh),
    // ── Standby ──
    row(STBY, Event::PowerGood, StateId::Discharging),
    row(STBY, Event::Connected60W, StateId::Charging60W),
    row(STBY, Event::Connected100W, StateId::Charging100W),
    row(STBY, Event::ConnectedMppt, StateId::ChargingMppt),
    row(STBY, Event::Timeout, StateId::Idle),
    trip(STBY, Event::BmsFault),
];

/// Validate and wrap the static table.  Called once at startup.
pub fn build_transition_table() -> Result<TransitionTable, TableError> {
    TransitionTable::new(&TRANSITIONS)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Transition actions
// ═══════════════════════════════════════════════════════════════════════════

/// Protection escalation.  Outputs are cut before anything is logged.
fn escalate(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort, t: &Transition) {
    ctx.cut_outputs(hw);
    let reason = FaultReason::from_event(t.event).unwrap_or(FaultReason::Bms);
    let latched = ctx.latch_fault(reason, t.from, t.event);
    error!(
        "PROTECTION: {reason} ({:?}) in {}, outputs disabled",
        latched.level,
        t.from.name()
    );
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    if ctx.power_path != PowerPath::Off {
        ctx.select_path(hw, PowerPath::Off);
    }
    info!("IDLE: no source selected");
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHARGING sub-states
// ═══════════════════════════════════════════════════════════════════════════

fn charging_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort, path: PowerPath) {
    ctx.charge_done_posted = false;
    ctx.select_path(hw, path);
    info!("CHARGING: {path:?} path enabled");
}

fn charging_60w_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    charging_enter(ctx, hw, PowerPath::Usb60W);
}

fn charging_100w_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    charging_enter(ctx, hw, PowerPath::Usb100W);
}

fn charging_mppt_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    charging_enter(ctx, hw, PowerPath::Mppt);
}

/// Posts `ChargeDone` once the pack reaches the done voltage and the
/// charge current has tapered below termination.
fn charging_main(ctx: &mut PowerContext, _hw: &mut dyn ActuatorPort) {
    if ctx.charge_done_posted || !ctx.telemetry.pack_fresh {
        return;
    }
    let safety = &ctx.config.safety;
    let cell_mv = ctx.battery_cell_mv();
    let batt_ma = ctx.telemetry.pack.batt_ma;
    if cell_mv >= safety.charge_done_cell_mv
        && batt_ma > 0
        && batt_ma <= safety.termination_current_ma
    {
        info!("CHARGING: complete at {cell_mv} mV/cell, {batt_ma} mA");
        ctx.charge_done_posted = true;
        ctx.post(Event::ChargeDone);
    }
}

fn charging_exit(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    ctx.stop_charger(hw);
    ctx.select_path(hw, PowerPath::Off);
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCHARGING
// ═══════════════════════════════════════════════════════════════════════════

fn discharging_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    ctx.select_path(hw, PowerPath::Battery);
    info!("DISCHARGING: battery output enabled");
}

fn discharging_exit(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    ctx.select_path(hw, PowerPath::Off);
}

// ═══════════════════════════════════════════════════════════════════════════
//  STANDBY
// ═══════════════════════════════════════════════════════════════════════════

fn standby_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    if ctx.power_path != PowerPath::Off {
        ctx.select_path(hw, PowerPath::Off);
    }
    let ticks = ctx.config.schedule.standby_timeout_ticks;
    ctx.timeout_request = Some(ticks);
    info!("STANDBY: waiting for a source, idle in {ticks} ticks");
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAULT
// ═══════════════════════════════════════════════════════════════════════════

fn fault_enter(ctx: &mut PowerContext, hw: &mut dyn ActuatorPort) {
    ctx.cut_outputs(hw);
    match ctx.latched_fault {
        Some(f) => error!("FAULT: latched {} ({:?}), awaiting hardware reset", f.reason, f.level),
        None => error!("FAULT: latched, awaiting hardware reset"),
    }
}

fn fault_main(ctx: &mut PowerContext, _hw: &mut dyn ActuatorPort) {
    trace!("FAULT: holding, path={:?}", ctx.power_path);
}

fn fault_exit(_ctx: &mut PowerContext, _hw: &mut dyn ActuatorPort) {
    info!("FAULT: cleared by hardware reset");
}
