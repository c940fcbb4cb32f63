//! End-to-end power-path scenarios.
//!
//! Each test drives the controller through the mock hardware the way the
//! firmware main loop would: ISR-style pushes into the queue, one
//! `tick()` + `run_once()` per step, and assertions on the actuator
//! command history.

use powerpath::app::events::AppEvent;
use powerpath::app::ports::PowerPath;
use powerpath::fsm::DispatchOutcome;
use powerpath::fsm::context::FaultReason;
use powerpath::sensors::{FaultBits, FaultFlag};
use powerpath::{Event, StateId};

use crate::mock_hw::{ActuatorCall, Rig};

fn last_enable_index(rig: &Rig, path: PowerPath) -> usize {
    rig.hw
        .calls
        .iter()
        .rposition(|c| *c == ActuatorCall::SetPowerPath(path))
        .expect("path was never commanded")
}

fn off_commands_after(rig: &Rig, index: usize) -> usize {
    rig.hw.calls[index + 1..]
        .iter()
        .filter(|c| **c == ActuatorCall::SetPowerPath(PowerPath::Off))
        .count()
}

// ── Charge session ────────────────────────────────────────────

#[test]
fn connect_then_explicit_charge_done() {
    let mut rig = Rig::new();

    rig.send(Event::Connected60W);
    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
    assert_eq!(rig.hw.path_commands(PowerPath::Usb60W), 1);
    assert_eq!(rig.hw.power_path(), PowerPath::Usb60W);

    rig.send(Event::ChargeDone);
    assert_eq!(rig.ctl.current_state(), StateId::Idle);

    // The charging exit disables the path; Idle's entry must not repeat it.
    let enabled_at = last_enable_index(&rig, PowerPath::Usb60W);
    assert_eq!(off_commands_after(&rig, enabled_at), 1);
    assert_eq!(rig.hw.power_path(), PowerPath::Off);
    assert_eq!(rig.hw.charge_current(), 0);
}

#[test]
fn termination_is_detected_from_telemetry() {
    let mut rig = Rig::new();
    rig.send(Event::Connected100W);
    assert_eq!(rig.ctl.current_state(), StateId::Charging100W);

    rig.hw.set_cells(&[3650, 3650, 3650, 3650]);
    rig.hw.pack.batt_ma = 120;
    rig.steps(5);

    assert_eq!(rig.ctl.current_state(), StateId::Idle);
    let done = rig.sink.count(|e| {
        matches!(
            e,
            AppEvent::StateChanged {
                from: StateId::Charging100W,
                to: StateId::Idle,
                event: Event::ChargeDone,
            }
        )
    });
    assert_eq!(done, 1);
}

#[test]
fn high_voltage_at_full_current_is_not_termination() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);

    rig.hw.set_cells(&[3650, 3650, 3650, 3650]);
    rig.hw.pack.batt_ma = 1000;
    rig.steps(10);

    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
}

#[test]
fn switching_sources_breaks_before_make() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);
    rig.send(Event::Connected100W);
    assert_eq!(rig.ctl.current_state(), StateId::Charging100W);

    let usb60 = last_enable_index(&rig, PowerPath::Usb60W);
    let usb100 = last_enable_index(&rig, PowerPath::Usb100W);
    assert!(usb60 < usb100);
    assert!(
        rig.hw.calls[usb60..usb100].contains(&ActuatorCall::SetPowerPath(PowerPath::Off)),
        "100 W enabled without disabling 60 W first"
    );
}

#[test]
fn solar_then_usb_takes_over() {
    let mut rig = Rig::new();
    rig.send(Event::ConnectedMppt);
    assert_eq!(rig.hw.power_path(), PowerPath::Mppt);

    rig.send(Event::Connected60W);
    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
    assert_eq!(rig.hw.power_path(), PowerPath::Usb60W);
}

// ── Protection ────────────────────────────────────────────────

#[test]
fn bms_alert_while_charging_latches_fault() {
    let mut rig = Rig::new();
    rig.send(Event::Connected100W);
    rig.steps(2);
    assert_eq!(rig.hw.charge_current(), 5000);

    rig.hw.faults = FaultBits::NONE.with(FaultFlag::BmsAlert);
    rig.steps(2);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(rig.hw.power_path(), PowerPath::Off);
    assert_eq!(rig.hw.charge_current(), 0);
    assert_eq!(rig.hw.balancing_mask(), 0);

    let latched = rig.ctl.latched_fault().expect("fault latched");
    assert_eq!(latched.reason, FaultReason::Bms);
    assert_eq!(latched.from, StateId::Charging100W);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::FaultLatched { reason: FaultReason::Bms, .. })),
        1
    );
}

#[test]
fn fault_ignores_every_event() {
    let mut rig = Rig::new();
    rig.send(Event::BmsFault);
    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    let calls_before = rig.hw.calls.len();

    for event in Event::ALL {
        rig.queue.push(event);
        assert_eq!(rig.step(), Some(DispatchOutcome::Latched));
        assert_eq!(rig.ctl.current_state(), StateId::Fault);
    }
    assert!(
        !rig.hw.calls[calls_before..]
            .iter()
            .any(|c| matches!(c, ActuatorCall::SetPowerPath(p) if *p != PowerPath::Off)),
        "an output was enabled while faulted"
    );
}

#[test]
fn over_temperature_in_solar_charge() {
    let mut rig = Rig::new();
    rig.send(Event::ConnectedMppt);

    rig.hw.pack.temperature_c = 61;
    rig.steps(2);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::OverTemperature)
    );
}

#[test]
fn over_current_while_discharging() {
    let mut rig = Rig::new();
    rig.send(Event::PowerGood);
    assert_eq!(rig.ctl.current_state(), StateId::Discharging);
    assert_eq!(rig.hw.power_path(), PowerPath::Battery);

    rig.hw.pack.batt_ma = -8_500;
    rig.steps(2);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(rig.hw.power_path(), PowerPath::Off);
    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::OverCurrent)
    );
}

#[test]
fn lost_telemetry_while_charging_escalates() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);

    rig.hw.sensors_down = true;
    rig.steps(6);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::PeripheralBus)
    );
    assert_eq!(rig.hw.power_path(), PowerPath::Off);
}

#[test]
fn charger_fault_flag_escalates() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);

    rig.hw.faults = FaultBits::NONE.with(FaultFlag::ChargerFault);
    rig.steps(2);

    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::ChargerError)
    );
}

#[test]
fn heat_held_from_idle_faults_on_connect() {
    let mut rig = Rig::new();
    rig.hw.pack.temperature_c = 75;
    rig.steps(3);
    assert_eq!(rig.ctl.current_state(), StateId::Idle);

    rig.send(Event::Connected60W);
    rig.steps(2);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::OverTemperature)
    );
    assert_eq!(rig.hw.power_path(), PowerPath::Off);
    assert_eq!(rig.hw.charge_current(), 0);
}

#[test]
fn charger_fault_held_from_idle_faults_on_connect() {
    let mut rig = Rig::new();
    rig.hw.faults = FaultBits::NONE.with(FaultFlag::ChargerFault);
    rig.steps(3);
    assert_eq!(rig.ctl.current_state(), StateId::Idle);

    rig.send(Event::Connected100W);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::ChargerError)
    );
    assert_eq!(rig.hw.power_path(), PowerPath::Off);
}

#[test]
fn over_current_held_from_idle_faults_on_connect() {
    let mut rig = Rig::new();
    rig.hw.pack.batt_ma = 7_000;
    rig.steps(2);
    assert_eq!(rig.ctl.current_state(), StateId::Idle);

    rig.send(Event::ConnectedMppt);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(
        rig.ctl.latched_fault().map(|f| f.reason),
        Some(FaultReason::OverCurrent)
    );
}

#[test]
fn cleared_condition_is_not_replayed() {
    let mut rig = Rig::new();
    rig.hw.pack.temperature_c = 75;
    rig.steps(2);
    rig.hw.pack.temperature_c = 30;
    rig.steps(2);

    rig.send(Event::Connected60W);
    rig.steps(3);
    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
    assert!(rig.ctl.latched_fault().is_none());
}

// ── Reset ─────────────────────────────────────────────────────

#[test]
fn hardware_reset_recovers_to_idle() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);
    rig.hw.faults = FaultBits::NONE.with(FaultFlag::BmsAlert);
    rig.steps(2);
    assert_eq!(rig.ctl.current_state(), StateId::Fault);

    rig.hw.faults = FaultBits::NONE;
    rig.reset();
    assert_eq!(rig.ctl.current_state(), StateId::Idle);
    assert!(rig.ctl.latched_fault().is_none());
    assert!(rig.sink.events.contains(&AppEvent::Reset {
        from: StateId::Fault
    }));

    rig.send(Event::Connected60W);
    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
    assert_eq!(rig.hw.power_path(), PowerPath::Usb60W);
}

#[test]
fn reset_with_alert_still_asserted_faults_again() {
    let mut rig = Rig::new();
    rig.hw.faults = FaultBits::NONE.with(FaultFlag::BmsAlert);
    rig.steps(2);
    assert_eq!(rig.ctl.current_state(), StateId::Fault);

    rig.reset();
    assert_eq!(rig.ctl.current_state(), StateId::Idle);
    rig.steps(2);

    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::FaultLatched { .. })),
        2
    );
}

// ── Standby ───────────────────────────────────────────────────

#[test]
fn standby_times_out_to_idle() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);
    rig.send(Event::SourceDisconnected);
    assert_eq!(rig.ctl.current_state(), StateId::Standby);
    assert_eq!(rig.hw.power_path(), PowerPath::Off);

    rig.steps(10);
    assert_eq!(rig.ctl.current_state(), StateId::Standby);

    rig.steps(15);
    assert_eq!(rig.ctl.current_state(), StateId::Idle);
}

#[test]
fn power_good_leaves_standby_before_deadline() {
    let mut rig = Rig::new();
    rig.send(Event::ConnectedMppt);
    rig.send(Event::SourceDisconnected);
    rig.send(Event::PowerGood);
    assert_eq!(rig.ctl.current_state(), StateId::Discharging);

    // The abandoned deadline must not fire into Discharging.
    rig.steps(40);
    assert_eq!(rig.ctl.current_state(), StateId::Discharging);
    assert_eq!(rig.hw.power_path(), PowerPath::Battery);
}

#[test]
fn source_returns_during_standby() {
    let mut rig = Rig::new();
    rig.send(Event::Connected100W);
    rig.send(Event::SourceDisconnected);
    rig.send(Event::Connected100W);
    assert_eq!(rig.ctl.current_state(), StateId::Charging100W);
    assert_eq!(rig.hw.power_path(), PowerPath::Usb100W);
}

// ── Balancing ─────────────────────────────────────────────────

#[test]
fn balancing_bleeds_only_cells_near_the_top() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[3770, 3780, 3776, 3300]);
    rig.steps(1);

    assert!(rig.ctl.balancing_active());
    // floor = 3780 - 10/2 = 3775
    assert_eq!(rig.hw.balancing_mask(), 0b0110);
}

#[test]
fn balancing_stops_once_spread_closes() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[3700, 3740, 3700, 3700]);
    rig.steps(1);
    assert!(rig.ctl.balancing_active());
    assert_eq!(rig.hw.balancing_mask(), 0b0010);

    // Inside the hysteresis band: keeps going.
    rig.hw.set_cells(&[3700, 3715, 3700, 3700]);
    rig.steps(1);
    assert!(rig.ctl.balancing_active());

    rig.hw.set_cells(&[3700, 3708, 3700, 3700]);
    rig.steps(1);
    assert!(!rig.ctl.balancing_active());
    assert_eq!(rig.hw.balancing_mask(), 0);
}

#[test]
fn no_balancing_below_minimum_cell_voltage() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[3100, 3190, 3150, 3120]);
    rig.steps(3);

    assert!(!rig.ctl.balancing_active());
    assert_eq!(rig.hw.balancing_mask(), 0);
}

#[test]
fn weak_cell_is_never_bled() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[3700, 3750, 3780, 3100]);
    rig.steps(3);

    assert_eq!(rig.hw.balancing_mask() & 0b1000, 0);
    assert!(
        !rig.hw
            .calls
            .iter()
            .any(|c| matches!(c, ActuatorCall::SetBalancingMask(m) if m & 0b1000 != 0))
    );
}
