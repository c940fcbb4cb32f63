//! Controller-level behaviour: event reporting, queue overflow, output
//! failures, telemetry freshness and the GPIO path adapter.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};

use powerpath::adapters::gpio_path::GpioPowerPath;
use powerpath::app::events::AppEvent;
use powerpath::app::ports::{ActuatorPort, PowerPath, SensorPort};
use powerpath::config::PowerPathConfig;
use powerpath::diagnostics::{FaultCode, FaultLog, FaultSource};
use powerpath::error::{ActuatorError, SensorError};
use powerpath::fsm::DispatchOutcome;
use powerpath::sensors::{CellVoltages, FaultBits, FaultFlag, PackTelemetry};
use powerpath::{Event, EventQueue, PowerPathController, StateId};

use crate::mock_hw::{ActuatorCall, LogSink, MockHardware, Rig, fast_config};

// ── Event reporting ───────────────────────────────────────────

#[test]
fn start_is_reported_first() {
    let rig = Rig::new();
    assert_eq!(rig.sink.events.first(), Some(&AppEvent::Started(StateId::Idle)));
    assert_eq!(rig.ctl.current_state(), StateId::Idle);
}

#[test]
fn every_transition_is_reported_in_order() {
    let mut rig = Rig::new();
    rig.send(Event::Connected60W);
    rig.send(Event::SourceDisconnected);
    rig.send(Event::PowerGood);

    let changes: Vec<_> = rig
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to, event } => Some((*from, *to, *event)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        [
            (StateId::Idle, StateId::Charging60W, Event::Connected60W),
            (StateId::Charging60W, StateId::Standby, Event::SourceDisconnected),
            (StateId::Standby, StateId::Discharging, Event::PowerGood),
        ]
    );
}

#[test]
fn unhandled_event_changes_nothing() {
    let mut rig = Rig::new();
    let calls_before = rig.hw.calls.len();
    rig.queue.push(Event::ChargeDone);
    assert_eq!(rig.step(), Some(DispatchOutcome::Unhandled));
    assert_eq!(rig.ctl.current_state(), StateId::Idle);
    assert!(
        !rig.hw.calls[calls_before..]
            .iter()
            .any(|c| matches!(c, ActuatorCall::SetPowerPath(_)))
    );
}

#[test]
fn queue_overflow_is_reported_once() {
    let mut rig = Rig::new();
    for _ in 0..20 {
        rig.queue.push(Event::Timeout);
    }
    assert_eq!(rig.queue.len(), rig.queue.capacity());

    rig.steps(3);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::EventsDropped(_))),
        1
    );
    assert!(rig.sink.events.contains(&AppEvent::EventsDropped(4)));
}

#[test]
fn charge_current_follows_voltage_bands() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[2900, 2900, 2900, 2900]);
    rig.send(Event::Connected60W);
    rig.steps(1);
    assert_eq!(rig.hw.charge_current(), 100);

    rig.hw.set_cells(&[3400, 3400, 3400, 3400]);
    rig.steps(1);
    assert_eq!(rig.hw.charge_current(), 5000);

    rig.hw.set_cells(&[3660, 3660, 3660, 3660]);
    rig.steps(1);
    assert_eq!(rig.hw.charge_current(), 1000);
    assert_eq!(rig.ctl.charge_target_ma(), Some(1000));

    let reported: Vec<u16> = rig
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::ChargeCurrentChanged(ma) => Some(*ma),
            _ => None,
        })
        .collect();
    assert_eq!(reported, [100, 5000, 1000]);
}

#[test]
fn unchanged_band_is_not_recommanded() {
    let mut rig = Rig::new();
    rig.send(Event::Connected100W);
    rig.steps(10);
    let writes = rig
        .hw
        .calls
        .iter()
        .filter(|c| **c == ActuatorCall::SetChargeCurrent(5000))
        .count();
    assert_eq!(writes, 1);
}

#[test]
fn default_cadence_programs_current_on_entry() {
    let mut rig = Rig::with_config(PowerPathConfig::default());
    rig.steps(10);
    assert!(rig.ctl.snapshot().pack_fresh);

    rig.queue.push(Event::Connected60W);
    rig.step();
    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
    assert_eq!(rig.hw.charge_current(), 5000);
}

#[test]
fn default_cadence_follows_every_sample() {
    let mut rig = Rig::with_config(PowerPathConfig::default());
    rig.send(Event::Connected60W);
    rig.steps(11);
    assert_eq!(rig.hw.charge_current(), 5000);

    rig.hw.set_cells(&[3660, 3660, 3660, 3660]);
    rig.steps(10);
    assert_eq!(rig.hw.charge_current(), 1000);
}

#[test]
fn profile_is_not_run_outside_charging() {
    let mut rig = Rig::new();
    rig.send(Event::PowerGood);
    rig.steps(5);
    assert_eq!(rig.ctl.charge_target_ma(), None);
    assert_eq!(rig.hw.charge_current(), 0);
}

// ── Output failures ───────────────────────────────────────────

#[test]
fn failed_path_command_is_logged_not_assumed() {
    let mut rig = Rig::new();
    rig.hw.outputs_down = true;
    rig.send(Event::Connected60W);

    assert_eq!(rig.ctl.current_state(), StateId::Charging60W);
    assert_eq!(rig.ctl.power_path(), PowerPath::Off);
    assert!(rig.ctl.fault_log().iter().any(|r| {
        r.code == FaultCode::Transport && r.source == FaultSource::PowerSwitch
    }));
}

#[test]
fn failed_balancing_write_is_retried() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[3700, 3740, 3700, 3700]);
    rig.hw.outputs_down = true;
    rig.steps(1);
    assert!(rig.ctl.fault_log().iter().any(|r| r.source == FaultSource::CellMonitor));

    rig.hw.outputs_down = false;
    rig.steps(1);
    assert_eq!(rig.hw.balancing_mask(), 0b0010);
    assert!(rig.sink.events.contains(&AppEvent::BalancingChanged {
        active: true,
        mask: 0b0010,
    }));
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn stale_channels_keep_last_values() {
    let mut rig = Rig::new();
    rig.hw.set_cells(&[3510, 3520, 3530, 3540]);
    rig.steps(1);
    assert!(rig.ctl.snapshot().is_complete());

    rig.hw.sensors_down = true;
    rig.steps(1);
    let snap = rig.ctl.snapshot();
    assert!(!snap.cells_fresh);
    assert!(!snap.pack_fresh);
    assert_eq!(snap.min_cell_mv(), Some(3510));
    assert_eq!(snap.max_cell_mv(), Some(3540));
}

#[test]
fn sensor_failure_run_logs_one_record() {
    let mut rig = Rig::new();
    rig.hw.sensors_down = true;
    rig.steps(2);
    rig.hw.sensors_down = false;
    rig.steps(1);
    rig.hw.sensors_down = true;
    rig.steps(2);

    let transport = rig
        .ctl
        .fault_log()
        .iter()
        .filter(|r| r.code == FaultCode::Transport && r.source == FaultSource::Core)
        .count();
    assert_eq!(transport, 2);
    assert_eq!(rig.ctl.current_state(), StateId::Idle);
}

#[test]
fn telemetry_summary_serialises() {
    let mut rig = Rig::new();
    rig.send(Event::Connected100W);
    rig.steps(1);

    let summary = rig.ctl.build_telemetry();
    assert_eq!(summary.state, "Charging100W");
    assert_eq!(summary.power_path, PowerPath::Usb100W);
    assert_eq!(summary.charge_target_ma, Some(5000));

    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"state\":\"Charging100W\""));
}

#[test]
fn fault_log_survives_export() {
    let mut rig = Rig::new();
    rig.send(Event::PowerGood);
    rig.hw.faults = FaultBits::NONE.with(FaultFlag::OverCurrent);
    rig.steps(2);
    assert_eq!(rig.ctl.current_state(), StateId::Fault);
    assert_eq!(rig.ctl.fault_log().last_code(), Some(FaultCode::ProtectionTrip));

    let mut buf = [0u8; 512];
    let blob = rig.ctl.fault_log().encode(&mut buf).unwrap();
    let restored = FaultLog::decode(blob).unwrap();
    assert_eq!(restored.len(), rig.ctl.fault_log().len());
    assert_eq!(
        restored.last().map(|r| r.code),
        Some(FaultCode::ProtectionTrip)
    );
}

// ── Concurrency ───────────────────────────────────────────────

#[test]
fn producer_thread_feeds_static_queue() {
    static QUEUE: EventQueue = EventQueue::new();

    let producer = std::thread::spawn(|| {
        QUEUE.push(Event::ConnectedMppt);
        QUEUE.push(Event::SourceDisconnected);
        QUEUE.push(Event::PowerGood);
    });
    producer.join().unwrap();

    let mut ctl = PowerPathController::new(fast_config()).unwrap();
    let mut hw = MockHardware::new();
    let mut sink = LogSink::new();
    ctl.start(&mut hw, &mut sink);
    while !QUEUE.is_empty() {
        ctl.tick();
        ctl.run_once(&QUEUE, &mut hw, &mut sink);
    }

    assert_eq!(ctl.current_state(), StateId::Discharging);
    assert_eq!(hw.power_path(), PowerPath::Battery);
}

// ── GPIO power-path adapter ───────────────────────────────────

/// Enable line whose level the test can observe after handing it over.
#[derive(Clone, Default)]
struct SharedPin(Rc<Cell<bool>>);

impl ErrorType for SharedPin {
    type Error = Infallible;
}

impl OutputPin for SharedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

/// Scripted sensors from [`MockHardware`], real path switching on pins.
struct GpioBench {
    sensors: MockHardware,
    path: GpioPowerPath<SharedPin>,
}

impl SensorPort for GpioBench {
    fn read_cell_voltages(&mut self) -> Result<CellVoltages, SensorError> {
        self.sensors.read_cell_voltages()
    }

    fn read_pack_telemetry(&mut self) -> Result<PackTelemetry, SensorError> {
        self.sensors.read_pack_telemetry()
    }

    fn read_fault_flags(&mut self) -> Result<FaultBits, SensorError> {
        self.sensors.read_fault_flags()
    }
}

impl ActuatorPort for GpioBench {
    fn set_power_path(&mut self, path: PowerPath) -> Result<(), ActuatorError> {
        self.path.select(path)
    }

    fn set_charge_current(&mut self, ma: u16) -> Result<(), ActuatorError> {
        self.sensors.set_charge_current(ma)
    }

    fn set_balancing_mask(&mut self, mask: u8) -> Result<(), ActuatorError> {
        self.sensors.set_balancing_mask(mask)
    }
}

#[test]
fn fault_drives_every_enable_line_low() {
    let pins: [SharedPin; 4] = Default::default();
    let [usb60, usb100, mppt, battery] = pins.clone();
    let mut hw = GpioBench {
        sensors: MockHardware::new(),
        path: GpioPowerPath::new(usb60, usb100, mppt, battery).unwrap(),
    };
    let queue: EventQueue = EventQueue::new();
    let mut sink = LogSink::new();
    let mut ctl = PowerPathController::new(fast_config()).unwrap();
    ctl.start(&mut hw, &mut sink);

    queue.push(Event::Connected100W);
    ctl.tick();
    ctl.run_once(&queue, &mut hw, &mut sink);
    let levels: Vec<bool> = pins.iter().map(|p| p.0.get()).collect();
    assert_eq!(levels, [false, true, false, false]);

    hw.sensors.faults = FaultBits::NONE.with(FaultFlag::BmsAlert);
    for _ in 0..2 {
        ctl.tick();
        ctl.run_once(&queue, &mut hw, &mut sink);
    }

    assert_eq!(ctl.current_state(), StateId::Fault);
    assert!(pins.iter().all(|p| !p.0.get()));
    assert_eq!(hw.path.current(), PowerPath::Off);
}
