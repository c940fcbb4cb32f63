//! Fuzz target: controller dispatch
//!
//! Interprets each input byte either as an event tag (pushed into the
//! queue) or, for unknown tags, as the fault-flag register the next poll
//! will read.  After every pass it checks that:
//! - a latched fault always has every output off
//! - the acknowledged path matches the current state
//!
//! cargo fuzz run fuzz_dispatch

#![no_main]

use libfuzzer_sys::fuzz_target;
use powerpath::app::events::AppEvent;
use powerpath::app::ports::{ActuatorPort, EventSink, PowerPath, SensorPort};
use powerpath::config::PowerPathConfig;
use powerpath::error::{ActuatorError, SensorError};
use powerpath::sensors::{CellVoltages, FaultBits, PackTelemetry};
use powerpath::{Event, EventQueue, PowerPathController, StateId};

struct Bench {
    faults: FaultBits,
    path: PowerPath,
    current_ma: u16,
    mask: u8,
}

impl SensorPort for Bench {
    fn read_cell_voltages(&mut self) -> Result<CellVoltages, SensorError> {
        CellVoltages::from_slice(&[3500, 3520, 3480, 3560]).map_err(|_| SensorError::OutOfRange)
    }

    fn read_pack_telemetry(&mut self) -> Result<PackTelemetry, SensorError> {
        Ok(PackTelemetry {
            batt_mv: 14_060,
            temperature_c: 30,
            ..Default::default()
        })
    }

    fn read_fault_flags(&mut self) -> Result<FaultBits, SensorError> {
        Ok(self.faults)
    }
}

impl ActuatorPort for Bench {
    fn set_power_path(&mut self, path: PowerPath) -> Result<(), ActuatorError> {
        self.path = path;
        Ok(())
    }

    fn set_charge_current(&mut self, ma: u16) -> Result<(), ActuatorError> {
        self.current_ma = ma;
        Ok(())
    }

    fn set_balancing_mask(&mut self, mask: u8) -> Result<(), ActuatorError> {
        self.mask = mask;
        Ok(())
    }
}

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let mut config = PowerPathConfig::default();
    config.schedule.sensor_poll_ticks = 1;
    config.schedule.standby_timeout_ticks = 4;
    let Ok(mut ctl) = PowerPathController::new(config) else {
        return;
    };

    let queue: EventQueue = EventQueue::new();
    let mut hw = Bench {
        faults: FaultBits::NONE,
        path: PowerPath::Off,
        current_ma: 0,
        mask: 0,
    };
    ctl.start(&mut hw, &mut Discard);

    for &byte in data {
        match Event::from_u8(byte) {
            Some(event) => {
                queue.push(event);
            }
            None => hw.faults = FaultBits(byte & 0x0F),
        }
        ctl.tick();
        ctl.run_once(&queue, &mut hw, &mut Discard);

        if ctl.current_state() == StateId::Fault {
            assert_eq!(hw.path, PowerPath::Off, "path live while faulted");
            assert_eq!(hw.current_ma, 0, "charger live while faulted");
            assert!(ctl.latched_fault().is_some());
        }
        assert_eq!(hw.path, ctl.power_path());
    }
});
