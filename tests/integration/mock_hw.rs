//! Mock hardware adapter for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history, and serves scripted telemetry without a real charger or cell
//! monitor.

use powerpath::app::events::AppEvent;
use powerpath::app::ports::{ActuatorPort, EventSink, PowerPath, SensorPort};
use powerpath::config::PowerPathConfig;
use powerpath::error::{ActuatorError, SensorError};
use powerpath::fsm::DispatchOutcome;
use powerpath::sensors::{CellVoltages, FaultBits, PackTelemetry};
use powerpath::{Event, EventQueue, PowerPathController};

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    SetPowerPath(PowerPath),
    SetChargeCurrent(u16),
    SetBalancingMask(u8),
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<ActuatorCall>,
    pub cells: Vec<u16>,
    pub pack: PackTelemetry,
    pub faults: FaultBits,
    /// Every sensor read fails with `Transport` while set.
    pub sensors_down: bool,
    /// Every actuator write fails with `Transport` while set.
    pub outputs_down: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            cells: vec![3500, 3500, 3500, 3500],
            pack: PackTelemetry {
                bus_mv: 0,
                bus_ma: 0,
                batt_mv: 14_000,
                batt_ma: 0,
                temperature_c: 25,
            },
            faults: FaultBits::NONE,
            sensors_down: false,
            outputs_down: false,
        }
    }

    pub fn last_call(&self) -> Option<&ActuatorCall> {
        self.calls.last()
    }

    /// Path most recently commanded (Off if never).
    pub fn power_path(&self) -> PowerPath {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::SetPowerPath(p) => Some(*p),
                _ => None,
            })
            .unwrap_or(PowerPath::Off)
    }

    pub fn charge_current(&self) -> u16 {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::SetChargeCurrent(ma) => Some(*ma),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn balancing_mask(&self) -> u8 {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::SetBalancingMask(m) => Some(*m),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Times `path` was commanded.
    pub fn path_commands(&self, path: PowerPath) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == ActuatorCall::SetPowerPath(path))
            .count()
    }

    pub fn set_cells(&mut self, cells: &[u16]) {
        self.cells = cells.to_vec();
        self.pack.batt_mv = cells.iter().sum();
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockHardware {
    fn read_cell_voltages(&mut self) -> Result<CellVoltages, SensorError> {
        if self.sensors_down {
            return Err(SensorError::Transport);
        }
        CellVoltages::from_slice(&self.cells).map_err(|_| SensorError::OutOfRange)
    }

    fn read_pack_telemetry(&mut self) -> Result<PackTelemetry, SensorError> {
        if self.sensors_down {
            return Err(SensorError::Transport);
        }
        Ok(self.pack)
    }

    fn read_fault_flags(&mut self) -> Result<FaultBits, SensorError> {
        if self.sensors_down {
            return Err(SensorError::Transport);
        }
        Ok(self.faults)
    }
}

impl ActuatorPort for MockHardware {
    fn set_power_path(&mut self, path: PowerPath) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::SetPowerPath(path));
        if self.outputs_down {
            return Err(ActuatorError::Transport);
        }
        Ok(())
    }

    fn set_charge_current(&mut self, ma: u16) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::SetChargeCurrent(ma));
        if self.outputs_down {
            return Err(ActuatorError::Transport);
        }
        Ok(())
    }

    fn set_balancing_mask(&mut self, mask: u8) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::SetBalancingMask(mask));
        if self.outputs_down {
            return Err(ActuatorError::Transport);
        }
        Ok(())
    }
}

// ── Recording event sink ──────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Test rig ──────────────────────────────────────────────────

/// Every periodic task due on every tick, short standby deadline.
pub fn fast_config() -> PowerPathConfig {
    let mut config = PowerPathConfig::default();
    config.schedule.sensor_poll_ticks = 1;
    config.schedule.balancing_ticks = 1;
    config.schedule.standby_timeout_ticks = 20;
    config
}

/// Controller, queue and mocks wired together and started.
pub struct Rig {
    pub ctl: PowerPathController,
    pub queue: EventQueue,
    pub hw: MockHardware,
    pub sink: LogSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: PowerPathConfig) -> Self {
        let mut rig = Self {
            ctl: PowerPathController::new(config).expect("valid config"),
            queue: EventQueue::new(),
            hw: MockHardware::new(),
            sink: LogSink::new(),
        };
        rig.ctl.start(&mut rig.hw, &mut rig.sink);
        rig
    }

    /// One base tick followed by one main-loop pass.
    pub fn step(&mut self) -> Option<DispatchOutcome> {
        self.ctl.tick();
        self.ctl.run_once(&self.queue, &mut self.hw, &mut self.sink)
    }

    pub fn steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Push `event` and run until the queue is drained.
    pub fn send(&mut self, event: Event) {
        self.queue.push(event);
        while !self.queue.is_empty() {
            self.step();
        }
    }

    pub fn reset(&mut self) {
        self.ctl.hardware_reset(&mut self.hw, &mut self.sink);
    }
}
