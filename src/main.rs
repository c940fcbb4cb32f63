//! Power-path simulator: host entry point.
//!
//! Runs the real [`PowerPathController`] against a simulated 4S pack,
//! charger and power-path switch, replaying a fixed scenario:
//!
//! ```text
//!   connect 60 W ─▶ charge + balance ─▶ ChargeDone ─▶ discharge
//!        ─▶ solar ─▶ over-temperature ─▶ Fault ─▶ hardware reset
//! ```
//!
//! Optional first argument: path to a JSON [`PowerPathConfig`].
#![deny(unused_must_use)]

use core::convert::Infallible;

use anyhow::{Result, anyhow, bail};
use embedded_hal::digital::{ErrorType, OutputPin};
use log::info;

use powerpath::adapters::gpio_path::GpioPowerPath;
use powerpath::adapters::log_sink::LogEventSink;
use powerpath::app::events::AppEvent;
use powerpath::app::ports::{ActuatorPort, EventSink, PowerPath, SensorPort};
use powerpath::config::PowerPathConfig;
use powerpath::diagnostics::FAULT_LOG_DEPTH;
use powerpath::error::{ActuatorError, SensorError};
use powerpath::events::BmsSignal;
use powerpath::sensors::{CellVoltages, FaultBits, PackTelemetry};
use powerpath::{Event, EventQueue, PowerPathController, StateId};

/// Shared with the (simulated) interrupt producers.
static EVENT_QUEUE: EventQueue = EventQueue::new();

/// Hard stop for a scenario that never completes.
const MAX_TICKS: u64 = 100_000;
/// Telemetry line every 10 s of simulated time.
const TELEMETRY_EVERY: u64 = 1_000;

// ── Simulated hardware ────────────────────────────────────────

/// Stand-in for a GPIO enable line.
#[derive(Default)]
struct SimPin {
    high: bool,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}

/// 4S pack with a charger that tapers toward 3.70 V/cell.
struct SimHardware {
    /// Cell voltages in µV so small currents still integrate.
    cells_uv: [i64; 4],
    temperature_c: i16,
    /// Load drawn while the battery output is closed.
    load_ma: i32,
    batt_ma: i32,
    path: GpioPowerPath<SimPin>,
    charge_limit_ma: u16,
    mask: u8,
}

impl SimHardware {
    const FULL_CELL_MV: i32 = 3700;
    const BLEED_UV_PER_TICK: i64 = 40;

    fn new() -> Result<Self, ActuatorError> {
        Ok(Self {
            cells_uv: [3_460_000, 3_470_000, 3_495_000, 3_440_000],
            temperature_c: 25,
            load_ma: 0,
            batt_ma: 0,
            path: GpioPowerPath::new(
                SimPin::default(),
                SimPin::default(),
                SimPin::default(),
                SimPin::default(),
            )?,
            charge_limit_ma: 0,
            mask: 0,
        })
    }

    fn avg_cell_mv(&self) -> i32 {
        (self.cells_uv.iter().sum::<i64>() / 4_000) as i32
    }

    /// Advance the pack model one base tick.
    fn step(&mut self) {
        let path = self.path.current();
        self.batt_ma = if path.is_charging() {
            let acceptance = (Self::FULL_CELL_MV - self.avg_cell_mv()).max(0) * 50;
            i32::from(self.charge_limit_ma).min(acceptance)
        } else if path == PowerPath::Battery {
            -self.load_ma
        } else {
            0
        };

        let delta = i64::from(self.batt_ma) / 50;
        for (i, cell) in self.cells_uv.iter_mut().enumerate() {
            *cell += delta;
            if self.mask & (1 << i) != 0 {
                *cell -= Self::BLEED_UV_PER_TICK;
            }
        }
    }
}

impl SensorPort for SimHardware {
    fn read_cell_voltages(&mut self) -> Result<CellVoltages, SensorError> {
        Ok(self.cells_uv.iter().map(|uv| (uv / 1000) as u16).collect())
    }

    fn read_pack_telemetry(&mut self) -> Result<PackTelemetry, SensorError> {
        let bus_mv = match self.path.current() {
            PowerPath::Usb60W | PowerPath::Usb100W => 20_000,
            PowerPath::Mppt => 18_500,
            _ => 0,
        };
        Ok(PackTelemetry {
            bus_mv,
            bus_ma: self.batt_ma.max(0),
            batt_mv: (self.cells_uv.iter().sum::<i64>() / 1000) as u16,
            batt_ma: self.batt_ma,
            temperature_c: self.temperature_c,
        })
    }

    fn read_fault_flags(&mut self) -> Result<FaultBits, SensorError> {
        Ok(FaultBits::NONE)
    }
}

impl ActuatorPort for SimHardware {
    fn set_power_path(&mut self, path: PowerPath) -> Result<(), ActuatorError> {
        self.path.select(path)
    }

    fn set_charge_current(&mut self, ma: u16) -> Result<(), ActuatorError> {
        self.charge_limit_ma = ma;
        Ok(())
    }

    fn set_balancing_mask(&mut self, mask: u8) -> Result<(), ActuatorError> {
        self.mask = mask;
        Ok(())
    }
}

// ── Scenario script ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Charging,
    Discharge,
    Solar,
    Heat,
    Cooldown,
    Done,
}

struct Scenario {
    phase: Phase,
    entered_at: u64,
    seen_charging: bool,
}

impl Scenario {
    fn new() -> Self {
        Self {
            phase: Phase::Connect,
            entered_at: 0,
            seen_charging: false,
        }
    }

    fn enter(&mut self, phase: Phase, now: u64) {
        info!("SCENARIO | {:?} -> {:?} at tick {now}", self.phase, phase);
        self.phase = phase;
        self.entered_at = now;
    }

    /// Drive the next step of the script from what the controller reports.
    fn advance(
        &mut self,
        ctl: &mut PowerPathController,
        hw: &mut SimHardware,
        sink: &mut impl EventSink,
    ) {
        let now = ctl.ticks();
        let age = now - self.entered_at;
        let state = ctl.current_state();

        match self.phase {
            Phase::Connect if age >= 20 => {
                EVENT_QUEUE.post_signal(BmsSignal::PowerSourceConnected { watts: 60 });
                self.enter(Phase::Charging, now);
            }
            Phase::Charging => {
                self.seen_charging |= state.is_charging();
                if self.seen_charging && state == StateId::Idle {
                    hw.load_ma = 3_000;
                    EVENT_QUEUE.push(Event::PowerGood);
                    self.enter(Phase::Discharge, now);
                }
            }
            Phase::Discharge if age >= 1_500 => {
                EVENT_QUEUE.post_signal(BmsSignal::SolarConnected);
                self.enter(Phase::Solar, now);
            }
            Phase::Solar if age >= 500 && state == StateId::ChargingMppt => {
                hw.temperature_c = 65;
                self.enter(Phase::Heat, now);
            }
            Phase::Heat if state == StateId::Fault => {
                hw.temperature_c = 25;
                self.enter(Phase::Cooldown, now);
            }
            Phase::Cooldown if age >= 300 => {
                EVENT_QUEUE.clear();
                ctl.hardware_reset(hw, sink);
                self.enter(Phase::Done, now);
            }
            _ => {}
        }
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("powerpath-sim v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            let config = PowerPathConfig::from_json(&json).map_err(|e| anyhow!("{path}: {e}"))?;
            info!("Config loaded from {path}");
            config
        }
        None => PowerPathConfig::default(),
    };
    if config.cells.count != 4 {
        bail!("the simulated pack is 4S, config asks for {}S", config.cells.count);
    }

    let mut hw = SimHardware::new().map_err(|e| anyhow!("power path init: {e}"))?;
    let mut sink = LogEventSink::new();
    let mut ctl = PowerPathController::new(config)?;
    let mut scenario = Scenario::new();

    ctl.start(&mut hw, &mut sink);

    while scenario.phase != Phase::Done {
        if ctl.ticks() >= MAX_TICKS {
            bail!(
                "scenario stalled in {:?} (state {})",
                scenario.phase,
                ctl.current_state().name()
            );
        }

        ctl.tick();
        hw.step();
        scenario.advance(&mut ctl, &mut hw, &mut sink);
        ctl.run_once(&EVENT_QUEUE, &mut hw, &mut sink);

        if ctl.ticks() % TELEMETRY_EVERY == 0 {
            sink.emit(&AppEvent::Telemetry(ctl.build_telemetry()));
        }
    }

    let summary =
        serde_json::to_string(&ctl.build_telemetry()).map_err(|e| anyhow!("telemetry: {e}"))?;
    info!("Final: {summary}");

    let mut buf = [0u8; FAULT_LOG_DEPTH * 24];
    let blob = ctl
        .fault_log()
        .encode(&mut buf)
        .map_err(|e| anyhow!("fault log export: {e}"))?;
    info!(
        "Fault log: {} record(s), {} byte export",
        ctl.fault_log().len(),
        blob.len()
    );
    for record in ctl.fault_log().iter() {
        info!("  {record:?}");
    }

    Ok(())
}
