//! Controller service: the hexagonal core.
//!
//! [`PowerPathController`] owns the state machine, its context, the
//! scheduler, the telemetry sampler, the safety supervisor and both control
//! loops.  All I/O flows through port traits passed in at call sites, so the
//! whole controller runs against mock adapters in tests.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │      PowerPathController      │
//! ActuatorPort ◀──│ FSM · Safety · Profile · Bal. │
//!                 └──────────────┬───────────────┘
//!                                │ pop / push
//!                           EventQueue ◀── ISR producers
//! ```

use log::{debug, info};

use crate::config::PowerPathConfig;
use crate::control::balancing::BalancingEvaluator;
use crate::control::charge_profile::ChargeProfileSelector;
use crate::diagnostics::{FaultCode, FaultLog, FaultRecord, FaultSource};
use crate::error::Error;
use crate::events::{Event, EventQueue};
use crate::fsm::context::{LatchedFault, PowerContext};
use crate::fsm::states::build_transition_table;
use crate::fsm::{DispatchOutcome, PowerStateMachine, StateId, Transition};
use crate::safety::SafetySupervisor;
use crate::scheduler::{PeriodicScheduler, TaskId};
use crate::sensors::{TelemetrySampler, TelemetrySnapshot};

use super::events::{AppEvent, TelemetryData};
use super::ports::{ActuatorPort, EventSink, PowerPath, SensorPort};

// ───────────────────────────────────────────────────────────────
// PowerPathController
// ───────────────────────────────────────────────────────────────

/// Orchestrates every part of the power-path core.
pub struct PowerPathController {
    fsm: PowerStateMachine,
    ctx: PowerContext,
    scheduler: PeriodicScheduler,
    sampler: TelemetrySampler,
    safety: SafetySupervisor,
    profile: ChargeProfileSelector,
    balancer: BalancingEvaluator,
    /// Queue overwrite count already reported through the sink.
    reported_drops: u32,
}

impl PowerPathController {
    /// Validate `config` and build the transition table.
    ///
    /// Does **not** touch hardware; call [`start`](Self::start) next.
    pub fn new(config: PowerPathConfig) -> Result<Self, Error> {
        config.validate()?;
        let table = build_transition_table()?;

        Ok(Self {
            fsm: PowerStateMachine::new(table),
            scheduler: PeriodicScheduler::new(&config.schedule),
            sampler: TelemetrySampler::new(&config),
            safety: SafetySupervisor::new(config.safety.clone()),
            profile: ChargeProfileSelector::new(config.charge_profile.clone()),
            balancer: BalancingEvaluator::new(config.balancing.clone()),
            ctx: PowerContext::new(config),
            reported_drops: 0,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Drive every output to its safe level and enter the initial state.
    pub fn start(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        self.ctx.now = self.scheduler.ticks();
        self.ctx.cut_outputs(hw);
        self.fsm.start(&mut self.ctx, hw);
        self.apply_timeout_request();
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!(
            "PowerPathController started in {}",
            self.fsm.current_state().name()
        );
    }

    /// Advance the scheduler one base tick.
    pub fn tick(&mut self) {
        self.scheduler.tick();
    }

    /// One pass of the main loop.
    ///
    /// Runs whichever periodic tasks are due (the charge profile follows
    /// every fresh sample while charging), turns an expired deadline
    /// into `Timeout`, dispatches at most one queued event and polls the
    /// current state's `main()` action.  Returns what happened to the
    /// dispatched event, if one was queued.
    pub fn run_once<const N: usize>(
        &mut self,
        queue: &EventQueue<N>,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
    ) -> Option<DispatchOutcome> {
        self.ctx.now = self.scheduler.ticks();

        // 1. Telemetry and safety, then the charge profile on a fresh sample
        if self.scheduler.is_due(TaskId::SensorPoll) {
            self.poll_sensors(queue, hw);
            if self.fsm.current_state().is_charging() && self.ctx.telemetry.pack_fresh {
                self.update_charge_profile(hw, sink);
            }
        }

        // 2. Cell balancing (never while faulted)
        if self.scheduler.is_due(TaskId::Balancing)
            && self.fsm.current_state() != StateId::Fault
            && self.ctx.telemetry.cells_fresh
        {
            self.update_balancing(hw, sink);
        }

        // 3. State deadline
        if self.scheduler.timeout_expired() {
            debug!("Deadline expired in {}", self.fsm.current_state().name());
            queue.push(Event::Timeout);
        }

        // 4. Report overwritten events
        let dropped = queue.dropped();
        if dropped != self.reported_drops {
            sink.emit(&AppEvent::EventsDropped(
                dropped.wrapping_sub(self.reported_drops),
            ));
            self.reported_drops = dropped;
        }

        // 5. Dispatch one event
        let outcome = queue.pop().map(|event| {
            let outcome = self.fsm.dispatch(event, &mut self.ctx, hw);
            if let DispatchOutcome::Transitioned(t) = outcome {
                self.after_transition(&t, queue, hw, sink);
            }
            outcome
        });

        // 6. State main(), then forward anything it posted
        self.fsm.run_main(&mut self.ctx, hw);
        for event in self.ctx.drain_outbox() {
            queue.push(event);
        }

        outcome
    }

    /// Leave any state, including `Fault`, and re-enter `Idle`.
    ///
    /// Models the external supervisor's reset line; no event can trigger
    /// it.  Events still queued are left for the caller to clear.
    pub fn hardware_reset(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let from = self.fsm.current_state();
        self.ctx.now = self.scheduler.ticks();
        self.fsm.hardware_reset(&mut self.ctx, hw);

        self.safety.reset();
        self.sampler.reset();
        self.profile.reset();
        self.balancer.force_idle();
        self.scheduler.disarm_timeout();
        self.apply_timeout_request();

        sink.emit(&AppEvent::Reset { from });
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn current_state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.ctx.fault_log
    }

    /// Latest telemetry, stale channels included.
    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.ctx.telemetry
    }

    pub fn latched_fault(&self) -> Option<LatchedFault> {
        self.ctx.latched_fault
    }

    pub fn power_path(&self) -> PowerPath {
        self.ctx.power_path
    }

    pub fn balancing_active(&self) -> bool {
        self.balancer.is_active()
    }

    /// Current limit last acknowledged by the charger.
    pub fn charge_target_ma(&self) -> Option<u16> {
        self.profile.applied().map(|t| t.current_ma)
    }

    /// Active safety trip bitmask.
    pub fn safety_trips(&self) -> u8 {
        self.safety.trips()
    }

    /// Base ticks since construction.
    pub fn ticks(&self) -> u64 {
        self.scheduler.ticks()
    }

    pub fn config(&self) -> &PowerPathConfig {
        &self.ctx.config
    }

    /// Summary for logging or transmission.
    pub fn build_telemetry(&self) -> TelemetryData {
        let snap = &self.ctx.telemetry;
        TelemetryData {
            state: self.fsm.current_state().name(),
            power_path: self.ctx.power_path,
            batt_mv: snap.pack.batt_mv,
            batt_ma: snap.pack.batt_ma,
            temperature_c: snap.pack.temperature_c,
            min_cell_mv: snap.min_cell_mv(),
            max_cell_mv: snap.max_cell_mv(),
            charge_target_ma: self.charge_target_ma(),
            balancing_mask: self.balancer.applied_mask().unwrap_or(0),
            fault_count: self.ctx.fault_log.total(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn poll_sensors<const N: usize>(&mut self, queue: &EventQueue<N>, hw: &mut impl SensorPort) {
        if let Err(e) = self.sampler.sample(hw, queue) {
            // One record per failure run; retries are silent.
            if self.sampler.consecutive_failures() == 1 {
                self.ctx.fault_log.record(
                    FaultRecord::new(self.ctx.now, FaultCode::from(e), FaultSource::Core)
                        .with_detail(u16::from(self.sampler.consecutive_failures())),
                );
            }
        }
        self.ctx.telemetry = self.sampler.snapshot().clone();
        self.safety.evaluate(&self.ctx.telemetry, queue);
    }

    fn update_charge_profile(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let before = self.charge_target_ma();
        let cell_mv = self.ctx.battery_cell_mv();
        match self.profile.apply(cell_mv, hw) {
            Ok(target) => {
                if before != Some(target.current_ma) {
                    sink.emit(&AppEvent::ChargeCurrentChanged(target.current_ma));
                }
            }
            Err(e) => {
                let wanted = self.profile.select(cell_mv).current_ma;
                self.ctx.note_output_error(e, FaultSource::Charger, wanted);
            }
        }
    }

    fn update_balancing(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let before = self.balancer.applied_mask();
        match self.balancer.apply(&self.ctx.telemetry.cells, hw) {
            Ok(mask) => {
                if before != Some(mask) {
                    sink.emit(&AppEvent::BalancingChanged {
                        active: self.balancer.is_active(),
                        mask,
                    });
                }
            }
            Err(e) => self.ctx.note_output_error(e, FaultSource::CellMonitor, 0),
        }
    }

    fn after_transition<const N: usize>(
        &mut self,
        t: &Transition,
        queue: &EventQueue<N>,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        if t.from.is_charging() {
            // Exit stopped the charger; the next session starts from scratch.
            self.profile.reset();
        }

        self.scheduler.disarm_timeout();
        self.apply_timeout_request();

        sink.emit(&AppEvent::StateChanged {
            from: t.from,
            to: t.to,
            event: t.event,
        });

        if t.to.is_charging() && self.ctx.telemetry.pack_fresh {
            self.update_charge_profile(hw, sink);
        }

        if t.to != StateId::Fault {
            // A condition first seen where no row handles it must still
            // escalate from the new state.
            self.safety.reassert(queue);
        } else {
            self.balancer.force_idle();
            if let Some(f) = self.ctx.latched_fault {
                sink.emit(&AppEvent::FaultLatched {
                    reason: f.reason,
                    level: f.level,
                    from: f.from,
                });
            }
        }
    }

    fn apply_timeout_request(&mut self) {
        if let Some(ticks) = self.ctx.timeout_request.take() {
            self.scheduler.arm_timeout(ticks);
        }
    }
}
