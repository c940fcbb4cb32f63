//! Tick-driven periodic scheduler.
//!
//! Decouples task cadence from the main loop.  The integrator calls
//! [`PeriodicScheduler::tick`] from the base-rate timer; the controller
//! polls [`PeriodicScheduler::is_due`] each `run_once`.
//!
//! ```text
//!  base timer ──▶ tick() ──▶ ┌────────────┬────────┬──────┐
//!                            │ SensorPoll │ period │ due  │
//!                            │ Balancing  │ period │ due  │
//!                            ├────────────┴────────┴──────┤
//!                            │ state deadline ──▶ Timeout │
//!                            └────────────────────────────┘
//! ```
//!
//! Due flags are edge-triggered: a read clears them.  If a task is not
//! polled for several periods, the misses collapse into one pending flag.

use log::debug;

use crate::config::ScheduleConfig;

// ═══════════════════════════════════════════════════════════════
//  Task identity
// ═══════════════════════════════════════════════════════════════

/// Recurring tasks driven by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskId {
    /// Read telemetry, run the safety supervisor and, while charging,
    /// re-select the charge current.
    SensorPoll = 0,
    /// Re-evaluate the balancing hysteresis.
    Balancing = 1,
}

impl TaskId {
    pub const COUNT: usize = 2;
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct TaskSlot {
    period: u32,
    elapsed: u32,
    due: bool,
}

impl TaskSlot {
    fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            elapsed: 0,
            due: false,
        }
    }
}

/// Fixed set of periodic tasks plus one state deadline.
#[derive(Debug, Clone)]
pub struct PeriodicScheduler {
    tasks: [TaskSlot; TaskId::COUNT],
    /// Monotonic base-tick counter.
    ticks: u64,
    /// Ticks left before the armed deadline expires.
    deadline: Option<u32>,
    timeout_pending: bool,
}

impl PeriodicScheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self {
            tasks: [
                TaskSlot::new(config.sensor_poll_ticks),
                TaskSlot::new(config.balancing_ticks),
            ],
            ticks: 0,
            deadline: None,
            timeout_pending: false,
        }
    }

    /// Advance one base tick.  Bounded work; safe to call from a timer ISR
    /// if the scheduler is wrapped by the caller.
    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);

        for slot in &mut self.tasks {
            slot.elapsed += 1;
            if slot.elapsed >= slot.period {
                slot.elapsed = 0;
                slot.due = true;
            }
        }

        if let Some(remaining) = self.deadline.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.deadline = None;
                self.timeout_pending = true;
                debug!("Scheduler: state deadline expired at tick {}", self.ticks);
            }
        }
    }

    /// True at most once per period of `task`; reading clears the flag.
    pub fn is_due(&mut self, task: TaskId) -> bool {
        let slot = &mut self.tasks[task as usize];
        core::mem::replace(&mut slot.due, false)
    }

    /// Change a task's period.  Restarts its phase.
    pub fn set_period(&mut self, task: TaskId, period: u32) {
        self.tasks[task as usize] = TaskSlot::new(period);
    }

    /// Arm the one-shot state deadline, replacing any armed one.
    pub fn arm_timeout(&mut self, ticks: u32) {
        self.deadline = Some(ticks.max(1));
        self.timeout_pending = false;
    }

    /// Cancel the state deadline and any unread expiry.
    pub fn disarm_timeout(&mut self) {
        self.deadline = None;
        self.timeout_pending = false;
    }

    /// True once after the armed deadline elapses; reading clears it.
    pub fn timeout_expired(&mut self) -> bool {
        core::mem::replace(&mut self.timeout_pending, false)
    }

    pub fn timeout_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Base ticks since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
