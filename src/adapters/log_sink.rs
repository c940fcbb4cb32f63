//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (UART / RTT on target, `env_logger` on the host).
//! A supervisor link would implement the same trait.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | state={} path={:?} | batt={}mV {}mA | T={}\u{00b0}C | \
                     cells={}..{}mV | chg={}mA | bal=0b{:08b} | faults={}",
                    t.state,
                    t.power_path,
                    t.batt_mv,
                    t.batt_ma,
                    t.temperature_c,
                    t.min_cell_mv.unwrap_or(0),
                    t.max_cell_mv.unwrap_or(0),
                    t.charge_target_ma.unwrap_or(0),
                    t.balancing_mask,
                    t.fault_count,
                );
            }
            AppEvent::StateChanged { from, to, event } => {
                info!("STATE | {} -> {} ({:?})", from.name(), to.name(), event);
            }
            AppEvent::FaultLatched {
                reason,
                level,
                from,
            } => {
                error!("FAULT | {reason} ({level:?}) from {}", from.name());
            }
            AppEvent::Reset { from } => {
                info!("RESET | {} -> Idle", from.name());
            }
            AppEvent::ChargeCurrentChanged(ma) => {
                info!("CHARGE | limit={ma}mA");
            }
            AppEvent::BalancingChanged { active, mask } => {
                info!("BALANCE | active={active} mask=0b{mask:08b}");
            }
            AppEvent::EventsDropped(n) => {
                warn!("QUEUE | {n} event(s) overwritten");
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={}", state.name());
            }
        }
    }
}
