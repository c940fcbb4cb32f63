//! Telemetry sampler.
//!
//! Reads the three sensor channels once per poll, keeps the last good
//! value of each, and counts consecutive failed polls.  When the count
//! reaches the configured threshold a single `CommFault` is queued; the
//! state machine decides what that means.  The sampler never escalates
//! on its own.

use log::{debug, warn};

use crate::app::ports::SensorPort;
use crate::config::PowerPathConfig;
use crate::error::SensorError;
use crate::events::{Event, EventQueue};

use super::{CellVoltages, TelemetrySnapshot};

/// Plausible cell voltage window (mV).  Anything outside is a bad read.
const CELL_MV_MIN: u16 = 1000;
const CELL_MV_MAX: u16 = 5000;

/// Wraps the sensor collaborators and maintains the latest snapshot.
pub struct TelemetrySampler {
    snapshot: TelemetrySnapshot,
    expected_cells: u8,
    comm_fault_threshold: u8,
    consecutive_failures: u8,
    /// Set once `CommFault` has been queued for the current failure run.
    comm_fault_raised: bool,
    last_error: Option<SensorError>,
}

impl TelemetrySampler {
    pub fn new(config: &PowerPathConfig) -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            expected_cells: config.cells.count,
            comm_fault_threshold: config.safety.comm_fault_threshold.max(1),
            consecutive_failures: 0,
            comm_fault_raised: false,
            last_error: None,
        }
    }

    /// Poll every channel once.
    ///
    /// On success returns the new snapshot.  On failure returns the first
    /// channel error; channels that did succeed are still updated and
    /// flagged fresh in [`snapshot`](Self::snapshot).
    pub fn sample<const N: usize>(
        &mut self,
        hw: &mut (impl SensorPort + ?Sized),
        queue: &EventQueue<N>,
    ) -> Result<TelemetrySnapshot, SensorError> {
        self.snapshot.sequence = self.snapshot.sequence.wrapping_add(1);

        let cells = hw.read_cell_voltages().and_then(|c| self.check_cells(c));
        let pack = hw.read_pack_telemetry();
        let faults = hw.read_fault_flags();

        let mut first_error = None;

        match cells {
            Ok(c) => {
                self.snapshot.cells = c;
                self.snapshot.cells_fresh = true;
            }
            Err(e) => {
                self.snapshot.cells_fresh = false;
                first_error.get_or_insert(e);
            }
        }
        match pack {
            Ok(p) => {
                self.snapshot.pack = p;
                self.snapshot.pack_fresh = true;
            }
            Err(e) => {
                self.snapshot.pack_fresh = false;
                first_error.get_or_insert(e);
            }
        }
        match faults {
            Ok(f) => {
                self.snapshot.faults = f;
                self.snapshot.faults_fresh = true;
            }
            Err(e) => {
                self.snapshot.faults_fresh = false;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => {
                if self.consecutive_failures > 0 {
                    debug!(
                        "Telemetry recovered after {} failed polls",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                self.comm_fault_raised = false;
                Ok(self.snapshot.clone())
            }
            Some(e) => {
                self.last_error = Some(e);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                debug!(
                    "Telemetry poll {} failed ({e}), {} consecutive",
                    self.snapshot.sequence, self.consecutive_failures
                );
                if self.consecutive_failures >= self.comm_fault_threshold && !self.comm_fault_raised
                {
                    warn!(
                        "Telemetry: {} consecutive failures, raising CommFault",
                        self.consecutive_failures
                    );
                    queue.push(Event::CommFault);
                    self.comm_fault_raised = true;
                }
                Err(e)
            }
        }
    }

    /// Latest snapshot, including stale channels.
    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<SensorError> {
        self.last_error
    }

    /// Forget failure history (after a hardware reset).
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.comm_fault_raised = false;
        self.last_error = None;
    }

    fn check_cells(&self, cells: CellVoltages) -> Result<CellVoltages, SensorError> {
        if cells.len() != self.expected_cells as usize {
            return Err(SensorError::CellCountMismatch {
                expected: self.expected_cells,
                actual: cells.len() as u8,
            });
        }
        if cells.iter().any(|&mv| !(CELL_MV_MIN..=CELL_MV_MAX).contains(&mv)) {
            return Err(SensorError::OutOfRange);
        }
        Ok(cells)
    }
}
