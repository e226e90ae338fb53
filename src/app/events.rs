//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log them, append them to a CSV file,
//! collect them in a test.

use crate::fsm::StateId;
use crate::metrics::{RunSummary, SegmentSummary};

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Per-tick telemetry sample.
    Telemetry(TelemetryData),

    /// A profile segment finished.
    SegmentComplete {
        index: usize,
        summary: SegmentSummary,
    },

    /// One or more safety faults were raised.
    FaultDetected(u8),

    /// All safety faults have been cleared.
    FaultCleared,

    /// A run ended (completed, faulted or aborted).
    Finished(RunSummary),
}

/// A point-in-time telemetry snapshot suitable for logging or recording.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryData {
    /// Seconds since the service started.
    pub elapsed_s: f64,
    pub state: StateId,
    pub temperature_c: f64,
    /// Closed-loop setpoint, when tracking one.
    pub setpoint_c: Option<f64>,
    /// Output applied this tick (%).
    pub output_percent: f64,
    pub segment_index: usize,
    pub fault_flags: u8,
}
