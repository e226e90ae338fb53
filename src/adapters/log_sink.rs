//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (the binary routes it to stderr through
//! `tracing-subscriber`).  The CSV recorder implements the same trait.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
///
/// Telemetry goes out at `info` only every `telemetry_every` samples
/// (and at `debug` otherwise) so long holds stay readable.
pub struct LogEventSink {
    telemetry_every: u64,
    telemetry_seen: u64,
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::with_decimation(1)
    }

    pub fn with_decimation(telemetry_every: u64) -> Self {
        Self {
            telemetry_every: telemetry_every.max(1),
            telemetry_seen: 0,
        }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                self.telemetry_seen += 1;
                let sp = t
                    .setpoint_c
                    .map_or_else(|| "-".to_string(), |sp| format!("{sp:.2}"));
                if self.telemetry_seen % self.telemetry_every == 0 {
                    info!(
                        "TELEM | t={:.0}s state={:?} seg={} | T={:.2}\u{00b0}C sp={} | out={:.1}% | \
                         faults=0b{:08b}",
                        t.elapsed_s,
                        t.state,
                        t.segment_index,
                        t.temperature_c,
                        sp,
                        t.output_percent,
                        t.fault_flags,
                    );
                } else {
                    debug!(
                        "TELEM | t={:.0}s T={:.2} out={:.1}",
                        t.elapsed_s, t.temperature_c, t.output_percent
                    );
                }
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::SegmentComplete { index, summary } => {
                info!(
                    "SEGMENT | #{index} {} done in {:.0}s: {:.2} -> {:.2}\u{00b0}C overshoot={:.2}",
                    summary.kind,
                    summary.duration_s,
                    summary.start_temp_c,
                    summary.end_temp_c,
                    summary.overshoot_c
                );
                if let Some(h) = summary.hold {
                    info!(
                        "SEGMENT | #{index} residence={:.1}% max_dev={:.3} rms={:.3}",
                        h.residence() * 100.0,
                        h.max_abs_deviation_c,
                        h.rms()
                    );
                }
            }
            AppEvent::FaultDetected(flags) => {
                warn!("FAULT | detected, flags=0b{:08b}", flags);
            }
            AppEvent::FaultCleared => {
                info!("FAULT | all cleared");
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::Finished(summary) => {
                info!(
                    "FINISH | completed={} duration={:.0}s segments={} faults=0b{:08b}",
                    summary.completed,
                    summary.duration_s,
                    summary.segments.len(),
                    summary.fault_flags
                );
            }
        }
    }
}
