//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It contains the latest temperature snapshot, the heater
//! command, the profile cursor, timing, configuration and accumulated
//! safety faults.  Think of it as the "blackboard" in a blackboard
//! architecture.

use crate::config::SystemConfig;
use crate::metrics::{HoldStats, SegmentSummary, overshoot};
use crate::profile::Segment;

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; written by the service)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    /// Latest good temperature (°C).  Held over a failed read.
    pub temperature_c: f64,
    /// Whether this tick's read succeeded.
    pub read_ok: bool,
}

// ---------------------------------------------------------------------------
// Heater command (written by state handlers; consumed by the service)
// ---------------------------------------------------------------------------

/// What the heater should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HeaterCommand {
    /// Output forced to zero.
    #[default]
    Off,
    /// Open loop at a fixed output (%).
    Fixed(f64),
    /// Closed loop towards a setpoint (°C).
    Track(f64),
}

impl HeaterCommand {
    pub fn setpoint(&self) -> Option<f64> {
        match *self {
            Self::Track(sp) => Some(sp),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Segment progress
// ---------------------------------------------------------------------------

/// Bookkeeping for the profile segment currently running.
#[derive(Debug, Clone, Default)]
pub struct SegmentProgress {
    /// Cursor into the profile.
    pub index: usize,
    pub start_temp_c: f64,
    /// Consecutive samples that met the settle condition.
    pub settled_count: u32,
    pub hold: HoldStats,
    /// Temperatures seen during the segment.
    pub trace: Vec<f64>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,
    /// Duration of one tick in seconds (inverse of control loop frequency).
    pub tick_period_secs: f64,

    // -- Sensor data --
    pub sensors: SensorSnapshot,

    // -- Heater output --
    pub command: HeaterCommand,

    // -- Configuration --
    pub config: SystemConfig,

    // -- Experiment --
    /// Set by the `Start` command, consumed by `Idle` / `Complete`.
    pub start_requested: bool,
    pub segment: SegmentProgress,
    /// Filled when a segment finishes; drained by the service.
    pub finished_segment: Option<SegmentSummary>,

    // -- Safety --
    /// Accumulated safety fault bitmask (see `SafetyFault::mask()`).
    /// Set by the safety supervisor, read by state handlers.
    pub fault_flags: u8,
}

impl FsmContext {
    /// Create a new context with the given configuration.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            tick_period_secs: config.timing.sample_period_secs(),
            sensors: SensorSnapshot::default(),
            command: HeaterCommand::Off,
            start_requested: false,
            segment: SegmentProgress::default(),
            finished_segment: None,
            config,
            fault_flags: 0,
        }
    }

    /// Seconds elapsed since the current state was entered.
    pub fn secs_in_state(&self) -> f64 {
        self.ticks_in_state as f64 * self.tick_period_secs
    }

    /// Returns `true` if **any** safety fault is active.
    pub fn has_faults(&self) -> bool {
        self.fault_flags != 0
    }

    /// Check whether a specific fault flag is set.
    pub fn has_fault(&self, fault: crate::error::SafetyFault) -> bool {
        self.fault_flags & fault.mask() != 0
    }

    /// Segment under the cursor, if the profile is not exhausted.
    pub fn current_segment(&self) -> Option<Segment> {
        self.config.experiment.profile.get(self.segment.index).copied()
    }

    /// Reset per-segment bookkeeping on segment entry.
    pub fn begin_segment(&mut self) {
        self.segment.start_temp_c = self.sensors.temperature_c;
        self.segment.settled_count = 0;
        self.segment.hold = HoldStats::default();
        self.segment.trace.clear();
    }

    /// Close the current segment: record its summary and advance the cursor.
    pub fn finish_segment(&mut self) {
        let Some(seg) = self.current_segment() else {
            return;
        };
        let p = &self.segment;
        let end = self.sensors.temperature_c;
        let overshoot_c = match seg {
            Segment::HeatUp { target_c } | Segment::CoolDown { target_c } => {
                overshoot(&p.trace, p.start_temp_c, target_c)
            }
            _ => 0.0,
        };
        self.finished_segment = Some(SegmentSummary {
            index: p.index,
            kind: seg.label(),
            setpoint_c: seg.setpoint(),
            duration_s: self.secs_in_state(),
            start_temp_c: p.start_temp_c,
            end_temp_c: end,
            overshoot_c,
            hold: matches!(seg, Segment::Hold { .. }).then_some(p.hold),
        });
        self.segment.index += 1;
    }
}
