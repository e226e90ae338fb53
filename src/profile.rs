//! Setpoint trajectories.
//!
//! An experiment is an ordered list of [`Segment`]s.  The FSM walks the
//! list one segment at a time; each segment kind maps to one FSM state.
//!
//! ```text
//!  T2 ┤            ╭──────╮
//!     │           ╱        ╲
//!  T1 ┤    ╭────╯           ╲
//!     │   ╱                  ╲
//!  T0 ┤──╯                    ╰──────────  hold ±ε
//!     └──────────────────────────────────▶ t
//!       heat-up    heat-up   cool-down  hold
//! ```

use serde::{Deserialize, Serialize};

/// One leg of a setpoint trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    /// Fixed heater output for a fixed time (step-response testing).
    OpenLoop { output_percent: f64, duration_s: f64 },
    /// Closed-loop drive upward until settled at `target_c`.
    HeatUp { target_c: f64 },
    /// Closed-loop drive downward until settled at `target_c`.
    CoolDown { target_c: f64 },
    /// Regulate at `setpoint_c` for `duration_s`.
    Hold { setpoint_c: f64, duration_s: f64 },
}

impl Segment {
    /// Closed-loop setpoint, or `None` for open-loop segments.
    pub fn setpoint(&self) -> Option<f64> {
        match *self {
            Self::OpenLoop { .. } => None,
            Self::HeatUp { target_c } | Self::CoolDown { target_c } => Some(target_c),
            Self::Hold { setpoint_c, .. } => Some(setpoint_c),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenLoop { .. } => "open-loop",
            Self::HeatUp { .. } => "heat-up",
            Self::CoolDown { .. } => "cool-down",
            Self::Hold { .. } => "hold",
        }
    }
}

/// An ordered setpoint trajectory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile {
    pub segments: Vec<Segment>,
}

impl Profile {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Heat to `t1`, heat further to `t2`, cool to `t0` and hold it.
    pub fn three_regime(t1: f64, t2: f64, t0: f64, hold_s: f64) -> Self {
        Self::new(vec![
            Segment::HeatUp { target_c: t1 },
            Segment::HeatUp { target_c: t2 },
            Segment::CoolDown { target_c: t0 },
            Segment::Hold {
                setpoint_c: t0,
                duration_s: hold_s,
            },
        ])
    }

    /// Step-response data collection: heat at `output` then let it cool.
    pub fn step_test(output_percent: f64, heat_s: f64, cool_s: f64) -> Self {
        Self::new(vec![
            Segment::OpenLoop {
                output_percent,
                duration_s: heat_s,
            },
            Segment::OpenLoop {
                output_percent: 0.0,
                duration_s: cool_s,
            },
        ])
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Structural checks.  A heat-up must aim above the previous closed-loop
    /// setpoint and a cool-down below it, so `T2 > T1` holds for chained
    /// heat-ups.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.segments.is_empty() {
            return Err("profile must contain at least one segment");
        }
        let mut previous: Option<f64> = None;
        for seg in &self.segments {
            match *seg {
                Segment::OpenLoop {
                    output_percent,
                    duration_s,
                } => {
                    if !(0.0..=100.0).contains(&output_percent) {
                        return Err("open-loop output_percent must be 0–100");
                    }
                    if !(duration_s.is_finite() && duration_s > 0.0) {
                        return Err("open-loop duration_s must be positive");
                    }
                }
                Segment::HeatUp { target_c } => {
                    if previous.is_some_and(|p| target_c <= p) {
                        return Err("heat-up target must exceed the previous setpoint");
                    }
                }
                Segment::CoolDown { target_c } => {
                    if previous.is_some_and(|p| target_c >= p) {
                        return Err("cool-down target must be below the previous setpoint");
                    }
                }
                Segment::Hold { duration_s, .. } => {
                    if !(duration_s.is_finite() && duration_s > 0.0) {
                        return Err("hold duration_s must be positive");
                    }
                }
            }
            if let Some(sp) = seg.setpoint() {
                if !sp.is_finite() {
                    return Err("setpoints must be finite");
                }
                previous = Some(sp);
            }
        }
        Ok(())
    }
}
