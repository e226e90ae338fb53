//! Controller interface shared by the experiment driver and the environment.
//!
//! A policy maps an [`Observation`] (`[target − T, T, previous output]`) to
//! a heater output in percent.  The environment speaks in normalised
//! actions; [`action_to_output`] and [`output_to_action`] convert between
//! the two.

use super::pid::{PidController, PidGains};
use crate::config::PidConfig;
use crate::env::{Action, Observation};

/// Normalised action `[-1, 1]` → heater output `[0, 100]` %.
pub fn action_to_output(action: Action) -> f64 {
    ((f64::from(action) + 1.0) / 2.0 * 100.0).clamp(0.0, 100.0)
}

/// Heater output % → normalised action.
pub fn output_to_action(output_percent: f64) -> Action {
    (output_percent.clamp(0.0, 100.0) / 50.0 - 1.0) as Action
}

pub trait Policy {
    fn name(&self) -> &'static str;

    /// Forget any internal state before a new episode or run.
    fn reset(&mut self);

    /// Heater output (%) for this observation.
    fn act(&mut self, observation: &Observation, dt: f64) -> f64;

    /// Retune in place.  Policies without gains ignore this.
    fn set_gains(&mut self, _gains: PidGains) {}
}

/// PID wrapped as a policy; the setpoint is recovered as `T + e`.
pub struct PidPolicy {
    pid: PidController,
}

impl PidPolicy {
    pub fn new(gains: PidGains) -> Self {
        Self {
            pid: PidController::new(gains.kp, gains.ki, gains.kd, 0.0),
        }
    }

    pub fn from_config(cfg: &PidConfig) -> Self {
        Self {
            pid: PidController::from_config(cfg, 0.0),
        }
    }

    pub fn gains(&self) -> PidGains {
        self.pid.gains()
    }
}

impl Policy for PidPolicy {
    fn name(&self) -> &'static str {
        "pid"
    }

    fn reset(&mut self) {
        self.pid.reset();
    }

    fn act(&mut self, observation: &Observation, dt: f64) -> f64 {
        let error = f64::from(observation[0]);
        let temp = f64::from(observation[1]);
        self.pid.set_target(temp + error);
        self.pid.compute(temp, dt)
    }

    fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
    }
}

/// Fixed output regardless of the observation.  Drives open-loop step
/// segments in the experiment service.
pub struct ConstantPolicy {
    output_percent: f64,
}

impl ConstantPolicy {
    pub fn new(output_percent: f64) -> Self {
        Self {
            output_percent: output_percent.clamp(0.0, 100.0),
        }
    }

    pub fn set_output(&mut self, output_percent: f64) {
        self.output_percent = output_percent.clamp(0.0, 100.0);
    }

    pub fn output(&self) -> f64 {
        self.output_percent
    }
}

impl Policy for ConstantPolicy {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn reset(&mut self) {}

    fn act(&mut self, _observation: &Observation, _dt: f64) -> f64 {
        self.output_percent
    }
}
