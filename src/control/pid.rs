//! PID controller for heater output
//!
//! Parallel-form PID with output clamping and conditional-integration
//! anti-windup, plus SIMC tuning from an identified FOPDT model.

use serde::{Deserialize, Serialize};

use crate::config::PidConfig;
use crate::plant::fopdt::FopdtParams;

/// Controller gains (output % per °C, per °C·s, per °C/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    /// Skogestad IMC rules with the closed-loop time constant set to the
    /// dead time (PI only).
    pub fn simc(params: &FopdtParams) -> Self {
        let theta = params.dead_time_s;
        let tau_c = theta;
        let kc = params.time_constant_s / (params.gain * (tau_c + theta));
        let ti = params.time_constant_s.min(4.0 * (tau_c + theta));
        Self {
            kp: kc,
            ki: kc / ti,
            kd: 0.0,
        }
    }
}

impl From<&PidConfig> for PidGains {
    fn from(cfg: &PidConfig) -> Self {
        Self {
            kp: cfg.kp,
            ki: cfg.ki,
            kd: cfg.kd,
        }
    }
}

/// PID controller
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    integral: f64,
    prev_error: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64, setpoint: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint,
            integral: 0.0,
            prev_error: None,
            output_min: 0.0,
            output_max: 100.0,
        }
    }

    pub fn from_config(cfg: &PidConfig, setpoint: f64) -> Self {
        let mut pid = Self::new(cfg.kp, cfg.ki, cfg.kd, setpoint);
        pid.set_limits(cfg.output_min, cfg.output_max);
        pid
    }

    /// Set output limits
    pub fn set_limits(&mut self, min: f64, max: f64) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Update setpoint
    pub fn set_target(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn target(&self) -> f64 {
        self.setpoint
    }

    /// Replace gains without touching the accumulated state.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.kd = gains.kd;
    }

    pub fn gains(&self) -> PidGains {
        PidGains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }

    /// Compute PID output given current measurement
    pub fn compute(&mut self, measurement: f64, dt: f64) -> f64 {
        let error = self.setpoint - measurement;

        // Proportional
        let p = self.kp * error;

        // Integral (with anti-windup)
        self.integral += error * dt;
        let i = self.ki * self.integral;

        // Derivative; no kick on the first sample
        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        let d = self.kd * derivative;

        self.prev_error = Some(error);

        // Clamp output
        let output = (p + i + d).clamp(self.output_min, self.output_max);

        // Anti-windup: if output is saturated, stop integrating
        if output >= self.output_max || output <= self.output_min {
            self.integral -= error * dt;
        }

        output
    }

    /// Reset controller state
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simc_for_default_plant_matches_config_defaults() {
        let g = PidGains::simc(&FopdtParams {
            gain: 19.999,
            time_constant_s: 122.544,
            dead_time_s: 15.735,
        });
        let d = PidConfig::default();
        assert!((g.kp - d.kp).abs() < 0.001, "{g:?}");
        assert!((g.ki - d.ki).abs() < 0.0001, "{g:?}");
        assert_eq!(g.kd, 0.0);
    }

    #[test]
    fn simc_caps_integral_time_for_slow_plants() {
        let g = PidGains::simc(&FopdtParams {
            gain: 1.0,
            time_constant_s: 1000.0,
            dead_time_s: 10.0,
        });
        // Ti = 4(τc + θ) = 80 s
        assert!((g.kp / g.ki - 80.0).abs() < 1e-9);
    }

    #[test]
    fn proportional_only() {
        let mut pid = PidController::new(2.0, 0.0, 0.0, 50.0);
        assert_eq!(pid.compute(45.0, 1.0), 10.0);
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = PidController::new(100.0, 0.0, 0.0, 50.0);
        assert_eq!(pid.compute(0.0, 1.0), 100.0);
        assert_eq!(pid.compute(100.0, 1.0), 0.0);
    }

    #[test]
    fn integral_does_not_wind_up_while_saturated() {
        let mut pid = PidController::new(1.0, 0.1, 0.0, 100.0);
        for _ in 0..1000 {
            assert_eq!(pid.compute(0.0, 1.0), 100.0);
        }
        // At the setpoint the output falls straight back out of saturation.
        let out = pid.compute(100.0, 1.0);
        assert!(out < 1.0, "{out}");
    }

    #[test]
    fn integral_removes_steady_offset() {
        let mut pid = PidController::new(0.0, 0.5, 0.0, 10.0);
        let a = pid.compute(9.0, 1.0);
        let b = pid.compute(9.0, 1.0);
        assert!(b > a);
    }

    #[test]
    fn first_sample_has_no_derivative_kick() {
        let mut pid = PidController::new(0.0, 0.0, 10.0, 50.0);
        assert_eq!(pid.compute(40.0, 1.0), 0.0);
        // Error shrinks by 1 per second: negative derivative, clamped at 0.
        assert_eq!(pid.compute(41.0, 1.0), 0.0);
        pid.set_limits(-100.0, 100.0);
        assert!((pid.compute(42.0, 1.0) + 10.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_state() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 10.0);
        pid.compute(0.0, 1.0);
        pid.reset();
        assert_eq!(pid.compute(10.0, 1.0), 0.0);
    }
}
