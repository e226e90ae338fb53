//! First-order-plus-dead-time heater model.
//!
//! ```text
//!   dT/dt = (K · u(t − θ) − (T − T_amb)) / τ
//! ```
//!
//! `u` is heater output in percent, `K` the process gain in °C/%, `τ` the
//! time constant and `θ` the dead time.  The simulator integrates with
//! explicit Euler at a fixed step `dt` and realises the dead time as a
//! fixed-capacity delay line of `max(1, ⌊θ/dt⌋)` samples.

use heapless::Deque;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Capacity of the dead-time delay line (samples).
pub const MAX_DELAY_STEPS: usize = 512;

/// Identified model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FopdtParams {
    /// Process gain (°C per % output).
    pub gain: f64,
    /// Time constant τ (s).
    pub time_constant_s: f64,
    /// Dead time θ (s).
    pub dead_time_s: f64,
}

impl FopdtParams {
    /// Open-loop step response (closed form).
    ///
    /// `y0` until the dead time has elapsed, then a first-order rise of
    /// `K · Δu` towards the new steady state.
    pub fn step_response(&self, t: f64, delta_u: f64, y0: f64) -> f64 {
        let t_eff = t - self.dead_time_s;
        if t_eff > 0.0 {
            y0 + self.gain * delta_u * (1.0 - (-t_eff / self.time_constant_s).exp())
        } else {
            y0
        }
    }

    /// Steady-state temperature for constant output `u`.
    pub fn steady_state(&self, ambient_c: f64, u_percent: f64) -> f64 {
        ambient_c + self.gain * u_percent
    }

    /// Output that would hold `temp_c` at steady state.
    pub fn holding_output(&self, ambient_c: f64, temp_c: f64) -> f64 {
        ((temp_c - ambient_c) / self.gain).clamp(0.0, 100.0)
    }

    /// Number of delay-line samples for a given integration step.
    pub fn delay_steps(&self, dt: f64) -> usize {
        ((self.dead_time_s / dt).floor() as usize).clamp(1, MAX_DELAY_STEPS)
    }
}

/// Discrete-time FOPDT simulator.
pub struct FopdtPlant {
    params: FopdtParams,
    ambient_c: f64,
    dt: f64,
    temperature_c: f64,
    delay: Deque<f64, MAX_DELAY_STEPS>,
    delay_len: usize,
}

impl FopdtPlant {
    pub fn new(params: FopdtParams, ambient_c: f64, initial_c: f64, dt: f64) -> Self {
        let delay_len = params.delay_steps(dt);
        let mut plant = Self {
            params,
            ambient_c,
            dt,
            temperature_c: initial_c,
            delay: Deque::new(),
            delay_len,
        };
        plant.reset(initial_c);
        plant
    }

    /// Restore the initial temperature and an all-zero input history.
    pub fn reset(&mut self, initial_c: f64) {
        self.temperature_c = initial_c;
        self.delay.clear();
        for _ in 0..self.delay_len {
            // Capacity is MAX_DELAY_STEPS and delay_len never exceeds it.
            let _ = self.delay.push_back(0.0);
        }
    }

    /// Apply `u_percent` for one step and return the new temperature.
    pub fn step(&mut self, u_percent: f64) -> f64 {
        let u = u_percent.clamp(0.0, 100.0);
        let delayed = self.delay.pop_front().unwrap_or(0.0);
        let _ = self.delay.push_back(u);

        let dy = (self.params.gain * delayed - (self.temperature_c - self.ambient_c))
            / self.params.time_constant_s
            * self.dt;
        self.temperature_c += dy;
        self.temperature_c
    }

    /// True (noise-free) temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature_c
    }

    /// Temperature as a sensor would report it.
    pub fn measure(&self, rng: &mut impl Rng, noise_std_c: f64) -> f64 {
        self.temperature_c + super::gaussian(rng, noise_std_c)
    }

    pub fn params(&self) -> &FopdtParams {
        &self.params
    }

    pub fn ambient(&self) -> f64 {
        self.ambient_c
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Samples between an input and its first effect.
    pub fn delay_steps(&self) -> usize {
        self.delay_len
    }
}
