//! Reinforcement-learning environment over the heater digital twin.
//!
//! Follows the usual episodic contract: `reset` returns the first
//! observation, `step` applies one action and returns the next observation,
//! a scalar reward and the `terminated` / `truncated` flags.
//!
//! | item        | value                                          |
//! |-------------|------------------------------------------------|
//! | observation | `[target − T, T, previous output %]` (f32)     |
//! | action      | scalar in `[-1, 1]` → output `(a + 1)/2 · 100` |
//! | reward      | `−e²`, smoothness penalty, in-band bonus       |
//! | truncation  | after `max_steps` steps                        |

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{EnvConfig, PlantConfig, SystemConfig};
use crate::control::policy::action_to_output;
use crate::plant::fopdt::FopdtPlant;

pub type Observation = [f32; 3];
pub type Action = f32;

/// Result of one environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    /// The task reached a terminal state (never, for this plant).
    pub terminated: bool,
    /// The step budget is exhausted.
    pub truncated: bool,
}

impl Step {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub trait Environment {
    /// Start a new episode; `Some(seed)` reseeds the noise source.
    fn reset(&mut self, seed: Option<u64>) -> Observation;

    fn step(&mut self, action: Action) -> Step;

    /// Seconds of plant time per step.
    fn dt(&self) -> f64;
}

/// Reward for one transition.
pub fn reward(cfg: &EnvConfig, target_c: f64, temp_c: f64, output: f64, prev_output: f64) -> f64 {
    let error = target_c - temp_c;
    let mut r = -(error * error);
    if temp_c > target_c + cfg.overshoot_margin_c {
        r = -r.abs();
    }
    r -= cfg.smoothness_weight * (output - prev_output).abs();
    if error.abs() < cfg.bonus_band_c {
        r += cfg.bonus;
    }
    r
}

/// Heater environment backed by an [`FopdtPlant`].
pub struct HeaterEnv {
    plant: FopdtPlant,
    cfg: EnvConfig,
    target_c: f64,
    initial_c: f64,
    noise_std_c: f64,
    rng: StdRng,
    prev_output: f64,
    step_count: u32,
}

impl HeaterEnv {
    pub fn new(plant: &PlantConfig, env: &EnvConfig, dt: f64) -> Self {
        Self {
            plant: FopdtPlant::new(plant.params(), plant.ambient_c, plant.initial_c, dt),
            cfg: *env,
            target_c: env.target_c,
            initial_c: plant.initial_c,
            noise_std_c: plant.noise_std_c,
            rng: StdRng::seed_from_u64(0),
            prev_output: 0.0,
            step_count: 0,
        }
    }

    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self::new(&cfg.plant, &cfg.env, cfg.timing.sample_period_secs())
    }

    /// Change the goal temperature; takes effect immediately.
    pub fn set_target(&mut self, target_c: f64) {
        self.target_c = target_c;
    }

    pub fn target(&self) -> f64 {
        self.target_c
    }

    /// True plant temperature (without measurement noise).
    pub fn temperature(&self) -> f64 {
        self.plant.temperature()
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    fn observe(&mut self) -> Observation {
        let measured = self.plant.measure(&mut self.rng, self.noise_std_c);
        [
            (self.target_c - measured) as f32,
            measured as f32,
            self.prev_output as f32,
        ]
    }
}

impl Environment for HeaterEnv {
    fn reset(&mut self, seed: Option<u64>) -> Observation {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.plant.reset(self.initial_c);
        self.prev_output = 0.0;
        self.step_count = 0;
        debug!("env reset: T={:.2}C target={:.2}C", self.initial_c, self.target_c);
        self.observe()
    }

    fn step(&mut self, action: Action) -> Step {
        let output = action_to_output(action);
        let temp = self.plant.step(output);
        let r = reward(&self.cfg, self.target_c, temp, output, self.prev_output);
        self.prev_output = output;
        self.step_count += 1;
        Step {
            observation: self.observe(),
            reward: r,
            terminated: false,
            truncated: self.step_count >= self.cfg.max_steps,
        }
    }

    fn dt(&self) -> f64 {
        self.plant.dt()
    }
}
