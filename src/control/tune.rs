//! Episode rollouts and PID gain search.
//!
//! [`tune_pid`] is a coordinate search in log-gain space: each round tries
//! scaling every non-zero gain up and down by a factor, keeps whatever
//! raises the episode return, and halves the (log) step when a round makes
//! no progress.  Every candidate is scored on the same seeded episode.

use log::{debug, info};

use super::pid::PidGains;
use super::policy::{PidPolicy, Policy, output_to_action};
use crate::env::Environment;

const EVAL_SEED: u64 = 0;
const INITIAL_FACTOR: f64 = 2.0;
const MIN_LOG_FACTOR: f64 = 0.01;

/// Trace of one episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rollout {
    pub total_reward: f64,
    /// True temperature after each step (from the observation).
    pub temps: Vec<f64>,
    /// Heater output applied at each step (%).
    pub outputs: Vec<f64>,
}

/// Outcome of a gain search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneResult {
    pub gains: PidGains,
    pub total_reward: f64,
    /// Candidates evaluated.
    pub evaluations: usize,
}

/// Run one episode of at most `steps` steps from a seeded reset.
pub fn rollout(
    env: &mut impl Environment,
    policy: &mut dyn Policy,
    steps: usize,
    seed: Option<u64>,
) -> Rollout {
    let dt = env.dt();
    let mut obs = env.reset(seed);
    policy.reset();

    let mut out = Rollout::default();
    for _ in 0..steps {
        let output = policy.act(&obs, dt);
        let step = env.step(output_to_action(output));
        out.total_reward += step.reward;
        out.outputs.push(output);
        out.temps.push(f64::from(step.observation[1]));
        obs = step.observation;
        if step.done() {
            break;
        }
    }
    out
}

fn score(env: &mut impl Environment, gains: PidGains, steps: usize) -> f64 {
    let mut policy = PidPolicy::new(gains);
    rollout(env, &mut policy, steps, Some(EVAL_SEED)).total_reward
}

/// Search PID gains that maximise the episode return on `env`.
pub fn tune_pid(
    env: &mut impl Environment,
    initial: PidGains,
    iterations: usize,
    steps: usize,
) -> TuneResult {
    let mut best = initial;
    let mut best_reward = score(env, best, steps);
    let mut evaluations = 1;
    let mut log_factor = INITIAL_FACTOR.ln();

    info!(
        "tune start: kp={:.4} ki={:.5} kd={:.4} return={:.1}",
        best.kp, best.ki, best.kd, best_reward
    );

    for round in 0..iterations {
        let mut improved = false;
        for index in 0..3 {
            for direction in [1.0, -1.0] {
                let mut candidate = best;
                let gain = match index {
                    0 => &mut candidate.kp,
                    1 => &mut candidate.ki,
                    _ => &mut candidate.kd,
                };
                // Zero gains stay zero; log space cannot reach them.
                if *gain <= 0.0 {
                    continue;
                }
                *gain *= (direction * log_factor).exp();

                let r = score(env, candidate, steps);
                evaluations += 1;
                if r > best_reward {
                    best = candidate;
                    best_reward = r;
                    improved = true;
                    break;
                }
            }
        }
        debug!(
            "tune round {round}: kp={:.4} ki={:.5} kd={:.4} return={:.1} step={:.3}",
            best.kp, best.ki, best.kd, best_reward, log_factor
        );
        if !improved {
            log_factor /= 2.0;
            if log_factor < MIN_LOG_FACTOR {
                break;
            }
        }
    }

    info!(
        "tune done: kp={:.4} ki={:.5} kd={:.4} return={:.1} ({evaluations} evaluations)",
        best.kp, best.ki, best.kd, best_reward
    );
    TuneResult {
        gains: best,
        total_reward: best_reward,
        evaluations,
    }
}
