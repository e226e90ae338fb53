//! FOPDT identification from recorded step responses.
//!
//! The heating phase of a step test (rows with a positive commanded output)
//! is fitted to the closed-form response
//!
//! ```text
//!   y(t) = y0                                  t ≤ θ
//!   y(t) = y0 + K·Δu·(1 − exp(−(t − θ)/τ))     t > θ
//! ```
//!
//! by least squares.  The minimiser is a Nelder–Mead simplex with every
//! trial point projected onto the parameter box, started from a fixed guess
//! and from the best point of a coarse grid, keeping the better of the two.

use log::{debug, info};

use super::fopdt::FopdtParams;
use crate::error::IdentifyError;

/// Starting point `(K, τ, θ)`.
pub const INITIAL_GUESS: [f64; 3] = [3.0, 100.0, 5.0];
/// Lower parameter bounds `(K, τ, θ)`.
pub const LOWER_BOUNDS: [f64; 3] = [0.0, 1.0, 0.0];
/// Upper parameter bounds `(K, τ, θ)`.
pub const UPPER_BOUNDS: [f64; 3] = [20.0, 1000.0, 60.0];

const MIN_SAMPLES: usize = 4;
const MAX_ITERATIONS: usize = 4000;
const TOLERANCE: f64 = 1e-12;

/// One row of a step-response recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSample {
    pub elapsed_s: f64,
    /// Output the experiment asked for.
    pub commanded_percent: f64,
    /// Output the controller reported back, when it was logged.
    pub actual_percent: Option<f64>,
    pub temp_c: f64,
}

/// Result of fitting one recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub params: FopdtParams,
    /// Step size used for the fit (%).
    pub delta_u: f64,
    /// Temperature at the start of the heating phase.
    pub y0: f64,
    /// Root-mean-square residual (°C).
    pub rmse: f64,
}

/// Fit `(K, τ, θ)` to the heating phase of `samples`.
pub fn fit_step_response(samples: &[StepSample]) -> Result<FitResult, IdentifyError> {
    let heating: Vec<&StepSample> = samples
        .iter()
        .filter(|s| s.commanded_percent > 0.0)
        .collect();
    let Some(first) = heating.first() else {
        return Err(IdentifyError::NoHeatingPhase);
    };
    if heating.len() < MIN_SAMPLES {
        return Err(IdentifyError::TooFewSamples);
    }

    let t0 = first.elapsed_s;
    let y0 = first.temp_c;
    let times: Vec<f64> = heating.iter().map(|s| s.elapsed_s - t0).collect();
    let temps: Vec<f64> = heating.iter().map(|s| s.temp_c).collect();
    let delta_u = heating
        .iter()
        .map(|s| s.actual_percent.unwrap_or(s.commanded_percent))
        .sum::<f64>()
        / heating.len() as f64;
    if delta_u <= 0.0 {
        return Err(IdentifyError::ZeroInput);
    }

    let cost = |x: &[f64; 3]| -> f64 {
        let p = to_params(x);
        times
            .iter()
            .zip(&temps)
            .map(|(&t, &y)| {
                let r = p.step_response(t, delta_u, y0) - y;
                r * r
            })
            .sum()
    };

    let from_guess = nelder_mead(&cost, INITIAL_GUESS);
    let from_grid = nelder_mead(&cost, grid_start(&cost));
    let (best, sse) = if from_grid.1 < from_guess.1 {
        from_grid
    } else {
        from_guess
    };
    // One restart from the optimum to escape a collapsed simplex.
    let (best, sse) = {
        let again = nelder_mead(&cost, best);
        if again.1 <= sse { again } else { (best, sse) }
    };

    let params = to_params(&best);
    let rmse = (sse / times.len() as f64).sqrt();
    info!(
        "FOPDT fit: K={:.4} tau={:.2}s theta={:.2}s (du={:.1}%, y0={:.2}C, rmse={:.4}C)",
        params.gain, params.time_constant_s, params.dead_time_s, delta_u, y0, rmse
    );
    Ok(FitResult {
        params,
        delta_u,
        y0,
        rmse,
    })
}

/// Parameter-wise mean over several fits.
pub fn average(results: &[FitResult]) -> Result<FopdtParams, IdentifyError> {
    if results.is_empty() {
        return Err(IdentifyError::NoResults);
    }
    let n = results.len() as f64;
    let sum = results.iter().fold([0.0; 3], |acc, r| {
        [
            acc[0] + r.params.gain,
            acc[1] + r.params.time_constant_s,
            acc[2] + r.params.dead_time_s,
        ]
    });
    Ok(FopdtParams {
        gain: sum[0] / n,
        time_constant_s: sum[1] / n,
        dead_time_s: sum[2] / n,
    })
}

fn to_params(x: &[f64; 3]) -> FopdtParams {
    FopdtParams {
        gain: x[0],
        time_constant_s: x[1],
        dead_time_s: x[2],
    }
}

fn project(mut x: [f64; 3]) -> [f64; 3] {
    for i in 0..3 {
        x[i] = x[i].clamp(LOWER_BOUNDS[i], UPPER_BOUNDS[i]);
    }
    x
}

/// Best point of a coarse grid over the box (τ spaced logarithmically).
fn grid_start(cost: &impl Fn(&[f64; 3]) -> f64) -> [f64; 3] {
    const GAINS: usize = 10;
    const TAUS: usize = 12;
    const THETAS: usize = 7;

    let mut best = INITIAL_GUESS;
    let mut best_cost = cost(&best);
    for i in 0..GAINS {
        let k = UPPER_BOUNDS[0] * (i as f64 + 0.5) / GAINS as f64;
        for j in 0..TAUS {
            let frac = j as f64 / (TAUS - 1) as f64;
            let tau = LOWER_BOUNDS[1] * (UPPER_BOUNDS[1] / LOWER_BOUNDS[1]).powf(frac);
            for l in 0..THETAS {
                let theta = UPPER_BOUNDS[2] * l as f64 / (THETAS - 1) as f64;
                let x = [k, tau, theta];
                let c = cost(&x);
                if c < best_cost {
                    best_cost = c;
                    best = x;
                }
            }
        }
    }
    debug!("grid start {best:?} (sse {best_cost:.4})");
    best
}

/// Bounded Nelder–Mead (reflection 1, expansion 2, contraction ½, shrink ½).
fn nelder_mead(cost: &impl Fn(&[f64; 3]) -> f64, start: [f64; 3]) -> ([f64; 3], f64) {
    let start = project(start);
    let mut simplex: Vec<([f64; 3], f64)> = Vec::with_capacity(4);
    simplex.push((start, cost(&start)));
    for i in 0..3 {
        let mut x = start;
        let span = UPPER_BOUNDS[i] - LOWER_BOUNDS[i];
        let step = if x[i].abs() > 1e-9 { 0.25 * x[i] } else { 0.05 * span };
        x[i] += step;
        if x[i] > UPPER_BOUNDS[i] {
            x[i] = start[i] - step;
        }
        let x = project(x);
        simplex.push((x, cost(&x)));
    }

    for _ in 0..MAX_ITERATIONS {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (best_f, worst_f) = (simplex[0].1, simplex[3].1);
        if (worst_f - best_f).abs() <= TOLERANCE * (1.0 + best_f.abs()) {
            break;
        }

        let mut centroid = [0.0; 3];
        for (x, _) in &simplex[..3] {
            for i in 0..3 {
                centroid[i] += x[i] / 3.0;
            }
        }
        let toward = |coef: f64| -> [f64; 3] {
            let mut p = [0.0; 3];
            for i in 0..3 {
                p[i] = centroid[i] + coef * (simplex[3].0[i] - centroid[i]);
            }
            project(p)
        };

        let xr = toward(-1.0);
        let fr = cost(&xr);
        if fr < simplex[0].1 {
            let xe = toward(-2.0);
            let fe = cost(&xe);
            simplex[3] = if fe < fr { (xe, fe) } else { (xr, fr) };
            continue;
        }
        if fr < simplex[2].1 {
            simplex[3] = (xr, fr);
            continue;
        }

        let (xc, fc) = if fr < simplex[3].1 {
            let x = toward(-0.5);
            (x, cost(&x))
        } else {
            let x = toward(0.5);
            (x, cost(&x))
        };
        if fc < simplex[3].1.min(fr) {
            simplex[3] = (xc, fc);
            continue;
        }

        let best = simplex[0].0;
        for entry in simplex.iter_mut().skip(1) {
            let mut x = entry.0;
            for i in 0..3 {
                x[i] = best[i] + 0.5 * (x[i] - best[i]);
            }
            *entry = (x, cost(&x));
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    simplex[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(p: FopdtParams, du: f64, y0: f64, n: usize) -> Vec<StepSample> {
        let mut rows = Vec::new();
        // Cooling tail before and after must be ignored.
        rows.push(StepSample {
            elapsed_s: 0.0,
            commanded_percent: 0.0,
            actual_percent: Some(0.0),
            temp_c: y0,
        });
        for i in 0..n {
            let t = i as f64;
            rows.push(StepSample {
                elapsed_s: 30.0 + t,
                commanded_percent: du,
                actual_percent: Some(du),
                temp_c: p.step_response(t, du, y0),
            });
        }
        rows.push(StepSample {
            elapsed_s: 30.0 + n as f64,
            commanded_percent: 0.0,
            actual_percent: Some(0.0),
            temp_c: 10.0,
        });
        rows
    }

    #[test]
    fn recovers_known_parameters() {
        let truth = FopdtParams {
            gain: 0.5,
            time_constant_s: 80.0,
            dead_time_s: 10.0,
        };
        let fit = fit_step_response(&synthetic(truth, 40.0, 25.0, 300)).unwrap();
        assert!((fit.params.gain - 0.5).abs() < 0.025, "{:?}", fit.params);
        assert!((fit.params.time_constant_s - 80.0).abs() < 4.0, "{:?}", fit.params);
        assert!((fit.params.dead_time_s - 10.0).abs() < 1.0, "{:?}", fit.params);
        assert!(fit.rmse < 0.05);
        assert_eq!(fit.y0, 25.0);
        assert_eq!(fit.delta_u, 40.0);
    }

    #[test]
    fn fit_stays_in_bounds() {
        // A response far steeper than the gain bound allows.
        let truth = FopdtParams {
            gain: 50.0,
            time_constant_s: 20.0,
            dead_time_s: 2.0,
        };
        let fit = fit_step_response(&synthetic(truth, 100.0, 25.0, 100)).unwrap();
        assert!(fit.params.gain <= UPPER_BOUNDS[0]);
        assert!(fit.params.time_constant_s >= LOWER_BOUNDS[1]);
        assert!(fit.params.dead_time_s >= 0.0);
    }

    #[test]
    fn delta_u_falls_back_to_commanded() {
        let truth = FopdtParams {
            gain: 0.3,
            time_constant_s: 60.0,
            dead_time_s: 5.0,
        };
        let mut rows = synthetic(truth, 100.0, 25.0, 200);
        for r in &mut rows {
            r.actual_percent = None;
        }
        let fit = fit_step_response(&rows).unwrap();
        assert_eq!(fit.delta_u, 100.0);
    }

    #[test]
    fn no_heating_phase_is_an_error() {
        let rows = vec![
            StepSample {
                elapsed_s: 0.0,
                commanded_percent: 0.0,
                actual_percent: None,
                temp_c: 25.0,
            };
            10
        ];
        assert_eq!(fit_step_response(&rows), Err(IdentifyError::NoHeatingPhase));
    }

    #[test]
    fn zero_actual_output_is_an_error() {
        let rows: Vec<StepSample> = (0..10)
            .map(|i| StepSample {
                elapsed_s: i as f64,
                commanded_percent: 100.0,
                actual_percent: Some(0.0),
                temp_c: 25.0,
            })
            .collect();
        assert_eq!(fit_step_response(&rows), Err(IdentifyError::ZeroInput));
    }

    #[test]
    fn average_is_parameter_wise_mean() {
        let mk = |k, tau, theta| FitResult {
            params: FopdtParams {
                gain: k,
                time_constant_s: tau,
                dead_time_s: theta,
            },
            delta_u: 100.0,
            y0: 25.0,
            rmse: 0.0,
        };
        let avg = average(&[mk(1.0, 100.0, 10.0), mk(3.0, 140.0, 20.0)]).unwrap();
        assert_eq!(avg.gain, 2.0);
        assert_eq!(avg.time_constant_s, 120.0);
        assert_eq!(avg.dead_time_s, 15.0);
        assert_eq!(average(&[]), Err(IdentifyError::NoResults));
    }
}
