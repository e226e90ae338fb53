//! Plant models: the digital twin of the heater and its sensor.
//!
//! - [`fopdt`] simulates the heater as a first-order-plus-dead-time system.
//! - [`identify`] fits FOPDT parameters to recorded step responses.
//! - [`thermistor`] models NTC sensor resistance and noise.

pub mod fopdt;
pub mod identify;
pub mod thermistor;

use rand::Rng;

/// Draw one zero-mean normal sample with standard deviation `std`
/// (Box–Muller; `std <= 0` yields exactly zero).
pub fn gaussian(rng: &mut impl Rng, std: f64) -> f64 {
    if std <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen::<f64>();
    std * (-2.0 * u1.ln()).sqrt() * (2.0 * core::f64::consts::PI * u2).cos()
}
