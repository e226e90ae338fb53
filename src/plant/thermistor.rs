//! NTC thermistor model (Beta equation).
//!
//! Used to size the sensing chain: how many ohms, and how many volts out of
//! a matched divider, one kelvin is worth, and how that compares with the
//! thermal (Johnson) noise of the element itself.

use serde::{Deserialize, Serialize};

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.38e-23;
const T25_K: f64 = 298.15;
const KELVIN_OFFSET: f64 = 273.15;
/// Divider read-outs closer than this to a rail are rejected (V).
const RAIL_MARGIN_V: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NtcThermistor {
    /// Resistance at 25 °C (Ω).
    pub r25_ohm: f64,
    /// Beta constant (K).
    pub beta_k: f64,
}

impl NtcThermistor {
    /// Off-the-shelf 10 kΩ part.
    pub const COMMERCIAL_10K: Self = Self {
        r25_ohm: 10_000.0,
        beta_k: 3380.0,
    };

    /// High-impedance, high-Beta research element (8.8 MΩ, B = 7650 K).
    pub const RESEARCH_NIO: Self = Self {
        r25_ohm: 8.8e6,
        beta_k: 7650.0,
    };

    pub const fn new(r25_ohm: f64, beta_k: f64) -> Self {
        Self { r25_ohm, beta_k }
    }

    /// R(T) = R25 · exp(B · (1/T − 1/T25)).
    pub fn resistance(&self, t_c: f64) -> f64 {
        let t_k = t_c + KELVIN_OFFSET;
        self.r25_ohm * (self.beta_k * (1.0 / t_k - 1.0 / T25_K)).exp()
    }

    /// Inverse of [`resistance`](Self::resistance); `None` for non-positive input.
    pub fn temperature(&self, r_ohm: f64) -> Option<f64> {
        if r_ohm <= 0.0 {
            return None;
        }
        let inv_t = 1.0 / T25_K + (r_ohm / self.r25_ohm).ln() / self.beta_k;
        if inv_t <= 0.0 {
            return None;
        }
        Some(1.0 / inv_t - KELVIN_OFFSET)
    }

    /// dR/dT = −R·B/T² (Ω/K).
    pub fn sensitivity(&self, t_c: f64) -> f64 {
        let t_k = t_c + KELVIN_OFFSET;
        -self.resistance(t_c) * self.beta_k / (t_k * t_k)
    }

    /// |dV/dT| of a divider whose fixed resistor equals R(T) (V/K).
    pub fn divider_sensitivity(&self, v_in: f64, t_c: f64) -> f64 {
        let t_k = t_c + KELVIN_OFFSET;
        (v_in * self.beta_k / (4.0 * t_k * t_k)).abs()
    }

    /// Johnson noise of the element, √(4·k·T·R·Δf) (V rms).
    pub fn johnson_noise_rms(&self, t_c: f64, bandwidth_hz: f64) -> f64 {
        let t_k = t_c + KELVIN_OFFSET;
        (4.0 * BOLTZMANN * t_k * self.resistance(t_c) * bandwidth_hz).sqrt()
    }

    /// Temperature change that produces `v_noise_rms` at the divider output (K).
    pub fn noise_equivalent_temperature(&self, v_noise_rms: f64, v_in: f64, t_c: f64) -> f64 {
        let s = self.divider_sensitivity(v_in, t_c);
        if s > 0.0 { v_noise_rms / s } else { f64::INFINITY }
    }

    /// Temperature from a divider read-out with the thermistor on the low side.
    pub fn celsius_from_divider(&self, v_out: f64, v_in: f64, r_fixed_ohm: f64) -> Option<f64> {
        if v_out <= RAIL_MARGIN_V || v_out >= v_in - RAIL_MARGIN_V {
            return None;
        }
        let r_ntc = r_fixed_ohm * v_out / (v_in - v_out);
        self.temperature(r_ntc)
    }
}
