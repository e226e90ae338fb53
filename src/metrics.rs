//! Run metrics.
//!
//! Batch functions over a temperature trace, plus incremental
//! [`HoldStats`] for the steady-state regime and the serialisable
//! [`RunSummary`] written at the end of an experiment.

use serde::Serialize;

/// Largest excursion past `target` in the direction of travel from `start`
/// (above for heating, below for cooling).  Never negative.
pub fn overshoot(temps: &[f64], start: f64, target: f64) -> f64 {
    let excess = if target >= start {
        temps.iter().fold(f64::NEG_INFINITY, |m, &t| m.max(t)) - target
    } else {
        target - temps.iter().fold(f64::INFINITY, |m, &t| m.min(t))
    };
    if excess.is_finite() { excess.max(0.0) } else { 0.0 }
}

/// Time after which every remaining sample stays within `band` of `target`.
/// `None` if the trace never settles (or is empty).
pub fn settling_time(temps: &[f64], target: f64, band: f64, dt: f64) -> Option<f64> {
    let last_outside = temps.iter().rposition(|t| (t - target).abs() > band);
    match last_outside {
        None if temps.is_empty() => None,
        None => Some(0.0),
        Some(i) if i + 1 == temps.len() => None,
        Some(i) => Some((i + 1) as f64 * dt),
    }
}

/// Fraction of samples within `band` of `setpoint`.
pub fn band_residence(temps: &[f64], setpoint: f64, band: f64) -> f64 {
    if temps.is_empty() {
        return 0.0;
    }
    let inside = temps.iter().filter(|t| (*t - setpoint).abs() <= band).count();
    inside as f64 / temps.len() as f64
}

pub fn rms_error(temps: &[f64], setpoint: f64) -> f64 {
    if temps.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = temps.iter().map(|t| (t - setpoint).powi(2)).sum();
    (sum_sq / temps.len() as f64).sqrt()
}

/// Running statistics for a hold segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HoldStats {
    pub samples: u32,
    pub in_band: u32,
    pub max_abs_deviation_c: f64,
    #[serde(skip)]
    sum_sq: f64,
}

impl HoldStats {
    pub fn record(&mut self, temp_c: f64, setpoint_c: f64, band_c: f64) {
        let dev = (temp_c - setpoint_c).abs();
        self.samples += 1;
        if dev <= band_c {
            self.in_band += 1;
        }
        self.max_abs_deviation_c = self.max_abs_deviation_c.max(dev);
        self.sum_sq += dev * dev;
    }

    pub fn residence(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            f64::from(self.in_band) / f64::from(self.samples)
        }
    }

    pub fn rms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            (self.sum_sq / f64::from(self.samples)).sqrt()
        }
    }
}

/// Outcome of one profile segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub index: usize,
    pub kind: &'static str,
    pub setpoint_c: Option<f64>,
    pub duration_s: f64,
    pub start_temp_c: f64,
    pub end_temp_c: f64,
    /// Excursion past the target (closed-loop ramps only).
    pub overshoot_c: f64,
    /// Present for hold segments.
    pub hold: Option<HoldStats>,
}

/// Outcome of a whole experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Every segment ran to completion.
    pub completed: bool,
    pub duration_s: f64,
    pub segments: Vec<SegmentSummary>,
    /// Fault bitmask at the end of the run.
    pub fault_flags: u8,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overshoot_heating_and_cooling() {
        assert_eq!(overshoot(&[25.0, 39.0, 41.5, 40.0], 25.0, 40.0), 1.5);
        assert_eq!(overshoot(&[60.0, 49.0, 50.0], 60.0, 50.0), 1.0);
        assert_eq!(overshoot(&[25.0, 30.0], 25.0, 40.0), 0.0);
        assert_eq!(overshoot(&[], 25.0, 40.0), 0.0);
    }

    #[test]
    fn settling_time_finds_last_excursion() {
        let temps = [30.0, 38.0, 40.5, 39.95, 40.05, 40.0];
        assert_eq!(settling_time(&temps, 40.0, 0.1, 1.0), Some(3.0));
        assert_eq!(settling_time(&[40.0, 40.0], 40.0, 0.1, 1.0), Some(0.0));
        assert_eq!(settling_time(&[40.0, 45.0], 40.0, 0.1, 1.0), None);
        assert_eq!(settling_time(&[], 40.0, 0.1, 1.0), None);
    }

    #[test]
    fn residence_and_rms() {
        let temps = [50.0, 50.05, 50.3, 49.7];
        assert_eq!(band_residence(&temps, 50.0, 0.1), 0.5);
        let rms = rms_error(&[49.0, 51.0], 50.0);
        assert!((rms - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hold_stats_match_batch_functions() {
        let temps = [50.0, 50.05, 50.3, 49.7, 50.1];
        let mut h = HoldStats::default();
        for t in temps {
            h.record(t, 50.0, 0.1);
        }
        assert_eq!(h.samples, 5);
        assert!((h.residence() - band_residence(&temps, 50.0, 0.1)).abs() < 1e-12);
        assert!((h.rms() - rms_error(&temps, 50.0)).abs() < 1e-12);
        assert!((h.max_abs_deviation_c - 0.3).abs() < 1e-9);
    }

    #[test]
    fn summary_serialises_to_json() {
        let s = RunSummary {
            completed: true,
            duration_s: 12.0,
            segments: vec![SegmentSummary {
                index: 0,
                kind: "hold",
                setpoint_c: Some(50.0),
                duration_s: 12.0,
                start_temp_c: 50.0,
                end_temp_c: 50.02,
                overshoot_c: 0.0,
                hold: Some(HoldStats::default()),
            }],
            fault_flags: 0,
        };
        let json = s.to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["segments"][0]["kind"], "hold");
        assert_eq!(v["completed"], true);
    }
}
