//! System configuration parameters
//!
//! All tunable parameters for the heater rig, the digital twin and the
//! experiment driver.  Values come from a TOML file; every section is
//! optional and falls back to the defaults below.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [experiment]
//! band_c = 0.1
//!
//! [[experiment.profile]]
//! kind = "heat_up"
//! target_c = 40.0
//! ```

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::plant::fopdt::{FopdtParams, MAX_DELAY_STEPS};
use crate::profile::Profile;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub serial: SerialConfig,
    pub registers: RegisterMap,
    pub plant: PlantConfig,
    pub pid: PidConfig,
    pub env: EnvConfig,
    pub safety: SafetyConfig,
    pub timing: TimingConfig,
    pub experiment: ExperimentConfig,
}

// --- Instrument link ---

/// Serial settings for the temperature controller (8 data bits, no parity,
/// 1 stop bit are fixed by the controller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub slave_id: u8,
    pub baud_rate: u32,
    /// Per-request response timeout; must be shorter than the sample period.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            slave_id: 1,
            baud_rate: 9600,
            timeout_ms: 500,
        }
    }
}

/// Holding-register addresses on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    /// Process value (measured temperature), 1 decimal.
    pub pv: u16,
    /// Mode bitfield (RUN / MANUAL / REMOTE).
    pub mode: u16,
    /// Manual output (MV) in percent, 1 decimal.
    pub manual_output: u16,
    /// Set value 1, 1 decimal.
    pub sv1: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            pv: 0,
            mode: 20,
            manual_output: 33,
            sv1: 103,
        }
    }
}

// --- Digital twin ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    /// Process gain (°C per % output).
    pub gain: f64,
    pub time_constant_s: f64,
    pub dead_time_s: f64,
    pub ambient_c: f64,
    /// Temperature at reset.
    pub initial_c: f64,
    /// Standard deviation of simulated measurement noise.
    pub noise_std_c: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            gain: 19.999,
            time_constant_s: 122.544,
            dead_time_s: 15.735,
            ambient_c: 24.0,
            initial_c: 25.0,
            noise_std_c: 0.0,
        }
    }
}

impl PlantConfig {
    pub fn params(&self) -> FopdtParams {
        FopdtParams {
            gain: self.gain,
            time_constant_s: self.time_constant_s,
            dead_time_s: self.dead_time_s,
        }
    }
}

// --- Controller ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        // SIMC gains for the default plant (τc = θ).
        Self {
            kp: 0.195,
            ki: 0.0016,
            kd: 0.0,
            output_min: 0.0,
            output_max: 100.0,
        }
    }
}

// --- RL environment ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub target_c: f64,
    /// Episode length in steps (600 = ten minutes at 1 s).
    pub max_steps: u32,
    /// Above `target + overshoot_margin_c` the error penalty is forced negative.
    pub overshoot_margin_c: f64,
    /// Weight on |Δu| between consecutive steps.
    pub smoothness_weight: f64,
    /// |error| below this earns `bonus`.
    pub bonus_band_c: f64,
    pub bonus: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            target_c: 50.0,
            max_steps: 600,
            overshoot_margin_c: 0.5,
            smoothness_weight: 0.1,
            bonus_band_c: 0.5,
            bonus: 10.0,
        }
    }
}

// --- Safety ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Hard ceiling (°C); exceeding it forces the heater off.
    pub max_temperature_c: f64,
    /// Consecutive failed reads before the sensor is declared lost.
    pub max_read_failures: u32,
    /// Output at or above which the heater is expected to raise temperature.
    pub heater_check_output_percent: f64,
    /// Time allowed at high output before the rise is checked.
    pub heater_grace_s: u32,
    /// Minimum rise expected within the grace period.
    pub min_rise_c: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_temperature_c: 120.0,
            max_read_failures: 5,
            heater_check_output_percent: 50.0,
            heater_grace_s: 60,
            min_rise_c: 0.5,
        }
    }
}

// --- Timing ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Control loop / sampling interval (milliseconds)
    pub sample_period_ms: u64,
    /// Pause between successive mode-word writes (milliseconds)
    pub mode_settle_ms: u64,
    /// Zero-output soak before the first segment (seconds)
    pub stabilize_secs: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: 1000, // 1 Hz
            mode_settle_ms: 500,
            stabilize_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn sample_period_secs(&self) -> f64 {
        self.sample_period_ms as f64 / 1000.0
    }
}

// --- Experiment ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Tolerance band ε around a setpoint (°C).
    pub band_c: f64,
    /// Consecutive in-band samples that count as "settled".
    pub settle_samples: u32,
    /// SV1 written by the safe-state reset.
    pub safe_temp_c: f64,
    pub profile: Profile,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            band_c: 0.1,
            settle_samples: 5,
            safe_temp_c: 25.0,
            profile: Profile::three_regime(40.0, 60.0, 50.0, 600.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Range-check every field.  Invalid values are rejected, never clamped.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if cfg.serial.port.trim().is_empty() {
        return Err(ConfigError::ValidationFailed("serial.port must not be empty"));
    }
    if !(1..=247).contains(&cfg.serial.slave_id) {
        return Err(ConfigError::ValidationFailed("serial.slave_id must be 1–247"));
    }
    if cfg.serial.baud_rate == 0 {
        return Err(ConfigError::ValidationFailed("serial.baud_rate must be positive"));
    }
    if cfg.timing.sample_period_ms == 0 {
        return Err(ConfigError::ValidationFailed(
            "timing.sample_period_ms must be positive",
        ));
    }
    if cfg.serial.timeout_ms == 0 || cfg.serial.timeout_ms >= cfg.timing.sample_period_ms {
        return Err(ConfigError::ValidationFailed(
            "serial.timeout_ms must be positive and shorter than the sample period",
        ));
    }

    let p = &cfg.plant;
    if !(p.gain.is_finite() && p.gain > 0.0) {
        return Err(ConfigError::ValidationFailed("plant.gain must be positive"));
    }
    if !(p.time_constant_s.is_finite() && p.time_constant_s > 0.0) {
        return Err(ConfigError::ValidationFailed(
            "plant.time_constant_s must be positive",
        ));
    }
    if !(p.dead_time_s.is_finite() && p.dead_time_s >= 0.0) {
        return Err(ConfigError::ValidationFailed(
            "plant.dead_time_s must be non-negative",
        ));
    }
    if p.dead_time_s / cfg.timing.sample_period_secs() > MAX_DELAY_STEPS as f64 {
        return Err(ConfigError::ValidationFailed(
            "plant.dead_time_s exceeds the simulator delay line",
        ));
    }
    if !(p.ambient_c.is_finite() && p.initial_c.is_finite()) {
        return Err(ConfigError::ValidationFailed(
            "plant.ambient_c and plant.initial_c must be finite",
        ));
    }
    if !(p.noise_std_c.is_finite() && p.noise_std_c >= 0.0) {
        return Err(ConfigError::ValidationFailed(
            "plant.noise_std_c must be non-negative",
        ));
    }

    let pid = &cfg.pid;
    if ![pid.kp, pid.ki, pid.kd].iter().all(|g| g.is_finite() && *g >= 0.0) {
        return Err(ConfigError::ValidationFailed("pid gains must be non-negative"));
    }
    if !(0.0..=100.0).contains(&pid.output_min)
        || !(0.0..=100.0).contains(&pid.output_max)
        || pid.output_min >= pid.output_max
    {
        return Err(ConfigError::ValidationFailed(
            "pid output limits must satisfy 0 ≤ min < max ≤ 100",
        ));
    }

    if cfg.env.max_steps == 0 {
        return Err(ConfigError::ValidationFailed("env.max_steps must be positive"));
    }
    if cfg.env.smoothness_weight < 0.0 || cfg.env.bonus_band_c < 0.0 {
        return Err(ConfigError::ValidationFailed(
            "env reward weights must be non-negative",
        ));
    }

    let s = &cfg.safety;
    if !(30.0..=400.0).contains(&s.max_temperature_c) {
        return Err(ConfigError::ValidationFailed(
            "safety.max_temperature_c must be 30.0–400.0",
        ));
    }
    if s.max_read_failures == 0 {
        return Err(ConfigError::ValidationFailed(
            "safety.max_read_failures must be at least 1",
        ));
    }
    if !(0.0..=100.0).contains(&s.heater_check_output_percent) {
        return Err(ConfigError::ValidationFailed(
            "safety.heater_check_output_percent must be 0–100",
        ));
    }

    let e = &cfg.experiment;
    if !(e.band_c.is_finite() && e.band_c > 0.0) {
        return Err(ConfigError::ValidationFailed("experiment.band_c must be positive"));
    }
    if e.settle_samples == 0 {
        return Err(ConfigError::ValidationFailed(
            "experiment.settle_samples must be at least 1",
        ));
    }
    if e.safe_temp_c >= s.max_temperature_c {
        return Err(ConfigError::ValidationFailed(
            "experiment.safe_temp_c must be below the safety ceiling",
        ));
    }
    e.profile.validate().map_err(ConfigError::ValidationFailed)?;
    for seg in &e.profile.segments {
        if seg.setpoint().is_some_and(|sp| sp >= s.max_temperature_c) {
            return Err(ConfigError::ValidationFailed(
                "profile setpoints must be below safety.max_temperature_c",
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

/// Load a [`SystemConfig`] from a TOML file and validate it.
///
/// I/O, parse and validation failures are distinguished in the error and
/// every message names the file.
pub fn load_from_file(path: &Path) -> Result<SystemConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound
        } else {
            ConfigError::Io(format!("{}: {e}", path.display()))
        }
    })?;
    let cfg = load_from_str(&content, &path.display().to_string())?;
    info!("Config loaded from {}", path.display());
    Ok(cfg)
}

/// Parse and validate TOML text.  `source_name` appears in error messages.
pub fn load_from_str(content: &str, source_name: &str) -> Result<SystemConfig, ConfigError> {
    let cfg: SystemConfig = toml::from_str(content)
        .map_err(|e| ConfigError::Parse(format!("{source_name}: {e}")))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Validate, then write pretty TOML.
pub fn save_to_file(path: &Path, cfg: &SystemConfig) -> Result<(), ConfigError> {
    validate_config(cfg)?;
    let text = toml::to_string_pretty(cfg)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
    std::fs::write(path, text).map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))
}
