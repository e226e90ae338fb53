//! Heater safety supervisor.
//!
//! [`AppService`](crate::app::service::AppService) calls
//! [`SafetySupervisor::evaluate`] with each sample before the sequencer
//! runs, and copies the returned mask into `FsmContext::fault_flags`.  Any
//! set bit sends the sequencer to `Error`, whose enter hook switches the
//! heater off.  Conditions keep being evaluated while in `Error`; each bit
//! drops as soon as its condition is gone, and `Error` hands back to
//! `Idle` only once the whole mask is zero.
//!
//! | Bit                 | Raised when                                          |
//! |---------------------|------------------------------------------------------|
//! | `OverTemperature`   | a fresh reading exceeds `max_temperature_c`          |
//! | `SensorLost`        | `max_read_failures` reads in a row have failed       |
//! | `HeaterIneffective` | output held high for the grace window without rising |
//! | `CommsLost`         | the latest output write failed                       |

use crate::config::SystemConfig;
use crate::error::SafetyFault;
use crate::fsm::context::SensorSnapshot;
use log::{error, info};

/// Safety supervisor.
pub struct SafetySupervisor {
    max_temp_c: f64,
    max_read_failures: u32,
    heater_check_percent: f64,
    min_rise_c: f64,
    /// Latched fault bitmask.
    faults: u8,
    consecutive_read_failures: u32,
    /// Output currently applied to the heater (set by the service).
    output_percent: f64,
    /// Ticks at high output allowed before the rise is checked.
    heater_grace_ticks: u32,
    /// Ticks since the current high-output window opened.
    heater_on_ticks: u32,
    /// Temperature when the current high-output window opened.
    window_start_c: Option<f64>,
}

impl SafetySupervisor {
    pub fn new(config: &SystemConfig) -> Self {
        let s = &config.safety;
        let period = config.timing.sample_period_secs();
        Self {
            max_temp_c: s.max_temperature_c,
            max_read_failures: s.max_read_failures,
            heater_check_percent: s.heater_check_output_percent,
            min_rise_c: s.min_rise_c,
            faults: 0,
            consecutive_read_failures: 0,
            output_percent: 0.0,
            heater_grace_ticks: (f64::from(s.heater_grace_s) / period).ceil() as u32,
            heater_on_ticks: 0,
            window_start_c: None,
        }
    }

    /// Inform the supervisor of the output currently applied.
    pub fn set_output_commanded(&mut self, percent: f64) {
        let high = percent >= self.heater_check_percent && percent > 0.0;
        let was_high = self.output_percent >= self.heater_check_percent && self.output_percent > 0.0;
        if high && !was_high {
            // Fresh window on every rising edge.
            self.heater_on_ticks = 0;
            self.window_start_c = None;
        }
        self.output_percent = percent;
    }

    /// Record the outcome of the latest heater write.  A failure latches
    /// `CommsLost` until the next successful write.
    pub fn report_write(&mut self, ok: bool) {
        self.eval_fault(SafetyFault::CommsLost, !ok);
    }

    /// Update every bit from `snap` and return the resulting mask.
    pub fn evaluate(&mut self, snap: &SensorSnapshot) -> u8 {
        // ── Sensor ────────────────────────────────────────────────
        if snap.read_ok {
            self.consecutive_read_failures = 0;
        } else {
            self.consecutive_read_failures = self.consecutive_read_failures.saturating_add(1);
        }
        self.eval_fault(
            SafetyFault::SensorLost,
            self.consecutive_read_failures >= self.max_read_failures,
        );

        // ── Temperature (only fresh readings count) ───────────────
        if snap.read_ok {
            self.eval_fault(
                SafetyFault::OverTemperature,
                snap.temperature_c > self.max_temp_c,
            );
        }

        // ── Heater effectiveness (only while driven hard) ─────────
        let high = self.output_percent >= self.heater_check_percent && self.output_percent > 0.0;
        if high && snap.read_ok {
            let start = *self.window_start_c.get_or_insert(snap.temperature_c);
            self.heater_on_ticks = self.heater_on_ticks.saturating_add(1);
            if self.heater_on_ticks >= self.heater_grace_ticks {
                let rise = snap.temperature_c - start;
                self.eval_fault(SafetyFault::HeaterIneffective, rise < self.min_rise_c);
                // Next window starts here.
                self.heater_on_ticks = 0;
                self.window_start_c = Some(snap.temperature_c);
            }
        } else if !high {
            self.eval_fault(SafetyFault::HeaterIneffective, false);
            self.heater_on_ticks = 0;
            self.window_start_c = None;
        }

        self.faults
    }

    pub fn faults(&self) -> u8 {
        self.faults
    }

    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    fn eval_fault(&mut self, fault: SafetyFault, active: bool) {
        let was = self.has_fault(fault);
        match (was, active) {
            (false, true) => error!("fault raised: {fault}"),
            (true, false) => info!("fault cleared: {fault}"),
            _ => {}
        }
        if active {
            self.faults |= fault.mask();
        } else {
            self.faults &= !fault.mask();
        }
    }
}
