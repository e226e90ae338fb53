//! Mock rig for integration tests.
//!
//! Plays back a scripted temperature sequence and records every heater
//! call so tests can assert on the full command history without a serial
//! link.

use std::collections::VecDeque;

use thermoloop::app::events::AppEvent;
use thermoloop::app::ports::{EventSink, HeaterPort, TemperaturePort};
use thermoloop::error::{ActuatorError, SensorError};

// ── Heater call record ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HeaterCall {
    Arm,
    SetOutput(f64),
    AllOff,
    Release,
}

// ── MockRig ───────────────────────────────────────────────────

pub struct MockRig {
    pub calls: Vec<HeaterCall>,
    /// Readings returned in order; the last one repeats.
    script: VecDeque<Result<f64, SensorError>>,
    last: f64,
    pub fail_arm: bool,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MockRig {
    pub fn new(temp: f64) -> Self {
        Self {
            calls: Vec::new(),
            script: VecDeque::new(),
            last: temp,
            fail_arm: false,
            fail_writes: false,
        }
    }

    pub fn push_temps(&mut self, temps: impl IntoIterator<Item = f64>) {
        self.script.extend(temps.into_iter().map(Ok));
    }

    pub fn push_failures(&mut self, count: usize) {
        for _ in 0..count {
            self.script.push_back(Err(SensorError::ReadFailed));
        }
    }

    pub fn set_temp(&mut self, temp: f64) {
        self.script.clear();
        self.last = temp;
    }

    /// Output of the most recent successful write (0 after off/release).
    pub fn output(&self) -> f64 {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                HeaterCall::SetOutput(u) => Some(*u),
                HeaterCall::AllOff | HeaterCall::Release => Some(0.0),
                HeaterCall::Arm => None,
            })
            .unwrap_or(0.0)
    }

    pub fn outputs(&self) -> Vec<f64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HeaterCall::SetOutput(u) => Some(*u),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &HeaterCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl TemperaturePort for MockRig {
    fn read_temperature(&mut self) -> Result<f64, SensorError> {
        match self.script.pop_front() {
            Some(Ok(t)) => {
                self.last = t;
                Ok(t)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last),
        }
    }
}

impl HeaterPort for MockRig {
    fn arm(&mut self) -> Result<(), ActuatorError> {
        if self.fail_arm {
            return Err(ActuatorError::ModeWriteFailed);
        }
        self.calls.push(HeaterCall::Arm);
        Ok(())
    }

    fn set_output(&mut self, percent: f64) -> Result<(), ActuatorError> {
        if self.fail_writes {
            return Err(ActuatorError::OutputWriteFailed);
        }
        self.calls.push(HeaterCall::SetOutput(percent));
        Ok(())
    }

    fn all_off(&mut self) {
        self.calls.push(HeaterCall::AllOff);
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        self.calls.push(HeaterCall::Release);
        Ok(())
    }
}

// ── CollectSink ──────────────────────────────────────────────

/// Event sink that keeps every event for later assertions.
#[derive(Default)]
pub struct CollectSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Finished(_)))
            .count()
    }

    pub fn telemetry_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Telemetry(_)))
            .count()
    }
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
