//! Instrument adapter: the VX controller behind the port traits.
//!
//! Translates Modbus-level [`CommsError`]s into the sensor / actuator
//! errors the domain understands, and rejects physically implausible
//! readings (an open or shorted probe reads as a wild value rather than
//! an error on most controllers).

use log::{info, warn};

use crate::app::ports::{HeaterPort, TemperaturePort};
use crate::error::{ActuatorError, CommsError, SensorError};
use crate::instrument::transport::Transport;
use crate::instrument::vx::VxController;

/// Readings outside this window are treated as a broken probe (°C).
const PLAUSIBLE_MIN_C: f64 = -50.0;
const PLAUSIBLE_MAX_C: f64 = 500.0;

/// Concrete adapter wrapping a [`VxController`].
pub struct InstrumentRig<T: Transport> {
    controller: VxController<T>,
}

impl<T: Transport> InstrumentRig<T>
where
    CommsError: From<T::Error>,
{
    pub fn new(controller: VxController<T>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &VxController<T> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut VxController<T> {
        &mut self.controller
    }

    pub fn into_inner(self) -> VxController<T> {
        self.controller
    }
}

// ── TemperaturePort implementation ────────────────────────────

impl<T: Transport> TemperaturePort for InstrumentRig<T>
where
    CommsError: From<T::Error>,
{
    fn read_temperature(&mut self) -> Result<f64, SensorError> {
        let t = self.controller.read_temperature().map_err(|e| {
            warn!("PV read failed: {e}");
            SensorError::ReadFailed
        })?;
        if !(PLAUSIBLE_MIN_C..=PLAUSIBLE_MAX_C).contains(&t) {
            warn!("PV {t:.1}C outside plausible range");
            return Err(SensorError::OutOfRange);
        }
        Ok(t)
    }
}

// ── HeaterPort implementation ─────────────────────────────────

impl<T: Transport> HeaterPort for InstrumentRig<T>
where
    CommsError: From<T::Error>,
{
    fn arm(&mut self) -> Result<(), ActuatorError> {
        self.controller.enter_manual().map_err(|e| {
            warn!("Entering manual mode failed: {e}");
            ActuatorError::ModeWriteFailed
        })?;
        info!("Controller in manual mode");
        Ok(())
    }

    fn set_output(&mut self, percent: f64) -> Result<(), ActuatorError> {
        self.controller
            .set_manual_output(percent)
            .map(|_| ())
            .map_err(|e| {
                warn!("MV write failed: {e}");
                ActuatorError::OutputWriteFailed
            })
    }

    fn all_off(&mut self) {
        if let Err(e) = self.controller.set_manual_output(0.0) {
            warn!("Zeroing MV failed: {e}");
        }
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        self.controller.release_to_auto().map_err(|e| {
            warn!("Releasing to auto failed: {e}");
            ActuatorError::ModeWriteFailed
        })
    }
}
