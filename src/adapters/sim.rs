//! Simulated rig: the FOPDT digital twin behind the port traits.
//!
//! Each `read_temperature` advances the plant by one sample period with
//! the output last written (zero-order hold), then returns a noisy
//! measurement.  Faults can be injected to exercise the safety path
//! without hardware.

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::app::ports::{HeaterPort, TemperaturePort};
use crate::config::PlantConfig;
use crate::error::{ActuatorError, SensorError};
use crate::plant::fopdt::FopdtPlant;

/// Digital-twin rig implementing [`TemperaturePort`] and [`HeaterPort`].
pub struct SimulatedRig {
    plant: FopdtPlant,
    rng: StdRng,
    noise_std_c: f64,
    output: f64,
    armed: bool,
    // -- Fault injection --
    failing_reads: u32,
    fail_writes: bool,
    heater_broken: bool,
}

impl SimulatedRig {
    pub fn new(plant: &PlantConfig, dt: f64, seed: u64) -> Self {
        Self {
            plant: FopdtPlant::new(plant.params(), plant.ambient_c, plant.initial_c, dt),
            rng: StdRng::seed_from_u64(seed),
            noise_std_c: plant.noise_std_c,
            output: 0.0,
            armed: false,
            failing_reads: 0,
            fail_writes: false,
            heater_broken: false,
        }
    }

    /// True plant temperature, without measurement noise.
    pub fn true_temperature(&self) -> f64 {
        self.plant.temperature()
    }

    /// Output currently held (%).
    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn plant(&self) -> &FopdtPlant {
        &self.plant
    }

    /// Fail the next `count` reads.
    pub fn fail_next_reads(&mut self, count: u32) {
        self.failing_reads = count;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Disconnect the heater: writes succeed but have no effect.
    pub fn set_heater_broken(&mut self, broken: bool) {
        self.heater_broken = broken;
    }
}

impl TemperaturePort for SimulatedRig {
    fn read_temperature(&mut self) -> Result<f64, SensorError> {
        let u = if self.heater_broken { 0.0 } else { self.output };
        self.plant.step(u);
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(SensorError::ReadFailed);
        }
        Ok(self.plant.measure(&mut self.rng, self.noise_std_c))
    }
}

impl HeaterPort for SimulatedRig {
    fn arm(&mut self) -> Result<(), ActuatorError> {
        self.armed = true;
        self.output = 0.0;
        info!("SIM: heater armed");
        Ok(())
    }

    fn set_output(&mut self, percent: f64) -> Result<(), ActuatorError> {
        if self.fail_writes {
            return Err(ActuatorError::OutputWriteFailed);
        }
        self.output = percent.clamp(0.0, 100.0);
        debug!("SIM: output {:.1}%", self.output);
        Ok(())
    }

    fn all_off(&mut self) {
        self.output = 0.0;
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        self.output = 0.0;
        self.armed = false;
        info!("SIM: heater released");
        Ok(())
    }
}
