//! VX-series temperature controller over Modbus-RTU.
//!
//! The controller exposes its process value, mode word, manual output and
//! set value as holding registers (addresses come from [`RegisterMap`]).
//! Temperatures and outputs carry one decimal place.
//!
//! Mode word bits:
//! ```text
//!   bit0 RUN     (0 = STOP)
//!   bit2 MANUAL  (0 = AUTO)
//!   bit3 REMOTE  (0 = LOCAL)
//! ```
//! The controller only accepts a manual output once it is running, remote
//! and manual, and it needs a short pause between mode changes.

use core::fmt;
use core::ops::BitOr;
use std::time::Duration;

use log::{info, warn};

use super::modbus::{ModbusClient, decode_scaled, encode_scaled};
use super::transport::Transport;
use crate::config::{RegisterMap, SystemConfig};
use crate::error::CommsError;

const DECIMALS: u8 = 1;
/// Modbus "illegal data value", raised locally for unencodable values.
const ILLEGAL_DATA_VALUE: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeWord(pub u16);

impl ModeWord {
    pub const STOP: Self = Self(0);
    pub const RUN: Self = Self(1);
    pub const MANUAL: Self = Self(4);
    pub const REMOTE: Self = Self(8);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ModeWord {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ModeWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = if self.contains(Self::RUN) { "RUN" } else { "STOP" };
        let man = if self.contains(Self::MANUAL) { "MANUAL" } else { "AUTO" };
        let rem = if self.contains(Self::REMOTE) { "REMOTE" } else { "LOCAL" };
        write!(f, "{run}+{man}+{rem} ({})", self.0)
    }
}

fn encode(value: f64) -> Result<u16, CommsError> {
    encode_scaled(value, DECIMALS).ok_or(CommsError::Exception(ILLEGAL_DATA_VALUE))
}

pub struct VxController<T: Transport> {
    client: ModbusClient<T>,
    registers: RegisterMap,
    settle: Duration,
}

impl<T: Transport> VxController<T>
where
    CommsError: From<T::Error>,
{
    pub fn new(client: ModbusClient<T>, registers: RegisterMap, settle: Duration) -> Self {
        Self {
            client,
            registers,
            settle,
        }
    }

    pub fn from_config(transport: T, cfg: &SystemConfig) -> Self {
        let client = ModbusClient::new(
            transport,
            cfg.serial.slave_id,
            Duration::from_millis(cfg.serial.timeout_ms),
        );
        Self::new(
            client,
            cfg.registers,
            Duration::from_millis(cfg.timing.mode_settle_ms),
        )
    }

    pub fn client(&self) -> &ModbusClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ModbusClient<T> {
        &mut self.client
    }

    /// Process value (°C).
    pub fn read_temperature(&mut self) -> Result<f64, CommsError> {
        let regs = self.client.read_holding(self.registers.pv, 1)?;
        Ok(decode_scaled(regs[0], DECIMALS))
    }

    pub fn read_mode(&mut self) -> Result<ModeWord, CommsError> {
        let regs = self.client.read_holding(self.registers.mode, 1)?;
        Ok(ModeWord(regs[0]))
    }

    pub fn set_mode(&mut self, mode: ModeWord) -> Result<(), CommsError> {
        self.client.write_multiple(self.registers.mode, &[mode.bits()])
    }

    /// Write the manual output, clamped to 0–100 %.  Returns the value sent.
    pub fn set_manual_output(&mut self, percent: f64) -> Result<f64, CommsError> {
        let percent = percent.clamp(0.0, 100.0);
        let raw = encode(percent)?;
        self.client.write_multiple(self.registers.manual_output, &[raw])?;
        Ok(percent)
    }

    pub fn set_sv1(&mut self, celsius: f64) -> Result<(), CommsError> {
        let raw = encode(celsius)?;
        self.client.write_multiple(self.registers.sv1, &[raw])
    }

    /// RUN → RUN+REMOTE → RUN+MANUAL+REMOTE, then zero output.
    pub fn enter_manual(&mut self) -> Result<(), CommsError> {
        for mode in [
            ModeWord::RUN,
            ModeWord::RUN | ModeWord::REMOTE,
            ModeWord::RUN | ModeWord::MANUAL | ModeWord::REMOTE,
        ] {
            self.set_mode(mode)?;
            info!("Controller mode {mode}");
            self.pause();
        }
        self.set_manual_output(0.0)?;
        Ok(())
    }

    /// Zero output and hand control back to the controller's own loop.
    pub fn release_to_auto(&mut self) -> Result<(), CommsError> {
        self.set_manual_output(0.0)?;
        self.pause();
        let mode = ModeWord::RUN | ModeWord::REMOTE;
        self.set_mode(mode)?;
        info!("Controller mode {mode}");
        Ok(())
    }

    /// Output 0, SV1 = `safe_temp_c`, AUTO, STOP.
    ///
    /// Every step is attempted even if an earlier one failed; the first
    /// failure is returned.
    pub fn reset_to_safe_state(&mut self, safe_temp_c: f64) -> Result<(), CommsError> {
        let mut first_error = None;
        let mut note = |step: &str, result: Result<(), CommsError>| {
            match result {
                Ok(()) => info!("safe reset: {step} ok"),
                Err(e) => {
                    warn!("safe reset: {step} failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        };

        note("output 0%", self.set_manual_output(0.0).map(|_| ()));
        self.pause();
        note("SV1", self.set_sv1(safe_temp_c));
        self.pause();
        note("AUTO", self.set_mode(ModeWord::RUN | ModeWord::REMOTE));
        self.pause();
        note("STOP", self.set_mode(ModeWord::REMOTE));

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn pause(&self) {
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
    }
}
