//! Unified error types for the heater control stack.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  Sub-errors are small `Copy`
//! enums so they can travel through the safety supervisor and FSM
//! without allocation; only configuration and data-file errors carry owned
//! text.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The temperature could not be read or is implausible.
    Sensor(SensorError),
    /// A heater command failed.
    Actuator(ActuatorError),
    /// A safety interlock was violated.
    Safety(SafetyFault),
    /// The instrument link failed.
    Comms(CommsError),
    /// Configuration is invalid or could not be loaded.
    Config(String),
    /// Plant identification failed.
    Identify(IdentifyError),
    /// A data file (recording, step response) could not be read or written.
    Data(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Identify(e) => write!(f, "identify: {e}"),
            Self::Data(msg) => write!(f, "data: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The PV register read failed at the link level.
    ReadFailed,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "temperature read failed"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Manual output (MV) write failed.
    OutputWriteFailed,
    /// Taking or releasing control (mode word writes) failed.
    ModeWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputWriteFailed => write!(f, "output write failed"),
            Self::ModeWriteFailed => write!(f, "mode write failed"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety faults trigger an immediate transition to the ERROR state and
/// force the heater output to zero.  They are accumulated in a bitfield by
/// the safety supervisor so that simultaneous faults can be tracked and
/// individually cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// Measured temperature exceeds the configured ceiling.
    OverTemperature = 0b0000_0001,
    /// Too many consecutive temperature reads failed.
    SensorLost = 0b0000_0010,
    /// Heater driven hard for the grace period without a temperature rise.
    HeaterIneffective = 0b0000_0100,
    /// The last heater command could not be delivered.
    CommsLost = 0b0000_1000,
}

impl SafetyFault {
    pub const ALL: [Self; 4] = [
        Self::OverTemperature,
        Self::SensorLost,
        Self::HeaterIneffective,
        Self::CommsLost,
    ];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverTemperature => write!(f, "over temperature"),
            Self::SensorLost => write!(f, "sensor lost"),
            Self::HeaterIneffective => write!(f, "heater ineffective"),
            Self::CommsLost => write!(f, "controller link lost"),
        }
    }
}

impl std::error::Error for SafetyFault {}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// The serial port could not be opened.
    OpenFailed,
    /// No (complete) response arrived before the timeout.
    Timeout,
    /// Response CRC did not match.
    BadCrc,
    /// Response came from a different slave or function.
    UnexpectedResponse,
    /// The slave answered with a Modbus exception code.
    Exception(u8),
    /// Underlying I/O error.
    Io,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "serial port open failed"),
            Self::Timeout => write!(f, "response timeout"),
            Self::BadCrc => write!(f, "CRC mismatch"),
            Self::UnexpectedResponse => write!(f, "unexpected response"),
            Self::Exception(code) => write!(f, "modbus exception 0x{code:02X}"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for CommsError {}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Identification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyError {
    /// No rows with a positive heater output were found.
    NoHeatingPhase,
    /// Too few samples to constrain three parameters.
    TooFewSamples,
    /// The mean heater input was zero; the gain is undefined.
    ZeroInput,
    /// Nothing to average.
    NoResults,
}

impl fmt::Display for IdentifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHeatingPhase => write!(f, "no heating phase in data"),
            Self::TooFewSamples => write!(f, "too few samples"),
            Self::ZeroInput => write!(f, "step input is zero"),
            Self::NoResults => write!(f, "no fit results to average"),
        }
    }
}

impl std::error::Error for IdentifyError {}

impl From<IdentifyError> for Error {
    fn from(e: IdentifyError) -> Self {
        Self::Identify(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
