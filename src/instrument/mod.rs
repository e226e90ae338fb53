//! Instrument link: Modbus-RTU framing, byte transports and the
//! temperature-controller driver built on them.

pub mod modbus;
pub mod transport;
pub mod vx;
