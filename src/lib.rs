//! Thermoloop: closed-loop heater control library.
//!
//! Exposes the control core (FSM, safety, PID, profiles), the FOPDT
//! digital twin with its reinforcement-learning environment, the Modbus
//! instrument driver and the adapters that tie them together, for the
//! `thermoloop` binary and for integration testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod env;
pub mod error;
pub mod fsm;
pub mod instrument;
pub mod metrics;
pub mod plant;
pub mod profile;
pub mod recorder;
pub mod safety;
