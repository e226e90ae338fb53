//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for running a temperature
//! experiment: FSM orchestration, safety evaluation and controller
//! selection.  All interaction with the instrument happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without a serial link.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
