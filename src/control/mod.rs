//! Heater control laws.
//!
//! [`pid`] is the classical loop, [`policy`] the interface any controller
//! (PID, fixed output or a learned policy) presents to the experiment
//! driver and the environment, and [`tune`] a gain search that scores
//! controllers by episode return.

pub mod pid;
pub mod policy;
pub mod tune;
