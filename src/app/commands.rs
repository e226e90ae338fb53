//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (CLI, a tuning
//! script, an operator) that the [`AppService`](super::service::AppService)
//! interprets and acts upon.

use crate::config::SystemConfig;
use crate::control::pid::PidGains;
use crate::fsm::StateId;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Take control of the heater and run the configured profile.
    Start,

    /// Stop the run, zero the heater and release it.
    Abort,

    /// Force the FSM into a specific state (debug / testing only).
    ForceState(StateId),

    /// Retune the closed-loop controller in place.
    UpdatePid(PidGains),

    /// Replace the configuration (rejected while a run is active).
    UpdateConfig(SystemConfig),
}
