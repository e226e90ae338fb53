//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, safety supervisor, controller policy and
//! shared context.  It exposes a clean, hardware-agnostic API.  All I/O
//! flows through port traits injected at call sites, making the entire
//! service testable with mock adapters.
//!
//! ```text
//!  TemperaturePort ──▶ ┌─────────────────────────┐ ──▶ EventSink
//!                      │       AppService         │
//!       HeaterPort ◀── │  FSM · Safety · Policy   │
//!                      └─────────────────────────┘
//! ```

use std::time::Duration;

use log::{info, warn};

use crate::config::{SystemConfig, validate_config};
use crate::control::pid::PidGains;
use crate::control::policy::{ConstantPolicy, PidPolicy, Policy};
use crate::env::Observation;
use crate::error::Error;
use crate::fsm::context::{FsmContext, HeaterCommand};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::metrics::RunSummary;
use crate::safety::SafetySupervisor;

use super::commands::AppCommand;
use super::events::{AppEvent, TelemetryData};
use super::ports::{Clock, EventSink, HeaterPort, TemperaturePort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    safety: SafetySupervisor,
    /// Closed-loop controller for `Track` commands.
    policy: Box<dyn Policy>,
    /// Drives `Fixed` commands (open-loop step segments).
    open_loop: ConstantPolicy,
    /// Seconds per control tick (derived from config).
    tick_secs: f64,
    tick_count: u64,
    /// Output actually applied on the last successful write.
    last_output: f64,
    /// Run in progress, if any.
    run: Option<ActiveRun>,
    last_summary: Option<RunSummary>,
}

struct ActiveRun {
    start_tick: u64,
    summary: RunSummary,
}

impl AppService {
    /// Construct the service with a PID controller from `config.pid`.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        let policy = Box::new(PidPolicy::from_config(&config.pid));
        Self::with_policy(config, policy)
    }

    /// Construct the service around any controller policy.
    pub fn with_policy(config: SystemConfig, policy: Box<dyn Policy>) -> Self {
        let tick_secs = config.timing.sample_period_secs();
        let safety = SafetySupervisor::new(&config);
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::Idle);

        Self {
            fsm,
            ctx,
            safety,
            policy,
            open_loop: ConstantPolicy::new(0.0),
            tick_secs,
            tick_count: 0,
            last_output: 0.0,
            run: None,
            last_summary: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in its initial state (Idle).
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!(
            "AppService started in {:?} with {} controller",
            self.fsm.current_state(),
            self.policy.name()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle:
    /// read temperature → safety → FSM → policy → heater → telemetry.
    ///
    /// The `rig` parameter satisfies **both** [`TemperaturePort`] and
    /// [`HeaterPort`]. This avoids a double mutable borrow while keeping
    /// the port boundary explicit.
    pub fn tick(
        &mut self,
        rig: &mut (impl TemperaturePort + HeaterPort),
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();
        let prev_faults = self.ctx.fault_flags;

        // 1. Read temperature; a failed read keeps the last good value.
        match rig.read_temperature() {
            Ok(t) => {
                self.ctx.sensors.temperature_c = t;
                self.ctx.sensors.read_ok = true;
            }
            Err(e) => {
                warn!("Temperature read failed: {e}");
                self.ctx.sensors.read_ok = false;
            }
        }

        // 2. Safety evaluation
        self.safety.set_output_commanded(self.last_output);
        let faults = self.safety.evaluate(&self.ctx.sensors);
        self.ctx.fault_flags = faults;

        if faults != 0 && self.fsm.current_state() != StateId::Error {
            warn!("Safety fault! flags=0b{:08b}", faults);
            self.fsm.force_transition(StateId::Error, &mut self.ctx);
        }

        // 3. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);

        if let Some(summary) = self.ctx.finished_segment.take() {
            if let Some(run) = self.run.as_mut() {
                run.summary.segments.push(summary.clone());
            }
            sink.emit(&AppEvent::SegmentComplete {
                index: summary.index,
                summary,
            });
        }

        // 4. Controller
        let output = self.compute_output();

        // 5. Apply via HeaterPort
        self.apply_output(rig, output);

        // 6. Events
        let faults = self.ctx.fault_flags;
        if faults != 0 && prev_faults != faults {
            sink.emit(&AppEvent::FaultDetected(faults));
        } else if faults == 0 && prev_faults != 0 {
            sink.emit(&AppEvent::FaultCleared);
        }

        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
            self.on_state_change(prev_state, new_state, rig, sink);
        }

        sink.emit(&AppEvent::Telemetry(self.build_telemetry()));
    }

    /// Tick until the run ends or `max_ticks` elapse, pacing the loop at
    /// the sample period.  Time spent inside a tick is subtracted from
    /// the following sleep.
    pub fn run_to_completion(
        &mut self,
        rig: &mut (impl TemperaturePort + HeaterPort),
        clock: &mut impl Clock,
        sink: &mut impl EventSink,
        max_ticks: u64,
    ) -> RunSummary {
        let period = Duration::from_secs_f64(self.tick_secs);
        for _ in 0..max_ticks {
            let started = clock.elapsed();
            self.tick(rig, sink);
            if self.run.is_none() && !self.fsm.current_state().is_running() {
                break;
            }
            let spent = clock.elapsed().saturating_sub(started);
            clock.sleep(period.saturating_sub(spent));
        }

        if self.run.is_some() {
            warn!("Tick budget of {max_ticks} exhausted before the run ended");
            self.abort(rig, sink);
        }
        self.last_summary.clone().unwrap_or_default()
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        rig: &mut impl HeaterPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        match cmd {
            AppCommand::Start => {
                let state = self.fsm.current_state();
                if !matches!(state, StateId::Idle | StateId::Complete) {
                    warn!("Start ignored in {state:?}");
                    return Ok(());
                }
                rig.arm()?;
                self.ctx.start_requested = true;
                info!(
                    "Run requested: {} segments",
                    self.ctx.config.experiment.profile.len()
                );
            }
            AppCommand::Abort => self.abort(rig, sink),
            AppCommand::ForceState(target) => {
                let prev = self.fsm.current_state();
                self.fsm.force_transition(target, &mut self.ctx);
                sink.emit(&AppEvent::StateChanged {
                    from: prev,
                    to: target,
                });
            }
            AppCommand::UpdatePid(gains) => {
                self.apply_gains(gains);
            }
            AppCommand::UpdateConfig(new_config) => {
                if self.run.is_some() {
                    return Err(Error::Config(
                        "configuration cannot change during a run".into(),
                    ));
                }
                validate_config(&new_config)?;
                self.tick_secs = new_config.timing.sample_period_secs();
                self.safety = SafetySupervisor::new(&new_config);
                self.ctx.tick_period_secs = self.tick_secs;
                let gains = PidGains::from(&new_config.pid);
                self.ctx.config = new_config;
                self.apply_gains(gains);
                info!("Configuration updated at runtime");
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build a telemetry snapshot from the current context.
    pub fn build_telemetry(&self) -> TelemetryData {
        TelemetryData {
            elapsed_s: self.tick_count as f64 * self.tick_secs,
            state: self.fsm.current_state(),
            temperature_c: self.ctx.sensors.temperature_c,
            setpoint_c: self.ctx.command.setpoint(),
            output_percent: self.last_output,
            segment_index: self.ctx.segment.index,
            fault_flags: self.ctx.fault_flags,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current active fault bitmask (0 = no faults).
    pub fn fault_flags(&self) -> u8 {
        self.ctx.fault_flags
    }

    /// Clone of the live configuration.
    pub fn current_config(&self) -> SystemConfig {
        self.ctx.config.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Summary of the most recently finished run.
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    // ── Internal ──────────────────────────────────────────────

    /// Output for this tick from the FSM's heater command.
    fn compute_output(&mut self) -> f64 {
        if self.ctx.has_faults() {
            return 0.0;
        }
        let t = self.ctx.sensors.temperature_c;
        let last = self.last_output;
        let observe = |setpoint: f64| -> Observation {
            [(setpoint - t) as f32, t as f32, last as f32]
        };
        match self.ctx.command {
            HeaterCommand::Off => 0.0,
            HeaterCommand::Fixed(u) => {
                self.open_loop.set_output(u);
                self.open_loop.act(&observe(t), self.tick_secs)
            }
            HeaterCommand::Track(setpoint) => {
                let obs = observe(setpoint);
                let pid = &self.ctx.config.pid;
                self.policy
                    .act(&obs, self.tick_secs)
                    .clamp(pid.output_min, pid.output_max)
            }
        }
    }

    fn apply_output(&mut self, rig: &mut impl HeaterPort, output: f64) {
        match rig.set_output(output) {
            Ok(()) => {
                self.last_output = output;
                self.safety.report_write(true);
            }
            Err(e) => {
                warn!("Heater write of {output:.1}% failed: {e}");
                self.safety.report_write(false);
                rig.all_off();
            }
        }
        self.ctx.fault_flags = self.safety.faults();
    }

    /// Heater off, FSM back to Idle, open run closed as not completed.
    fn abort(&mut self, rig: &mut impl HeaterPort, sink: &mut impl EventSink) {
        let prev = self.fsm.current_state();
        rig.all_off();
        self.last_output = 0.0;
        self.ctx.start_requested = false;
        if prev != StateId::Idle {
            self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            sink.emit(&AppEvent::StateChanged {
                from: prev,
                to: StateId::Idle,
            });
        }
        if self.run.is_some() {
            info!("Run aborted");
            self.end_run(false, rig, sink);
        }
    }

    fn apply_gains(&mut self, gains: PidGains) {
        self.policy.set_gains(gains);
        let pid = &mut self.ctx.config.pid;
        pid.kp = gains.kp;
        pid.ki = gains.ki;
        pid.kd = gains.kd;
        info!(
            "PID gains updated: kp={:.4} ki={:.5} kd={:.4}",
            gains.kp, gains.ki, gains.kd
        );
    }

    fn on_state_change(
        &mut self,
        from: StateId,
        to: StateId,
        rig: &mut impl HeaterPort,
        sink: &mut impl EventSink,
    ) {
        if to == StateId::Stabilizing && !from.is_running() {
            self.policy.reset();
            self.run = Some(ActiveRun {
                start_tick: self.tick_count,
                summary: RunSummary::default(),
            });
            info!("Run started");
        }
        if self.run.is_some() {
            match to {
                StateId::Complete => self.end_run(true, rig, sink),
                StateId::Error | StateId::Idle => self.end_run(false, rig, sink),
                _ => {}
            }
        }
    }

    fn end_run(&mut self, completed: bool, rig: &mut impl HeaterPort, sink: &mut impl EventSink) {
        let Some(run) = self.run.take() else {
            return;
        };
        let mut summary = run.summary;
        summary.completed = completed;
        summary.duration_s = self.tick_count.saturating_sub(run.start_tick) as f64 * self.tick_secs;
        summary.fault_flags = self.ctx.fault_flags;

        // A faulted run keeps manual control at zero output; otherwise
        // hand the heater back.
        if summary.fault_flags == 0 {
            if let Err(e) = rig.release() {
                warn!("Releasing heater failed: {e}");
            }
        } else {
            rig.all_off();
        }
        self.last_output = 0.0;

        info!(
            "Run finished: completed={} duration={:.0}s segments={} faults=0b{:08b}",
            summary.completed,
            summary.duration_s,
            summary.segments.len(),
            summary.fault_flags
        );
        sink.emit(&AppEvent::Finished(summary.clone()));
        self.last_summary = Some(summary);
    }
}
