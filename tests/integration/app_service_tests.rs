//! Integration tests for the AppService → FSM → heater pipeline.
//!
//! These run on the host and verify that commands and scripted
//! temperatures drive the expected heater calls and events without any
//! instrument attached.

use std::time::Duration;

use crate::mock_hw::{CollectSink, HeaterCall, MockRig};

use thermoloop::adapters::time::SimClock;
use thermoloop::app::commands::AppCommand;
use thermoloop::app::events::AppEvent;
use thermoloop::app::ports::Clock;
use thermoloop::app::service::AppService;
use thermoloop::config::SystemConfig;
use thermoloop::control::pid::PidGains;
use thermoloop::error::{ActuatorError, Error, SafetyFault};
use thermoloop::fsm::StateId;
use thermoloop::profile::{Profile, Segment};

fn config(segments: Vec<Segment>) -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.timing.stabilize_secs = 3;
    cfg.experiment.profile = Profile::new(segments);
    cfg
}

fn started(cfg: SystemConfig, temp: f64) -> (AppService, MockRig, CollectSink) {
    let mut app = AppService::new(cfg);
    let mut rig = MockRig::new(temp);
    let mut sink = CollectSink::new();
    app.start(&mut sink);
    app.handle_command(AppCommand::Start, &mut rig, &mut sink)
        .expect("start");
    (app, rig, sink)
}

/// Tick until `state` is reached; panics after `limit` ticks.
fn tick_until(app: &mut AppService, rig: &mut MockRig, sink: &mut CollectSink, state: StateId, limit: usize) {
    for _ in 0..limit {
        if app.state() == state {
            return;
        }
        app.tick(rig, sink);
    }
    assert_eq!(app.state(), state, "not reached within {limit} ticks");
}

// ── Start / stabilize ─────────────────────────────────────────

#[test]
fn start_arms_then_soaks_at_zero_output() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    assert_eq!(rig.calls[0], HeaterCall::Arm);

    app.tick(&mut rig, &mut sink);
    assert_eq!(app.state(), StateId::Stabilizing);
    assert!(app.is_running());
    app.tick(&mut rig, &mut sink);
    app.tick(&mut rig, &mut sink);

    assert!(rig.outputs().iter().all(|&u| u == 0.0));
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 3);
}

#[test]
fn arm_failure_rejects_start() {
    let mut app = AppService::new(SystemConfig::default());
    let mut rig = MockRig::new(25.0);
    rig.fail_arm = true;
    let mut sink = CollectSink::new();
    app.start(&mut sink);

    let res = app.handle_command(AppCommand::Start, &mut rig, &mut sink);
    assert_eq!(res, Err(Error::Actuator(ActuatorError::ModeWriteFailed)));
    for _ in 0..5 {
        app.tick(&mut rig, &mut sink);
    }
    assert_eq!(app.state(), StateId::Idle);
    assert!(!app.is_running());
}

// ── Closed-loop segments ──────────────────────────────────────

#[test]
fn heat_up_drives_heater_then_completes_when_settled() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 10);
    app.tick(&mut rig, &mut sink);
    assert!(rig.output() > 0.0, "heater should be driven below target");

    rig.set_temp(40.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::Complete, 10);

    assert_eq!(rig.count(&HeaterCall::Release), 1);
    let summary = app.last_summary().expect("summary");
    assert!(summary.completed);
    assert_eq!(summary.segments.len(), 1);
    assert_eq!(summary.segments[0].kind, "heat-up");
    assert_eq!(summary.segments[0].setpoint_c, Some(40.0));
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::SegmentComplete { index: 0, .. }
    )));
    assert_eq!(sink.finished(), 1);
}

#[test]
fn cool_down_keeps_heater_off_above_target() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::CoolDown { target_c: 30.0 }]), 50.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::CoolDown, 10);
    for _ in 0..10 {
        app.tick(&mut rig, &mut sink);
    }
    assert!(rig.outputs().iter().all(|&u| u == 0.0));
    assert_eq!(app.state(), StateId::CoolDown);

    rig.set_temp(30.05);
    tick_until(&mut app, &mut rig, &mut sink, StateId::Complete, 10);
}

#[test]
fn hold_reports_band_statistics() {
    let (mut app, mut rig, mut sink) = started(
        config(vec![Segment::Hold {
            setpoint_c: 50.0,
            duration_s: 10.0,
        }]),
        50.0,
    );
    tick_until(&mut app, &mut rig, &mut sink, StateId::Hold, 10);
    rig.push_temps([50.05, 50.2, 49.95, 50.0]);
    tick_until(&mut app, &mut rig, &mut sink, StateId::Complete, 15);

    let summary = app.last_summary().expect("summary");
    let hold = summary.segments[0].hold.expect("hold stats");
    assert_eq!(hold.samples, 10);
    assert_eq!(hold.in_band, 9);
    assert!((hold.max_abs_deviation_c - 0.2).abs() < 1e-9);
}

#[test]
fn telemetry_every_tick_carries_setpoint_while_tracking() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 10);
    let ticks = app.tick_count() as usize;
    assert_eq!(sink.telemetry_count(), ticks);

    let t = app.build_telemetry();
    assert_eq!(t.setpoint_c, Some(40.0));
    assert_eq!(t.state, StateId::HeatUp);
    assert_eq!(t.elapsed_s, ticks as f64);
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn over_temperature_forces_error_and_heater_off() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 10);

    rig.set_temp(130.0);
    app.tick(&mut rig, &mut sink);
    assert_eq!(app.state(), StateId::Error);
    assert_ne!(app.fault_flags() & SafetyFault::OverTemperature.mask(), 0);
    assert_eq!(rig.output(), 0.0);
    assert_eq!(rig.count(&HeaterCall::Release), 0);
    assert!(!app.last_summary().expect("summary").completed);
    assert!(sink.events.iter().any(|e| matches!(e, AppEvent::FaultDetected(_))));

    rig.set_temp(25.0);
    app.tick(&mut rig, &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, AppEvent::FaultCleared)));
    app.tick(&mut rig, &mut sink);
    assert_eq!(app.state(), StateId::Idle);
}

#[test]
fn brief_read_failures_hold_last_temperature() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    app.tick(&mut rig, &mut sink);
    rig.push_failures(3);
    for _ in 0..3 {
        app.tick(&mut rig, &mut sink);
        assert_eq!(app.build_telemetry().temperature_c, 25.0);
    }
    assert_eq!(app.fault_flags(), 0);
}

#[test]
fn sustained_read_failures_lose_the_sensor() {
    let cfg = config(vec![Segment::HeatUp { target_c: 40.0 }]);
    let limit = cfg.safety.max_read_failures as usize;
    let (mut app, mut rig, mut sink) = started(cfg, 25.0);
    app.tick(&mut rig, &mut sink);
    rig.push_failures(limit);
    for _ in 0..limit {
        app.tick(&mut rig, &mut sink);
    }
    assert_eq!(app.state(), StateId::Error);
    assert_ne!(app.fault_flags() & SafetyFault::SensorLost.mask(), 0);
}

#[test]
fn write_failure_raises_comms_lost_until_a_write_succeeds() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 10);

    rig.fail_writes = true;
    app.tick(&mut rig, &mut sink);
    assert_ne!(app.fault_flags() & SafetyFault::CommsLost.mask(), 0);
    app.tick(&mut rig, &mut sink);
    assert_eq!(app.state(), StateId::Error);

    rig.fail_writes = false;
    app.tick(&mut rig, &mut sink);
    assert_eq!(app.fault_flags(), 0);
    app.tick(&mut rig, &mut sink);
    assert_eq!(app.state(), StateId::Idle);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn abort_mid_run_releases_and_reports_incomplete() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 10);

    app.handle_command(AppCommand::Abort, &mut rig, &mut sink)
        .expect("abort");
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(rig.count(&HeaterCall::Release), 1);
    assert!(!app.last_summary().expect("summary").completed);
    assert_eq!(sink.finished(), 1);

    // Nothing runs afterwards.
    for _ in 0..5 {
        app.tick(&mut rig, &mut sink);
    }
    assert_eq!(app.state(), StateId::Idle);
}

#[test]
fn start_after_complete_begins_a_new_run() {
    let (mut app, mut rig, mut sink) = started(
        config(vec![Segment::OpenLoop {
            output_percent: 20.0,
            duration_s: 2.0,
        }]),
        25.0,
    );
    tick_until(&mut app, &mut rig, &mut sink, StateId::Complete, 20);

    app.handle_command(AppCommand::Start, &mut rig, &mut sink)
        .expect("restart");
    app.tick(&mut rig, &mut sink);
    assert_eq!(app.state(), StateId::Stabilizing);
    assert!(app.is_running());
    assert_eq!(rig.count(&HeaterCall::Arm), 2);
}

#[test]
fn update_config_applies_when_idle_only() {
    let mut app = AppService::new(SystemConfig::default());
    let mut rig = MockRig::new(25.0);
    let mut sink = CollectSink::new();
    app.start(&mut sink);

    let mut cfg = SystemConfig::default();
    cfg.timing.stabilize_secs = 5;
    app.handle_command(AppCommand::UpdateConfig(cfg.clone()), &mut rig, &mut sink)
        .expect("idle update");
    assert_eq!(app.current_config().timing.stabilize_secs, 5);

    let mut bad = cfg;
    bad.experiment.band_c = 0.0;
    let res = app.handle_command(AppCommand::UpdateConfig(bad), &mut rig, &mut sink);
    assert!(matches!(res, Err(Error::Config(_))));
    assert_eq!(app.current_config().experiment.band_c, 0.1);
}

#[test]
fn update_pid_retunes_live_controller() {
    let (mut app, mut rig, mut sink) = started(config(vec![Segment::HeatUp { target_c: 40.0 }]), 25.0);
    tick_until(&mut app, &mut rig, &mut sink, StateId::HeatUp, 10);
    app.tick(&mut rig, &mut sink);
    let before = rig.output();

    app.handle_command(
        AppCommand::UpdatePid(PidGains {
            kp: 4.0,
            ki: 0.0,
            kd: 0.0,
        }),
        &mut rig,
        &mut sink,
    )
    .expect("update pid");
    app.tick(&mut rig, &mut sink);
    assert!(rig.output() > before);
    assert_eq!(rig.output(), 60.0);
}

// ── Pacing ────────────────────────────────────────────────────

#[test]
fn run_to_completion_paces_on_the_clock() {
    let cfg = config(vec![Segment::OpenLoop {
        output_percent: 10.0,
        duration_s: 5.0,
    }]);
    let (mut app, mut rig, mut sink) = started(cfg, 25.0);
    let mut clock = SimClock::new();

    let summary = app.run_to_completion(&mut rig, &mut clock, &mut sink, 100);
    assert!(summary.completed);
    assert_eq!(app.state(), StateId::Complete);
    assert_eq!(clock.elapsed(), Duration::from_secs(clock.sleeps()));
    assert_eq!(clock.sleeps() + 1, app.tick_count());
}

#[test]
fn exhausted_tick_budget_aborts_the_run() {
    let cfg = config(vec![Segment::Hold {
        setpoint_c: 30.0,
        duration_s: 1000.0,
    }]);
    let (mut app, mut rig, mut sink) = started(cfg, 30.0);
    let mut clock = SimClock::new();

    let summary = app.run_to_completion(&mut rig, &mut clock, &mut sink, 20);
    assert!(!summary.completed);
    assert_eq!(app.tick_count(), 20);
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(rig.output(), 0.0);
}
