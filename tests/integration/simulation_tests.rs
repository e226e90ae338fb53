//! End-to-end runs against the FOPDT digital twin.
//!
//! The simulated rig and virtual clock make a full three-regime
//! experiment run in milliseconds, exercising the same service, FSM and
//! safety code the instrument uses.

use crate::mock_hw::CollectSink;

use thermoloop::adapters::sim::SimulatedRig;
use thermoloop::adapters::time::SimClock;
use thermoloop::app::commands::AppCommand;
use thermoloop::app::events::AppEvent;
use thermoloop::app::service::AppService;
use thermoloop::config::SystemConfig;
use thermoloop::control::pid::PidGains;
use thermoloop::error::SafetyFault;
use thermoloop::fsm::StateId;
use thermoloop::profile::{Profile, Segment};
use thermoloop::recorder::{CsvRecorder, load_step_response};

fn sim(cfg: &SystemConfig, seed: u64) -> SimulatedRig {
    SimulatedRig::new(&cfg.plant, cfg.timing.sample_period_secs(), seed)
}

fn run(cfg: SystemConfig, rig: &mut SimulatedRig, sink: &mut CollectSink, max_ticks: u64) -> AppService {
    let mut app = AppService::new(cfg);
    app.start(sink);
    app.handle_command(AppCommand::Start, rig, sink)
        .expect("start");
    app.run_to_completion(rig, &mut SimClock::new(), sink, max_ticks);
    app
}

#[test]
fn three_regime_profile_completes_on_the_twin() {
    let mut cfg = SystemConfig::default();
    cfg.timing.stabilize_secs = 10;
    cfg.experiment.profile = Profile::three_regime(40.0, 60.0, 50.0, 300.0);
    let mut rig = sim(&cfg, 1);
    let mut sink = CollectSink::new();

    let app = run(cfg, &mut rig, &mut sink, 4 * 3600);

    assert_eq!(app.state(), StateId::Complete);
    let summary = app.last_summary().expect("summary");
    assert!(summary.completed, "faults=0b{:08b}", summary.fault_flags);
    let kinds: Vec<&str> = summary.segments.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, ["heat-up", "heat-up", "cool-down", "hold"]);

    assert!(summary.segments[0].end_temp_c >= 39.9);
    assert!(summary.segments[1].end_temp_c >= 59.9);
    assert!(summary.segments[2].end_temp_c <= 50.1);
    let hold = summary.segments[3].hold.expect("hold stats");
    assert_eq!(hold.samples, 300);
    assert!(hold.residence() >= 0.9, "residence {}", hold.residence());
    assert!(hold.rms() < 0.1, "rms {}", hold.rms());
    assert!(hold.max_abs_deviation_c < 0.5);

    // Never hotter than the safety ceiling.
    let max_temp = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Telemetry(t) => Some(t.temperature_c),
            _ => None,
        })
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(max_temp < 120.0);
    assert!(!rig.is_armed(), "heater released after completion");
}

#[test]
fn simc_gains_hold_the_setpoint_within_the_band() {
    let mut cfg = SystemConfig::default();
    let gains = PidGains::simc(&cfg.plant.params());
    cfg.pid.kp = gains.kp;
    cfg.pid.ki = gains.ki;
    cfg.pid.kd = gains.kd;
    cfg.timing.stabilize_secs = 10;
    cfg.experiment.profile = Profile::new(vec![
        Segment::HeatUp { target_c: 50.0 },
        Segment::Hold {
            setpoint_c: 50.0,
            duration_s: 1200.0,
        },
    ]);
    let band = cfg.experiment.band_c;
    let mut rig = sim(&cfg, 4);
    let mut sink = CollectSink::new();

    let app = run(cfg, &mut rig, &mut sink, 3 * 3600);

    let summary = app.last_summary().expect("summary");
    assert!(summary.completed, "faults=0b{:08b}", summary.fault_flags);
    let hold = summary.segments[1].hold.expect("hold stats");
    assert_eq!(hold.samples, 1200);
    assert!(hold.residence() >= 0.85, "residence {}", hold.residence());
    assert!(hold.max_abs_deviation_c < 1.5);

    // Once the heat-up overshoot has died out the twin stays inside ε.
    let hold_temps: Vec<f64> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Telemetry(t) if t.state == StateId::Hold => Some(t.temperature_c),
            _ => None,
        })
        .collect();
    assert!(hold_temps.len() >= 1000);
    let worst = hold_temps[300..]
        .iter()
        .map(|t| (t - 50.0).abs())
        .fold(0.0, f64::max);
    assert!(worst <= band, "late deviation {worst:.4}C exceeds {band}C");
}

#[test]
fn broken_heater_trips_the_effectiveness_check() {
    let mut cfg = SystemConfig::default();
    cfg.timing.stabilize_secs = 1;
    cfg.experiment.profile = Profile::new(vec![Segment::OpenLoop {
        output_percent: 80.0,
        duration_s: 600.0,
    }]);
    let mut rig = sim(&cfg, 2);
    rig.set_heater_broken(true);
    let mut sink = CollectSink::new();

    let app = run(cfg, &mut rig, &mut sink, 1000);

    let summary = app.last_summary().expect("summary");
    assert!(!summary.completed);
    assert_ne!(
        summary.fault_flags & SafetyFault::HeaterIneffective.mask(),
        0
    );
    assert_eq!(rig.output(), 0.0);
}

#[test]
fn recorded_step_test_identifies_the_twin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("step.csv");

    let mut cfg = SystemConfig::default();
    cfg.plant.gain = 0.5;
    cfg.plant.time_constant_s = 60.0;
    cfg.plant.dead_time_s = 8.0;
    cfg.plant.initial_c = cfg.plant.ambient_c;
    cfg.timing.stabilize_secs = 5;
    cfg.experiment.profile = Profile::step_test(40.0, 500.0, 100.0);
    let mut rig = sim(&cfg, 3);

    let mut app = AppService::new(cfg);
    let mut sink = (CollectSink::new(), CsvRecorder::open(&path).expect("recorder"));
    app.start(&mut sink);
    app.handle_command(AppCommand::Start, &mut rig, &mut sink)
        .expect("start");
    let summary = app.run_to_completion(&mut rig, &mut SimClock::new(), &mut sink, 2000);
    assert!(summary.completed);
    drop(sink);

    let samples = load_step_response(&path).expect("load");
    let fit = thermoloop::plant::identify::fit_step_response(&samples).expect("fit");
    assert!((fit.params.gain - 0.5).abs() < 0.05, "K = {}", fit.params.gain);
    assert!(
        (fit.params.time_constant_s - 60.0).abs() < 10.0,
        "tau = {}",
        fit.params.time_constant_s
    );
    assert!(
        (fit.params.dead_time_s - 8.0).abs() < 4.0,
        "theta = {}",
        fit.params.dead_time_s
    );
}
