//! AppService driving the VX controller over a scripted Modbus link.
//!
//! The loopback transport releases one canned response per request, so
//! these tests pin down the exact register traffic of a run.

use crate::mock_hw::CollectSink;

use thermoloop::adapters::instrument::InstrumentRig;
use thermoloop::app::commands::AppCommand;
use thermoloop::app::service::AppService;
use thermoloop::config::SystemConfig;
use thermoloop::fsm::StateId;
use thermoloop::instrument::modbus::{
    read_holding_request, read_holding_response, write_multiple_request, write_multiple_response,
};
use thermoloop::instrument::transport::LoopbackTransport;
use thermoloop::instrument::vx::VxController;
use thermoloop::profile::{Profile, Segment};

fn config() -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.timing.mode_settle_ms = 0;
    cfg.timing.stabilize_secs = 1;
    cfg.serial.timeout_ms = 20;
    cfg.experiment.profile = Profile::new(vec![Segment::OpenLoop {
        output_percent: 25.0,
        duration_s: 1.0,
    }]);
    cfg
}

fn echo(t: &mut LoopbackTransport, addr: u16) {
    t.push_response(write_multiple_response(1, addr, 1));
}

/// One control tick: PV read, then MV write.
fn script_tick(t: &mut LoopbackTransport, pv_raw: u16) {
    t.push_response(read_holding_response(1, &[pv_raw]));
    echo(t, 33);
}

#[test]
fn full_run_register_traffic() {
    let cfg = config();
    let mut t = LoopbackTransport::new();
    // Arm: RUN, RUN+REMOTE, RUN+MANUAL+REMOTE, MV 0.
    for addr in [20, 20, 20, 33] {
        echo(&mut t, addr);
    }
    // Idle -> Stabilizing, Stabilizing -> OpenLoop, OpenLoop -> Complete.
    for _ in 0..3 {
        script_tick(&mut t, 250);
    }
    // Release: MV 0, RUN+REMOTE.
    echo(&mut t, 33);
    echo(&mut t, 20);

    let mut rig = InstrumentRig::new(VxController::from_config(t, &cfg));
    let mut app = AppService::new(cfg);
    let mut sink = CollectSink::new();
    app.start(&mut sink);
    app.handle_command(AppCommand::Start, &mut rig, &mut sink)
        .expect("arm");
    for _ in 0..3 {
        app.tick(&mut rig, &mut sink);
    }
    assert_eq!(app.state(), StateId::Complete);
    assert!(app.last_summary().expect("summary").completed);

    let transport = rig.controller().client().transport();
    let w = transport.writes();
    assert_eq!(transport.remaining_responses(), 0);
    assert_eq!(w.len(), 4 + 6 + 2);
    assert_eq!(w[2], write_multiple_request(1, 20, &[13]));
    assert_eq!(w[4], read_holding_request(1, 0, 1));
    assert_eq!(w[5], write_multiple_request(1, 33, &[0]));
    // Open-loop segment applies 25.0 %.
    assert_eq!(w[7], write_multiple_request(1, 33, &[250]));
    assert_eq!(w[10], write_multiple_request(1, 33, &[0]));
    assert_eq!(w[11], write_multiple_request(1, 20, &[9]));
}

#[test]
fn silent_controller_faults_the_run() {
    let cfg = config();
    let limit = cfg.safety.max_read_failures;
    let mut t = LoopbackTransport::new();
    for addr in [20, 20, 20, 33] {
        echo(&mut t, addr);
    }
    let mut rig = InstrumentRig::new(VxController::from_config(t, &cfg));
    let mut app = AppService::new(cfg);
    let mut sink = CollectSink::new();
    app.start(&mut sink);
    app.handle_command(AppCommand::Start, &mut rig, &mut sink)
        .expect("arm");

    // No responses scripted: every read times out, every write too.
    for _ in 0..limit {
        app.tick(&mut rig, &mut sink);
    }
    assert_eq!(app.state(), StateId::Error);
    assert!(!app.last_summary().expect("summary").completed);
}
