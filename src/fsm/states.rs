//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers, no closures, no
//! dynamic dispatch.  Segment states read their parameters from the
//! profile segment under the cursor.
//!
//! ```text
//!  IDLE ──[start]──▶ STABILIZING ──[soak done]──▶ first segment
//!
//!  segment ──[done]──▶ next segment ─ … ─▶ COMPLETE ──[start]──▶ STABILIZING
//!     (OPEN_LOOP | HEAT_UP | COOL_DOWN | HOLD)
//!
//!  Any state ──[safety fault]──▶ ERROR ──[faults cleared]──▶ IDLE
//! ```

use super::context::{FsmContext, HeaterCommand};
use super::{StateDescriptor, StateId};
use crate::profile::Segment;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        StateDescriptor {
            id: StateId::Stabilizing,
            name: "Stabilizing",
            on_enter: Some(stabilizing_enter),
            on_exit: None,
            on_update: stabilizing_update,
        },
        StateDescriptor {
            id: StateId::OpenLoop,
            name: "OpenLoop",
            on_enter: Some(open_loop_enter),
            on_exit: None,
            on_update: open_loop_update,
        },
        StateDescriptor {
            id: StateId::HeatUp,
            name: "HeatUp",
            on_enter: Some(ramp_enter),
            on_exit: None,
            on_update: heat_up_update,
        },
        StateDescriptor {
            id: StateId::CoolDown,
            name: "CoolDown",
            on_enter: Some(ramp_enter),
            on_exit: None,
            on_update: cool_down_update,
        },
        StateDescriptor {
            id: StateId::Hold,
            name: "Hold",
            on_enter: Some(hold_enter),
            on_exit: Some(hold_exit),
            on_update: hold_update,
        },
        StateDescriptor {
            id: StateId::Complete,
            name: "Complete",
            on_enter: Some(complete_enter),
            on_exit: None,
            on_update: complete_update,
        },
        StateDescriptor {
            id: StateId::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_exit: Some(error_exit),
            on_update: error_update,
        },
    ]
}

/// State that runs the segment under the cursor.
fn dispatch(ctx: &FsmContext) -> StateId {
    match ctx.current_segment() {
        Some(Segment::OpenLoop { .. }) => StateId::OpenLoop,
        Some(Segment::HeatUp { .. }) => StateId::HeatUp,
        Some(Segment::CoolDown { .. }) => StateId::CoolDown,
        Some(Segment::Hold { .. }) => StateId::Hold,
        None => StateId::Complete,
    }
}

fn advance(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.finish_segment();
    Some(dispatch(ctx))
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    ctx.command = HeaterCommand::Off;
    info!("IDLE: heater off, waiting for start");
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    if ctx.start_requested {
        ctx.start_requested = false;
        return Some(StateId::Stabilizing);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  STABILIZING: zero-output soak before the first segment
// ═══════════════════════════════════════════════════════════════════════════

fn stabilizing_enter(ctx: &mut FsmContext) {
    ctx.command = HeaterCommand::Fixed(0.0);
    ctx.segment.index = 0;
    info!(
        "STABILIZING: 0% for {}s at {:.2}C",
        ctx.config.timing.stabilize_secs, ctx.sensors.temperature_c
    );
}

fn stabilizing_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    if ctx.secs_in_state() >= f64::from(ctx.config.timing.stabilize_secs) {
        return Some(dispatch(ctx));
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPEN_LOOP: fixed output for a fixed time (step testing)
// ═══════════════════════════════════════════════════════════════════════════

fn open_loop_enter(ctx: &mut FsmContext) {
    ctx.begin_segment();
    if let Some(Segment::OpenLoop {
        output_percent,
        duration_s,
    }) = ctx.current_segment()
    {
        ctx.command = HeaterCommand::Fixed(output_percent);
        info!(
            "OPEN_LOOP[{}]: {output_percent:.1}% for {duration_s:.0}s",
            ctx.segment.index
        );
    }
}

fn open_loop_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    ctx.segment.trace.push(ctx.sensors.temperature_c);
    match ctx.current_segment() {
        Some(Segment::OpenLoop { duration_s, .. }) if ctx.secs_in_state() >= duration_s => {
            advance(ctx)
        }
        Some(Segment::OpenLoop { .. }) => None,
        _ => Some(dispatch(ctx)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  HEAT_UP / COOL_DOWN: closed-loop ramps that end once settled
// ═══════════════════════════════════════════════════════════════════════════

fn ramp_enter(ctx: &mut FsmContext) {
    ctx.begin_segment();
    if let Some(seg) = ctx.current_segment() {
        if let Some(target) = seg.setpoint() {
            ctx.command = HeaterCommand::Track(target);
            info!(
                "{}[{}]: {:.2}C -> {target:.2}C",
                seg.label().to_uppercase(),
                ctx.segment.index,
                ctx.sensors.temperature_c
            );
        }
    }
}

/// Count consecutive samples meeting `reached`; true once enough have.
fn settled(ctx: &mut FsmContext, reached: bool) -> bool {
    if reached && ctx.sensors.read_ok {
        ctx.segment.settled_count += 1;
    } else {
        ctx.segment.settled_count = 0;
    }
    ctx.segment.settled_count >= ctx.config.experiment.settle_samples
}

fn heat_up_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    let Some(Segment::HeatUp { target_c }) = ctx.current_segment() else {
        return Some(dispatch(ctx));
    };
    let temp = ctx.sensors.temperature_c;
    ctx.segment.trace.push(temp);
    let band = ctx.config.experiment.band_c;
    if settled(ctx, temp >= target_c - band) {
        info!(
            "HEAT_UP[{}]: settled at {temp:.2}C after {:.0}s",
            ctx.segment.index,
            ctx.secs_in_state()
        );
        return advance(ctx);
    }
    None
}

fn cool_down_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    let Some(Segment::CoolDown { target_c }) = ctx.current_segment() else {
        return Some(dispatch(ctx));
    };
    let temp = ctx.sensors.temperature_c;
    ctx.segment.trace.push(temp);
    let band = ctx.config.experiment.band_c;
    if settled(ctx, temp <= target_c + band) {
        info!(
            "COOL_DOWN[{}]: settled at {temp:.2}C after {:.0}s",
            ctx.segment.index,
            ctx.secs_in_state()
        );
        return advance(ctx);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HOLD: regulate at the setpoint and measure band residence
// ═══════════════════════════════════════════════════════════════════════════

fn hold_enter(ctx: &mut FsmContext) {
    ctx.begin_segment();
    if let Some(Segment::Hold {
        setpoint_c,
        duration_s,
    }) = ctx.current_segment()
    {
        ctx.command = HeaterCommand::Track(setpoint_c);
        info!(
            "HOLD[{}]: {setpoint_c:.2}C ±{:.2}C for {duration_s:.0}s",
            ctx.segment.index, ctx.config.experiment.band_c
        );
    }
}

fn hold_exit(ctx: &mut FsmContext) {
    let h = &ctx.segment.hold;
    info!(
        "HOLD: {} samples, {:.1}% in band, max dev {:.3}C, rms {:.3}C",
        h.samples,
        h.residence() * 100.0,
        h.max_abs_deviation_c,
        h.rms()
    );
}

fn hold_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    let Some(Segment::Hold {
        setpoint_c,
        duration_s,
    }) = ctx.current_segment()
    else {
        return Some(dispatch(ctx));
    };
    let temp = ctx.sensors.temperature_c;
    ctx.segment.trace.push(temp);
    if ctx.sensors.read_ok {
        let band = ctx.config.experiment.band_c;
        ctx.segment.hold.record(temp, setpoint_c, band);
    }
    if ctx.secs_in_state() >= duration_s {
        return advance(ctx);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COMPLETE: profile exhausted, heater off
// ═══════════════════════════════════════════════════════════════════════════

fn complete_enter(ctx: &mut FsmContext) {
    ctx.command = HeaterCommand::Off;
    info!(
        "COMPLETE: {} segments finished at {:.2}C",
        ctx.segment.index, ctx.sensors.temperature_c
    );
}

fn complete_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Error);
    }
    if ctx.start_requested {
        ctx.start_requested = false;
        return Some(StateId::Stabilizing);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR: safety fault, heater off
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut FsmContext) {
    ctx.command = HeaterCommand::Off;
    warn!(
        "ERROR: heater disabled, fault_flags=0b{:08b}",
        ctx.fault_flags
    );
}

fn error_exit(_ctx: &mut FsmContext) {
    info!("ERROR: faults cleared, returning to idle");
}

fn error_update(ctx: &mut FsmContext) -> Option<StateId> {
    // Stay in Error until ALL faults are cleared
    if !ctx.has_faults() {
        return Some(StateId::Idle);
    }
    None
}
