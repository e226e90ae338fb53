//! Experiment sequencer.
//!
//! Every state is one row of a fixed table holding three plain function
//! pointers:
//!
//! ```text
//!   state        enter        exit         update
//!   Idle         heater off   -            wait for start
//!   Stabilizing  soak at 0 %  -            soak timer
//!   HeatUp       track T_n    -            settled in band?
//!   Hold         track T0     log stats    duration elapsed?
//!   ...
//!   Error        heater off   log          faults cleared?
//! ```
//!
//! [`Fsm::tick`] runs the update handler of the active row.  A returned
//! id means leave: the old row's exit runs, then the new row's enter.
//! Returning the active id restarts it, which is how two consecutive
//! segments of the same kind are sequenced.  Handlers share a single
//! `&mut FsmContext` carrying the latest sample, the heater command, the
//! profile cursor and tick counters.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Experiment states.  The discriminant is the row in
/// [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Stabilizing = 1,
    OpenLoop = 2,
    HeatUp = 3,
    CoolDown = 4,
    Hold = 5,
    Complete = 6,
    Error = 7,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 8;

    /// Row index back to an id.  Unknown rows map to `Error` (and trip a
    /// debug assertion).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Stabilizing,
            2 => Self::OpenLoop,
            3 => Self::HeatUp,
            4 => Self::CoolDown,
            5 => Self::Hold,
            6 => Self::Complete,
            7 => Self::Error,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }

    /// States in which a profile segment is executing.
    pub fn is_segment(self) -> bool {
        matches!(
            self,
            Self::OpenLoop | Self::HeatUp | Self::CoolDown | Self::Hold
        )
    }

    /// States in which the heater may be driven.
    pub fn is_running(self) -> bool {
        self == Self::Stabilizing || self.is_segment()
    }
}

// ---------------------------------------------------------------------------
// Handler signatures
// ---------------------------------------------------------------------------

/// Enter/exit hook, run once per transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Per-tick handler.  `None` stays put.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// Table rows
// ---------------------------------------------------------------------------

/// One row of the state table.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// Table-driven sequencer.  The context is owned by the caller and lent
/// to every call.
pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    tick_count: u64,
    /// `tick_count` when the active state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// The initial state's enter hook does not run until [`start`](Self::start).
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Enter the initial state.  Call once, before ticking.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("sequencer start: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Count the tick, then run the active update handler and follow any
    /// transition it asks for.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Force an immediate transition (used to jump to `Error` or abort to
    /// `Idle` regardless of what `on_update` returned).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn state_name(&self, id: StateId) -> &'static str {
        self.table[id as usize].name
    }

    /// Ticks since the active state was entered.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    fn transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        let from = &self.table[self.current];
        info!("state {} -> {}", from.name, self.table[next as usize].name);
        if let Some(exit) = from.on_exit {
            exit(ctx);
        }

        self.current = next as usize;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
