//! Stateflow: a hierarchical, layered state machine runtime with
//! negotiated exits.
//!
//! Hosts assemble a graph of named states and prioritized, guarded
//! transitions once, then drive it from their frame loop. Machines nest
//! as states of other machines, several layers can share one tick, and a
//! state (or a whole nested machine) can defer its own exit until an
//! internal condition completes.
//!
//! # Core Concepts
//!
//! - **States**: closure-driven [`State`] nodes, or anything implementing
//!   [`StateBehavior`] — including the machines themselves.
//! - **Transitions**: directed [`Transition`] edges with a desire
//!   (priority), an optional shared guard, and optional edge callbacks;
//!   the highest eligible desire wins arbitration.
//! - **Negotiation**: exits go through a pending/grant handshake on the
//!   [`StateContext`] mailbox, so a busy state finishes before it yields.
//! - **Triggers and actions**: named events move the machine
//!   ([`TriggeredStateMachine`]) or reach the active leaf state with a
//!   typed [`ActionPayload`].
//! - **Layers**: a [`LayeredStateMachine`] ticks independent layers in
//!   one call.
//! - **Tracing**: a [`StateLogger`] captures timestamped enter/exit
//!   events through arbitrary nesting depth.
//!
//! # Example
//!
//! ```rust
//! use stateflow::{State, StateMachine, Transition};
//!
//! fn spotted_intruder() -> bool {
//!     false
//! }
//!
//! let mut guard = StateMachine::new("guard");
//! guard.add_state(State::new("Patrol").on_updated(|ctx| {
//!     if ctx.elapsed().as_secs_f32() > 8.0 {
//!         ctx.request_state_change("Rest");
//!     }
//! }));
//! guard.add_state(State::new("Rest"));
//! guard.add_state(State::new("Chase"));
//! guard.add_transition_from_any(Transition::new("", "Chase", 10).when(|_| spotted_intruder()));
//!
//! guard.init().unwrap();
//! guard.update();
//! assert_eq!(guard.active_state_name(), Some("Patrol"));
//! ```

pub mod core;
pub mod error;
pub mod logger;
pub mod machine;

// Re-export commonly used types
pub use core::{
    ActionId, ActionPayload, PayloadKind, State, StateBehavior, StateContext, StateId, Timer,
    Transition, TriggerId,
};
pub use error::StateMachineError;
pub use logger::{LayerLog, LogEvent, LogEventKind, StateLogger};
pub use machine::{LayeredStateMachine, Machine, StateMachine, TriggeredStateMachine};
