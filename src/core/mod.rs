//! Core building blocks: interned identifiers, the bookkeeping timer,
//! action payloads, the negotiation context, transitions, and state nodes.
//!
//! Everything here is machine-agnostic; the machine types in
//! [`crate::machine`] drive these pieces through the protocol described
//! on [`StateContext`].

pub(crate) mod action;
pub(crate) mod context;
pub(crate) mod ident;
pub(crate) mod state;
pub(crate) mod timer;
pub(crate) mod transition;

pub use action::{ActionPayload, PayloadKind};
pub use context::StateContext;
pub use ident::{ActionId, StateId, TriggerId};
pub use state::{State, StateBehavior};
pub use timer::Timer;
pub use transition::Transition;
