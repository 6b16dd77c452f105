//! The three machine types and the surface they share.

mod layer;
mod layered;
mod state_machine;
mod triggered;

pub use layered::LayeredStateMachine;
pub use state_machine::StateMachine;
pub use triggered::TriggeredStateMachine;

use crate::core::ident::StateId;
use crate::logger::StateLogger;
use crate::core::state::StateBehavior;

/// The negotiation surface every machine exposes, regardless of flavor.
///
/// Hosts that drive machines generically (or hold them behind a trait
/// object) use this to grant exits, request changes, and wire up tracing
/// without caring which concrete machine they have. Nesting itself rides
/// on [`StateBehavior`].
pub trait Machine: StateBehavior {
    /// Grant the pending state change, if any. A nested machine commits
    /// its own pending before the grant reaches its parent.
    fn state_can_exit(&mut self);

    /// Ask for a change of active state; `force` skips negotiation. For
    /// [`LayeredStateMachine`] this form addresses layer 0.
    fn request_state_change(&mut self, target: StateId, force: bool);

    /// Adopt `logger` for this machine and every machine nested below it.
    fn attach_logger(&mut self, logger: &StateLogger);
}
