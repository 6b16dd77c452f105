//! The surface a state sees of its owning machine during a hook call.

use super::ident::{StateId, TriggerId};
use std::time::Duration;

/// A change asked for by a state while one of its hooks was running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChangeRequest {
    pub target: StateId,
    pub force: bool,
}

/// Mailbox handed to every state hook.
///
/// States cannot hold a reference back to the machine that owns them, so
/// anything a hook wants from the machine — granting a pending exit,
/// requesting a change, firing a trigger — is recorded here and applied by
/// the machine as soon as the hook returns, within the same
/// `update()`/`trigger()` call. Signals are applied in a fixed order:
/// change request, then trigger, then exit grant.
///
/// # Example
///
/// ```rust
/// use stateflow::{State, StateContext};
///
/// // A state that asks to leave as soon as it is updated.
/// let state = State::new("Flee").on_updated(|ctx: &mut StateContext| {
///     ctx.request_state_change("Hide");
/// });
/// # let _ = state;
/// ```
#[derive(Debug, Default)]
pub struct StateContext {
    pub(crate) granted: bool,
    pub(crate) request: Option<ChangeRequest>,
    pub(crate) fired: Option<TriggerId>,
    pub(crate) elapsed: Duration,
}

impl StateContext {
    /// Fresh mailbox with no signals recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell the owning machine the state is ready to exit. This is how a
    /// deferred exit is eventually granted; it is a no-op when nothing is
    /// pending.
    pub fn state_can_exit(&mut self) {
        self.granted = true;
    }

    /// Ask the owning machine (the owning layer, under a layered machine)
    /// to move to `target` through the usual exit negotiation.
    pub fn request_state_change(&mut self, target: impl Into<StateId>) {
        self.request = Some(ChangeRequest {
            target: target.into(),
            force: false,
        });
    }

    /// Ask for an immediate change to `target`, skipping negotiation.
    pub fn force_state_change(&mut self, target: impl Into<StateId>) {
        self.request = Some(ChangeRequest {
            target: target.into(),
            force: true,
        });
    }

    /// Fire a trigger on the owning machine once the hook returns.
    pub fn trigger(&mut self, trigger: impl Into<TriggerId>) {
        self.fired = Some(trigger.into());
    }

    /// Time since the state whose hook is running was last entered.
    /// Zero for nodes that do not track time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether an exit grant has been recorded.
    pub fn exit_granted(&self) -> bool {
        self.granted
    }

    /// The change request recorded so far, as `(target, forced)`.
    pub fn requested_change(&self) -> Option<(StateId, bool)> {
        self.request.map(|r| (r.target, r.force))
    }

    /// The trigger recorded so far.
    pub fn fired_trigger(&self) -> Option<TriggerId> {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_carries_no_signals() {
        let ctx = StateContext::new();
        assert!(!ctx.exit_granted());
        assert!(ctx.requested_change().is_none());
        assert!(ctx.fired_trigger().is_none());
        assert_eq!(ctx.elapsed(), Duration::ZERO);
    }

    #[test]
    fn grant_is_recorded() {
        let mut ctx = StateContext::new();
        ctx.state_can_exit();
        assert!(ctx.exit_granted());
    }

    #[test]
    fn request_records_target_and_mode() {
        let mut ctx = StateContext::new();
        ctx.request_state_change("Run");
        assert_eq!(ctx.requested_change(), Some((StateId::of("Run"), false)));

        ctx.force_state_change("Idle");
        assert_eq!(ctx.requested_change(), Some((StateId::of("Idle"), true)));
    }

    #[test]
    fn later_request_overwrites_earlier() {
        let mut ctx = StateContext::new();
        ctx.request_state_change("A");
        ctx.request_state_change("B");
        assert_eq!(ctx.requested_change(), Some((StateId::of("B"), false)));
    }

    #[test]
    fn trigger_is_recorded() {
        let mut ctx = StateContext::new();
        ctx.trigger("alarm");
        assert_eq!(ctx.fired_trigger(), Some(TriggerId::of("alarm")));
    }
}
