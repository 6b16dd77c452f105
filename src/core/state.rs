//! State nodes: the behavior contract and the closure-driven node.

use super::action::{ActionPayload, PayloadKind};
use super::context::StateContext;
use super::ident::{ActionId, StateId};
use super::timer::Timer;
use super::transition::Transition;
use crate::error::StateMachineError;
use crate::logger::LayerLog;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Contract every registrable node fulfills — plain states and machines
/// alike.
///
/// All hooks are invoked by the owning machine with a [`StateContext`]
/// mailbox; whatever a hook records there is applied by the machine as
/// soon as the hook returns. The default `on_exit_request` grants
/// immediately, which is what most leaf states want; nodes that need to
/// finish something first override it (or, for [`State`], install an
/// `on_exit_requested` callback) and grant later from another hook.
///
/// `attach_sub_layer_logger` and `reset` are plumbing hooks: machines
/// override them to propagate logger handles and pool-style resets into
/// their registries, and leaf nodes normally leave them alone.
pub trait StateBehavior: Any + Send {
    /// Identity of this node within its owning machine.
    fn id(&self) -> StateId;

    /// Human-readable name, resolved through the interner.
    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Whether this node is a ghost state: entering it immediately
    /// re-arbitrates so control can pass through within the same tick.
    fn can_exit_instantly(&self) -> bool {
        false
    }

    /// The node became the active state.
    fn on_enter(&mut self, _ctx: &mut StateContext) {}

    /// One tick while active.
    fn on_update(&mut self, _ctx: &mut StateContext) {}

    /// The node stopped being the active state. `cause` is the transition
    /// that produced the change, when one did.
    fn on_exit(&mut self, _ctx: &mut StateContext, _cause: Option<&Transition>) {}

    /// The owning machine wants to leave this node. Grant via
    /// [`StateContext::state_can_exit`] now or from a later hook.
    fn on_exit_request(&mut self, ctx: &mut StateContext) {
        ctx.state_can_exit();
    }

    /// An action was dispatched while this node was active.
    fn on_action(&mut self, _ctx: &mut StateContext, _action: ActionId, _payload: &ActionPayload) {}

    /// Adopt a logger handle one nesting level below `log`. No-op for
    /// nodes that are not machines.
    fn attach_sub_layer_logger(&mut self, _log: &LayerLog) {}

    /// Restore the node to its pre-entry condition for reuse.
    fn reset(&mut self) {}
}

type LifecycleHook = Box<dyn FnMut(&mut StateContext) + Send>;
type ExitHook = Box<dyn FnMut(Option<&Transition>, &mut StateContext) + Send>;
type ActionHook = Box<dyn FnMut(&ActionPayload, &mut StateContext) + Send>;

struct ActionEntry {
    expected: PayloadKind,
    callback: ActionHook,
}

/// The closure-driven state node.
///
/// Hosts that do not need a hand-written [`StateBehavior`] implementation
/// assemble states fluently from callbacks. Every callback sees the
/// state's elapsed time through [`StateContext::elapsed`]; the timer
/// resets on every entry.
///
/// # Example
///
/// ```rust
/// use stateflow::{State, StateBehavior, StateContext};
///
/// let mut idle = State::new("Idle")
///     .on_entered(|_ctx| println!("settling down"))
///     .on_updated(|ctx| {
///         if ctx.elapsed().as_secs_f32() > 3.0 {
///             ctx.request_state_change("Wander");
///         }
///     });
///
/// assert_eq!(idle.name(), "Idle");
/// assert!(!idle.can_exit_instantly());
///
/// let mut ctx = StateContext::new();
/// idle.on_enter(&mut ctx);
/// ```
pub struct State {
    id: StateId,
    can_exit_instantly: bool,
    timer: Timer,
    entered: Option<LifecycleHook>,
    updated: Option<LifecycleHook>,
    exited: Option<ExitHook>,
    exit_requested: Option<LifecycleHook>,
    actions: HashMap<ActionId, ActionEntry>,
}

impl State {
    /// A state that negotiates its exits normally.
    pub fn new(name: impl Into<StateId>) -> Self {
        Self {
            id: name.into(),
            can_exit_instantly: false,
            timer: Timer::start(),
            entered: None,
            updated: None,
            exited: None,
            exit_requested: None,
            actions: HashMap::new(),
        }
    }

    /// A ghost state: entering it immediately re-arbitrates so control can
    /// route through to a follow-up state within the same tick. Chains of
    /// ghost states route in one commit; a chain that cycles is cut off
    /// after a fixed number of hops and reported.
    pub fn ghost(name: impl Into<StateId>) -> Self {
        let mut state = Self::new(name);
        state.can_exit_instantly = true;
        state
    }

    /// Callback for entry (runs after the timer reset).
    pub fn on_entered(mut self, hook: impl FnMut(&mut StateContext) + Send + 'static) -> Self {
        self.entered = Some(Box::new(hook));
        self
    }

    /// Callback for each tick while active.
    pub fn on_updated(mut self, hook: impl FnMut(&mut StateContext) + Send + 'static) -> Self {
        self.updated = Some(Box::new(hook));
        self
    }

    /// Callback for exit; receives the transition that caused the change
    /// when one did.
    pub fn on_exited(
        mut self,
        hook: impl FnMut(Option<&Transition>, &mut StateContext) + Send + 'static,
    ) -> Self {
        self.exited = Some(Box::new(hook));
        self
    }

    /// Callback deciding when a requested exit is granted. Without one the
    /// state grants instantly; with one, the callback owns the decision
    /// and may grant from any later hook instead.
    pub fn on_exit_requested(
        mut self,
        hook: impl FnMut(&mut StateContext) + Send + 'static,
    ) -> Self {
        self.exit_requested = Some(Box::new(hook));
        self
    }

    /// Register a payload-less action.
    pub fn with_action(
        self,
        action: impl Into<ActionId>,
        mut callback: impl FnMut(&mut StateContext) + Send + 'static,
    ) -> Self {
        self.with_data_action(action, PayloadKind::None, move |_, ctx| callback(ctx))
    }

    /// Register an action expecting a payload of `expected` kind.
    /// Invocations carrying any other kind are reported and dropped.
    pub fn with_data_action(
        mut self,
        action: impl Into<ActionId>,
        expected: PayloadKind,
        callback: impl FnMut(&ActionPayload, &mut StateContext) + Send + 'static,
    ) -> Self {
        self.actions.insert(
            action.into(),
            ActionEntry {
                expected,
                callback: Box::new(callback),
            },
        );
        self
    }

    /// Time since this state was last entered.
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    /// The state's bookkeeping timer.
    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }
}

impl StateBehavior for State {
    fn id(&self) -> StateId {
        self.id
    }

    fn can_exit_instantly(&self) -> bool {
        self.can_exit_instantly
    }

    fn on_enter(&mut self, ctx: &mut StateContext) {
        self.timer.reset();
        ctx.elapsed = self.timer.elapsed();
        if let Some(hook) = self.entered.as_mut() {
            hook(ctx);
        }
    }

    fn on_update(&mut self, ctx: &mut StateContext) {
        ctx.elapsed = self.timer.elapsed();
        if let Some(hook) = self.updated.as_mut() {
            hook(ctx);
        }
    }

    fn on_exit(&mut self, ctx: &mut StateContext, cause: Option<&Transition>) {
        ctx.elapsed = self.timer.elapsed();
        if let Some(hook) = self.exited.as_mut() {
            hook(cause, ctx);
        }
    }

    fn on_exit_request(&mut self, ctx: &mut StateContext) {
        ctx.elapsed = self.timer.elapsed();
        match self.exit_requested.as_mut() {
            Some(hook) => hook(ctx),
            None => ctx.state_can_exit(),
        }
    }

    fn on_action(&mut self, ctx: &mut StateContext, action: ActionId, payload: &ActionPayload) {
        // Unregistered actions are a silent no-op by contract.
        let Some(entry) = self.actions.get_mut(&action) else {
            return;
        };
        if entry.expected != payload.kind() {
            let err = StateMachineError::ActionTypeMismatch {
                action,
                expected: entry.expected,
                found: payload.kind(),
            };
            tracing::error!(state = %self.id, "{err}");
            return;
        }
        ctx.elapsed = self.timer.elapsed();
        (entry.callback)(payload, ctx);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("can_exit_instantly", &self.can_exit_instantly)
            .field("actions", &self.actions.len())
            .finish()
    }
}
