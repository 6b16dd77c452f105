//! The single-layer machine, nestable as a state of another machine.

use std::any::Any;
use std::fmt;

use crate::core::action::ActionPayload;
use crate::core::context::StateContext;
use crate::core::ident::{ActionId, StateId, TriggerId};
use crate::core::state::StateBehavior;
use crate::core::transition::Transition;
use crate::error::StateMachineError;
use crate::logger::{LayerLog, StateLogger};
use crate::machine::layer::Layer;
use crate::machine::Machine;

/// A polled hierarchical state machine.
///
/// Assemble the graph once with the `add_*` family, then drive it from the
/// host's frame loop: [`update`](Self::update) runs from-any arbitration,
/// local arbitration, and the active state's tick; [`trigger`](Self::trigger)
/// and [`invoke_action`](Self::invoke_action) deliver events between ticks.
/// Because `StateMachine` itself implements [`StateBehavior`], a fully built
/// machine can be registered as a state of another machine and the exit
/// negotiation spans the whole tree.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use stateflow::{State, StateMachine, Transition};
///
/// let ready = Arc::new(AtomicBool::new(false));
/// let guard = Arc::clone(&ready);
///
/// let mut machine = StateMachine::new("patrol");
/// machine.add_state(State::new("Idle"));
/// machine.add_state(State::new("Run"));
/// machine.add_transition(
///     Transition::new("Idle", "Run", 1).when(move |_| guard.load(Ordering::Relaxed)),
/// );
///
/// machine.init().unwrap();
/// machine.update();
/// assert_eq!(machine.active_state_name(), Some("Idle"));
///
/// ready.store(true, Ordering::Relaxed);
/// machine.update();
/// assert_eq!(machine.active_state_name(), Some("Run"));
/// ```
pub struct StateMachine {
    id: StateId,
    can_exit_instantly: bool,
    layer: Layer,
}

impl StateMachine {
    pub fn new(name: impl Into<StateId>) -> Self {
        Self {
            id: name.into(),
            can_exit_instantly: false,
            layer: Layer::new(true),
        }
    }

    /// A machine that, when nested, acts as a ghost state of its parent.
    pub fn ghost(name: impl Into<StateId>) -> Self {
        let mut machine = Self::new(name);
        machine.can_exit_instantly = true;
        machine
    }

    /// Register a state node. The first state added becomes the default
    /// entry point until [`set_default_state`](Self::set_default_state)
    /// says otherwise; re-registering an id replaces the node and warns.
    pub fn add_state(&mut self, state: impl StateBehavior) {
        self.layer.add_state(Box::new(state));
    }

    pub fn set_default_state(&mut self, id: impl Into<StateId>) {
        self.layer.set_default_state(id.into());
    }

    /// Register a polled edge out of its `from()` state.
    pub fn add_transition(&mut self, transition: Transition) {
        self.layer.add_transition(transition);
    }

    /// Register a polled edge checked every tick regardless of the active
    /// state (its `from()` is ignored).
    pub fn add_transition_from_any(&mut self, transition: Transition) {
        self.layer.add_transition_from_any(transition);
    }

    /// Register an edge taken only when `trigger` fires.
    pub fn add_trigger_transition(&mut self, trigger: impl Into<TriggerId>, transition: Transition) {
        self.layer.add_trigger_transition(trigger.into(), transition);
    }

    /// Register a triggered edge checked regardless of the active state.
    pub fn add_trigger_transition_from_any(
        &mut self,
        trigger: impl Into<TriggerId>,
        transition: Transition,
    ) {
        self.layer
            .add_trigger_transition_from_any(trigger.into(), transition);
    }

    /// Register `transition` and its [`reverse`](Transition::reverse), so
    /// one guard drives both directions.
    ///
    /// ```rust
    /// use stateflow::{State, StateMachine, Transition};
    ///
    /// let mut door = StateMachine::new("door");
    /// door.add_state(State::new("Closed"));
    /// door.add_state(State::new("Open"));
    /// door.add_two_way_transition(Transition::new("Closed", "Open", 1));
    /// ```
    pub fn add_two_way_transition(&mut self, transition: Transition) {
        let reverse = transition.reverse();
        self.layer.add_transition(transition);
        self.layer.add_transition(reverse);
    }

    /// Two-way registration for a triggered edge.
    pub fn add_two_way_trigger_transition(
        &mut self,
        trigger: impl Into<TriggerId>,
        transition: Transition,
    ) {
        let trigger = trigger.into();
        let reverse = transition.reverse();
        self.layer.add_trigger_transition(trigger, transition);
        self.layer.add_trigger_transition(trigger, reverse);
    }

    /// Enter the machine as the root of a tree: commits the default state
    /// and arms every from-any transition.
    pub fn init(&mut self) -> Result<(), StateMachineError> {
        self.layer.enter()
    }

    /// One tick: from-any arbitration, then (only if nothing fired) the
    /// active state's own transitions, then the active state's update.
    pub fn update(&mut self) {
        if self.layer.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %self.id, "{err}");
            return;
        }
        self.layer.update();
    }

    /// Fire a trigger event. Returns whether any transition consumed it;
    /// unknown triggers are silent no-ops.
    pub fn trigger(&mut self, trigger: impl Into<TriggerId>) -> bool {
        if self.layer.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %self.id, "{err}");
            return false;
        }
        self.layer.trigger(trigger.into())
    }

    /// Dispatch a payload-less action to the active state. Machines forward
    /// recursively, so the action reaches the deepest active leaf.
    pub fn invoke_action(&mut self, action: impl Into<ActionId>) {
        self.invoke_action_with(action, ActionPayload::None);
    }

    /// Dispatch an action carrying data.
    pub fn invoke_action_with(
        &mut self,
        action: impl Into<ActionId>,
        payload: impl Into<ActionPayload>,
    ) {
        if self.layer.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %self.id, "{err}");
            return;
        }
        self.layer.invoke_action(action.into(), &payload.into());
    }

    /// Ask the machine to move to `target`. Forced requests commit
    /// immediately; otherwise the active state is consulted and the change
    /// stays pending until it grants.
    pub fn request_state_change(&mut self, target: impl Into<StateId>, force: bool) {
        self.layer.request_state_change(target.into(), force, None);
    }

    /// Grant a pending change, if one exists. Idempotent otherwise.
    pub fn state_can_exit(&mut self) {
        self.layer.state_can_exit();
    }

    pub fn active_state_id(&self) -> Option<StateId> {
        self.layer.active()
    }

    pub fn active_state_name(&self) -> Option<&'static str> {
        self.layer.active().map(|id| id.name())
    }

    /// Typed registry lookup.
    pub fn get_state<T: StateBehavior>(&self, id: impl Into<StateId>) -> Option<&T> {
        let state = self.layer.state(id.into())?;
        (state as &dyn Any).downcast_ref::<T>()
    }

    pub fn get_state_mut<T: StateBehavior>(&mut self, id: impl Into<StateId>) -> Option<&mut T> {
        let state = self.layer.state_mut(id.into())?;
        (state as &mut dyn Any).downcast_mut::<T>()
    }

    /// Lookup sugar for machines registered as states.
    pub fn sub_machine(&self, id: impl Into<StateId>) -> Option<&StateMachine> {
        self.get_state(id)
    }

    pub fn sub_machine_mut(&mut self, id: impl Into<StateId>) -> Option<&mut StateMachine> {
        self.get_state_mut(id)
    }

    /// Capture every enter/exit this machine (and nested machines) commits.
    /// Clears anything the logger recorded before.
    pub fn attach_logger(&mut self, logger: &StateLogger) {
        logger.reset();
        let own = logger.layer_log();
        self.layer.set_log(Some(own.clone()));
        for state in self.layer.states_mut() {
            state.attach_sub_layer_logger(&own);
        }
    }

    /// Return the machine to its pre-entry shape for reuse: active and
    /// pending records clear, every registered node resets, the graph and
    /// default state stay.
    pub fn reset(&mut self) {
        self.layer.reset();
    }

    fn flush_bubble(&mut self, ctx: &mut StateContext) {
        if self.layer.take_bubble() {
            ctx.state_can_exit();
        }
    }
}

impl StateBehavior for StateMachine {
    fn id(&self) -> StateId {
        self.id
    }

    fn can_exit_instantly(&self) -> bool {
        self.can_exit_instantly
    }

    fn on_enter(&mut self, ctx: &mut StateContext) {
        if let Err(err) = self.layer.enter() {
            tracing::error!(machine = %self.id, "{err}");
        }
        self.flush_bubble(ctx);
    }

    fn on_update(&mut self, ctx: &mut StateContext) {
        self.update();
        self.flush_bubble(ctx);
    }

    fn on_exit(&mut self, _ctx: &mut StateContext, cause: Option<&Transition>) {
        self.layer.exit(cause);
    }

    // A parent asking the machine to exit is granted at once, but the
    // machine's own pending change commits first, so the grant never
    // surfaces with internal negotiation still open.
    fn on_exit_request(&mut self, ctx: &mut StateContext) {
        self.layer.state_can_exit();
        self.flush_bubble(ctx);
    }

    fn on_action(&mut self, ctx: &mut StateContext, action: ActionId, payload: &ActionPayload) {
        self.layer.invoke_action(action, payload);
        self.flush_bubble(ctx);
    }

    fn attach_sub_layer_logger(&mut self, log: &LayerLog) {
        let own = log.sub_layer();
        self.layer.set_log(Some(own.clone()));
        for state in self.layer.states_mut() {
            state.attach_sub_layer_logger(&own);
        }
    }

    fn reset(&mut self) {
        self.layer.reset();
    }
}

impl Machine for StateMachine {
    fn state_can_exit(&mut self) {
        self.layer.state_can_exit();
    }

    fn request_state_change(&mut self, target: StateId, force: bool) {
        self.layer.request_state_change(target, force, None);
    }

    fn attach_logger(&mut self, logger: &StateLogger) {
        StateMachine::attach_logger(self, logger);
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.id)
            .field("active", &self.layer.active())
            .field("pending", &self.layer.pending_target())
            .finish_non_exhaustive()
    }
}
