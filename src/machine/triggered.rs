//! Event-driven machine: no polled arbitration, triggers do the moving.

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

/// A machine that changes state only through [`trigger`](Self::trigger)
/// or an explicit [`request_state_change`](Self::request_state_change).
///
/// `update` forwards the tick to the active state and nothing else: no
/// transition is polled, and entering a state marked
/// `can_exit_instantly` does not route onward (there is nothing to poll
/// it with). Registry, negotiation, logging, and reset behave exactly as
/// on [`StateMachine`](crate::StateMachine).
///
/// # Example
///
/// ```rust
/// use stateflow::{State, Transition, TriggeredStateMachine};
///
/// let mut door = TriggeredStateMachine::new("door");
/// door.add_state(State::new("Closed"));
/// door.add_state(State::new("Open"));
/// door.add_trigger_transition("Pull", Transition::new("Closed", "Open", 1));
/// door.add_trigger_transition("Push", Transition::new("Open", "Closed", 1));
///
/// door.init().unwrap();
/// door.trigger("Pull");
/// assert_eq!(door.active_state_name(), Some("Open"));
/// ```
pub struct TriggeredStateMachine {
    id: StateId,
    can_exit_instantly: bool,
    layer: Layer,
}

impl TriggeredStateMachine {
    pub fn new(name: impl Into<StateId>) -> Self {
        Self {
            id: name.into(),
            can_exit_instantly: false,
            layer: Layer::new(false),
        }
    }

    /// A triggered machine that, when nested, acts as a ghost state.
    pub fn ghost(name: impl Into<StateId>) -> Self {
        let mut machine = Self::new(name);
        machine.can_exit_instantly = true;
        machine
    }

    pub fn add_state(&mut self, state: impl StateBehavior) {
        self.layer.add_state(Box::new(state));
    }

    pub fn set_default_state(&mut self, id: impl Into<StateId>) {
        self.layer.set_default_state(id.into());
    }

    pub fn add_trigger_transition(&mut self, trigger: impl Into<TriggerId>, transition: Transition) {
        self.layer.add_trigger_transition(trigger.into(), transition);
    }

    pub fn add_trigger_transition_from_any(
        &mut self,
        trigger: impl Into<TriggerId>,
        transition: Transition,
    ) {
        self.layer
            .add_trigger_transition_from_any(trigger.into(), transition);
    }

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

    pub fn init(&mut self) -> Result<(), StateMachineError> {
        self.layer.enter()
    }

    /// One tick: the active state's `on_update` and nothing more.
    pub fn update(&mut self) {
        if self.layer.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %self.id, "{err}");
            return;
        }
        self.layer.update_active();
    }

    /// Fire a trigger event; the from-any table is consulted before the
    /// active state's own table.
    pub fn trigger(&mut self, trigger: impl Into<TriggerId>) -> bool {
        if self.layer.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %self.id, "{err}");
            return false;
        }
        self.layer.trigger(trigger.into())
    }

    pub fn invoke_action(&mut self, action: impl Into<ActionId>) {
        self.invoke_action_with(action, ActionPayload::None);
    }

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

    pub fn request_state_change(&mut self, target: impl Into<StateId>, force: bool) {
        self.layer.request_state_change(target.into(), force, None);
    }

    pub fn state_can_exit(&mut self) {
        self.layer.state_can_exit();
    }

    pub fn active_state_id(&self) -> Option<StateId> {
        self.layer.active()
    }

    pub fn active_state_name(&self) -> Option<&'static str> {
        self.layer.active().map(|id| id.name())
    }

    pub fn get_state<T: StateBehavior>(&self, id: impl Into<StateId>) -> Option<&T> {
        let state = self.layer.state(id.into())?;
        (state as &dyn Any).downcast_ref::<T>()
    }

    pub fn get_state_mut<T: StateBehavior>(&mut self, id: impl Into<StateId>) -> Option<&mut T> {
        let state = self.layer.state_mut(id.into())?;
        (state as &mut dyn Any).downcast_mut::<T>()
    }

    /// Capture enter/exit events for this machine and every machine
    /// nested in its registry, one depth level per nesting level.
    pub fn attach_logger(&mut self, logger: &StateLogger) {
        logger.reset();
        let own = logger.layer_log();
        self.layer.set_log(Some(own.clone()));
        for state in self.layer.states_mut() {
            state.attach_sub_layer_logger(&own);
        }
    }

    pub fn reset(&mut self) {
        self.layer.reset();
    }

    fn flush_bubble(&mut self, ctx: &mut StateContext) {
        if self.layer.take_bubble() {
            ctx.state_can_exit();
        }
    }
}

impl StateBehavior for TriggeredStateMachine {
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

impl Machine for TriggeredStateMachine {
    fn state_can_exit(&mut self) {
        self.layer.state_can_exit();
    }

    fn request_state_change(&mut self, target: StateId, force: bool) {
        self.layer.request_state_change(target, force, None);
    }

    fn attach_logger(&mut self, logger: &StateLogger) {
        TriggeredStateMachine::attach_logger(self, logger);
    }
}

impl fmt::Debug for TriggeredStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggeredStateMachine")
            .field("id", &self.id)
            .field("active", &self.layer.active())
            .field("pending", &self.layer.pending_target())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::State;
    use crate::logger::{LogEventKind, StateLogger};
    use crate::machine::state_machine::StateMachine;
    use std::sync::{Arc, Mutex};

    #[test]
    fn triggers_move_the_machine() {
        let mut machine = TriggeredStateMachine::new("door");
        machine.add_state(State::new("Closed"));
        machine.add_state(State::new("Open"));
        machine.add_trigger_transition("Pull", Transition::new("Closed", "Open", 1));
        machine.init().unwrap();

        assert!(machine.trigger("Pull"));
        assert_eq!(machine.active_state_name(), Some("Open"));
        assert!(!machine.trigger("Pull"));
    }

    #[test]
    fn update_only_forwards_to_the_active_state() {
        let ticks = Arc::new(Mutex::new(0u32));
        let seen = Arc::clone(&ticks);

        let mut machine = TriggeredStateMachine::new("demo");
        machine.add_state(State::new("Idle").on_updated(move |_| *seen.lock().unwrap() += 1));
        machine.add_state(State::new("Other"));
        machine.init().unwrap();

        machine.update();
        machine.update();
        assert_eq!(*ticks.lock().unwrap(), 2);
        assert_eq!(machine.active_state_name(), Some("Idle"));
    }

    #[test]
    fn instant_exit_states_do_not_route_onward() {
        let mut machine = TriggeredStateMachine::new("demo");
        machine.add_state(State::new("Idle"));
        machine.add_state(State::ghost("Flash"));
        machine.add_state(State::new("After"));
        machine.add_trigger_transition("Go", Transition::new("Idle", "Flash", 1));
        machine.add_trigger_transition("Go", Transition::new("Flash", "After", 1));
        machine.init().unwrap();

        machine.trigger("Go");
        assert_eq!(machine.active_state_name(), Some("Flash"));

        machine.update();
        assert_eq!(machine.active_state_name(), Some("Flash"));
    }

    #[test]
    fn from_any_trigger_table_wins() {
        let mut machine = TriggeredStateMachine::new("demo");
        machine.add_state(State::new("Idle"));
        machine.add_state(State::new("Stunned"));
        machine.add_state(State::new("Block"));
        machine.add_trigger_transition("Hit", Transition::new("Idle", "Block", 9));
        machine.add_trigger_transition_from_any("Hit", Transition::new("", "Stunned", 1));
        machine.init().unwrap();

        machine.trigger("Hit");
        assert_eq!(machine.active_state_name(), Some("Stunned"));
    }

    #[test]
    fn triggered_exit_still_negotiates() {
        let mut machine = TriggeredStateMachine::new("demo");
        machine.add_state(State::new("Busy").on_exit_requested(|_| {}));
        machine.add_state(State::new("Done"));
        machine.add_trigger_transition("Finish", Transition::new("Busy", "Done", 1));
        machine.init().unwrap();

        machine.trigger("Finish");
        assert_eq!(machine.active_state_name(), Some("Busy"));

        machine.state_can_exit();
        assert_eq!(machine.active_state_name(), Some("Done"));
    }

    #[test]
    fn two_way_trigger_transition_works_both_directions() {
        let mut machine = TriggeredStateMachine::new("door");
        machine.add_state(State::new("Closed"));
        machine.add_state(State::new("Open"));
        machine.add_two_way_trigger_transition("Toggle", Transition::new("Closed", "Open", 1));
        machine.init().unwrap();

        machine.trigger("Toggle");
        assert_eq!(machine.active_state_name(), Some("Open"));
        machine.trigger("Toggle");
        assert_eq!(machine.active_state_name(), Some("Closed"));
    }

    #[test]
    fn attached_logger_traces_through_nesting() {
        let logger = StateLogger::new();

        let mut inner = StateMachine::new("Combat");
        inner.add_state(State::new("Windup"));

        let mut machine = TriggeredStateMachine::new("brain");
        machine.add_state(State::new("Idle"));
        machine.add_state(inner);
        machine.add_trigger_transition("Engage", Transition::new("Idle", "Combat", 1));
        machine.attach_logger(&logger);
        machine.init().unwrap();

        machine.trigger("Engage");

        let events: Vec<(usize, LogEventKind, &str)> = logger
            .events()
            .iter()
            .map(|event| (event.depth, event.kind, event.state))
            .collect();
        assert_eq!(
            events,
            vec![
                (0, LogEventKind::Enter, "Idle"),
                (0, LogEventKind::Exit, "Idle"),
                (0, LogEventKind::Enter, "Combat"),
                (1, LogEventKind::Enter, "Windup"),
            ]
        );
    }

    #[test]
    fn reset_clears_the_runtime_records() {
        let mut machine = TriggeredStateMachine::new("door");
        machine.add_state(State::new("Closed"));
        machine.add_state(State::new("Open"));
        machine.add_trigger_transition("Pull", Transition::new("Closed", "Open", 1));
        machine.init().unwrap();
        machine.trigger("Pull");

        machine.reset();
        assert_eq!(machine.active_state_id(), None);

        machine.init().unwrap();
        assert_eq!(machine.active_state_name(), Some("Closed"));
    }
}
