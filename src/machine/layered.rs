//! Multi-layer machine: one tick drives several independent layers.

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

/// A machine whose layers run side by side: each has its own default,
/// active, and pending records plus its own transition tables, and one
/// [`update`](Self::update) ticks them all in ascending index order.
///
/// Registration calls take a layer index; referencing an index for the
/// first time creates that layer (and any gap below it). Arbitration,
/// negotiation, and ghost cascades never cross layers.
///
/// # Example
///
/// ```rust
/// use stateflow::{LayeredStateMachine, State};
///
/// let mut hud = LayeredStateMachine::new("hud");
/// hud.add_state(State::new("Healthy"), 0);
/// hud.add_state(State::new("Wounded"), 0);
/// hud.add_state(State::new("Visible"), 1);
///
/// hud.init().unwrap();
/// assert_eq!(hud.active_state_id(0).map(|id| id.name()), Some("Healthy"));
/// assert_eq!(hud.active_state_id(1).map(|id| id.name()), Some("Visible"));
/// ```
pub struct LayeredStateMachine {
    id: StateId,
    can_exit_instantly: bool,
    layers: Vec<Layer>,
}

impl LayeredStateMachine {
    pub fn new(name: impl Into<StateId>) -> Self {
        Self {
            id: name.into(),
            can_exit_instantly: false,
            layers: Vec::new(),
        }
    }

    /// A layered machine that, when nested, acts as a ghost state.
    pub fn ghost(name: impl Into<StateId>) -> Self {
        let mut machine = Self::new(name);
        machine.can_exit_instantly = true;
        machine
    }

    /// Register a state into `layer`, creating the layer (and any gap
    /// below it) on first use. The first state of a layer becomes that
    /// layer's default.
    pub fn add_state(&mut self, state: impl StateBehavior, layer: usize) {
        self.ensure_layer(layer).add_state(Box::new(state));
    }

    pub fn set_default_state(&mut self, id: impl Into<StateId>, layer: usize) {
        self.ensure_layer(layer).set_default_state(id.into());
    }

    pub fn add_transition(&mut self, transition: Transition, layer: usize) {
        self.ensure_layer(layer).add_transition(transition);
    }

    pub fn add_transition_from_any(&mut self, transition: Transition, layer: usize) {
        self.ensure_layer(layer).add_transition_from_any(transition);
    }

    pub fn add_trigger_transition(
        &mut self,
        trigger: impl Into<TriggerId>,
        transition: Transition,
        layer: usize,
    ) {
        self.ensure_layer(layer)
            .add_trigger_transition(trigger.into(), transition);
    }

    pub fn add_trigger_transition_from_any(
        &mut self,
        trigger: impl Into<TriggerId>,
        transition: Transition,
        layer: usize,
    ) {
        self.ensure_layer(layer)
            .add_trigger_transition_from_any(trigger.into(), transition);
    }

    pub fn add_two_way_transition(&mut self, transition: Transition, layer: usize) {
        let reverse = transition.reverse();
        let slot = self.ensure_layer(layer);
        slot.add_transition(transition);
        slot.add_transition(reverse);
    }

    pub fn add_two_way_trigger_transition(
        &mut self,
        trigger: impl Into<TriggerId>,
        transition: Transition,
        layer: usize,
    ) {
        let trigger = trigger.into();
        let reverse = transition.reverse();
        let slot = self.ensure_layer(layer);
        slot.add_trigger_transition(trigger, transition);
        slot.add_trigger_transition(trigger, reverse);
    }

    /// Enter every layer's default state in index order. Fails without
    /// touching anything if any layer is missing a registered default.
    pub fn init(&mut self) -> Result<(), StateMachineError> {
        if self.layers.is_empty() {
            return Err(StateMachineError::NoDefaultState);
        }
        for layer in &self.layers {
            let start = layer
                .default_state()
                .ok_or(StateMachineError::NoDefaultState)?;
            if !layer.has_state(start) {
                return Err(StateMachineError::StateNotFound(start));
            }
        }
        for layer in &mut self.layers {
            layer.enter()?;
        }
        Ok(())
    }

    /// One tick across all layers in ascending order: per layer, from-any
    /// arbitration, then local arbitration, then the active state's update.
    pub fn update(&mut self) {
        if self.layers.is_empty() {
            let err = StateMachineError::NoDefaultState;
            tracing::error!(machine = %self.id, "{err}");
            return;
        }
        if self.layers.iter().any(|layer| layer.active().is_none()) {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %self.id, "{err}");
            return;
        }
        for layer in &mut self.layers {
            layer.update();
        }
    }

    /// Fire a trigger on one layer.
    pub fn trigger(&mut self, trigger: impl Into<TriggerId>, layer: usize) -> bool {
        let id = self.id;
        let Some(slot) = self.layer_mut(layer) else {
            return false;
        };
        if slot.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %id, layer, "{err}");
            return false;
        }
        slot.trigger(trigger.into())
    }

    /// Dispatch a payload-less action to one layer's active state.
    pub fn invoke_action(&mut self, action: impl Into<ActionId>, layer: usize) {
        self.invoke_action_with(action, ActionPayload::None, layer);
    }

    pub fn invoke_action_with(
        &mut self,
        action: impl Into<ActionId>,
        payload: impl Into<ActionPayload>,
        layer: usize,
    ) {
        let id = self.id;
        let Some(slot) = self.layer_mut(layer) else {
            return;
        };
        if slot.active().is_none() {
            let err = StateMachineError::NotInitialized;
            tracing::error!(machine = %id, layer, "{err}");
            return;
        }
        slot.invoke_action(action.into(), &payload.into());
    }

    /// Ask one layer to change state; the other layers are untouched.
    pub fn request_state_change_in(
        &mut self,
        layer: usize,
        target: impl Into<StateId>,
        force: bool,
    ) {
        if let Some(slot) = self.layer_mut(layer) {
            slot.request_state_change(target.into(), force, None);
        }
    }

    /// Grant pending changes layer by layer. Idempotent for layers with
    /// nothing pending.
    pub fn state_can_exit(&mut self) {
        for layer in &mut self.layers {
            layer.state_can_exit();
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn active_state_id(&self, layer: usize) -> Option<StateId> {
        self.layers.get(layer)?.active()
    }

    /// Snapshot of every layer's active state, index-aligned.
    pub fn active_state_ids(&self) -> Vec<Option<StateId>> {
        self.layers.iter().map(|layer| layer.active()).collect()
    }

    pub fn get_state<T: StateBehavior>(&self, id: impl Into<StateId>, layer: usize) -> Option<&T> {
        let state = self.layers.get(layer)?.state(id.into())?;
        (state as &dyn Any).downcast_ref::<T>()
    }

    pub fn get_state_mut<T: StateBehavior>(
        &mut self,
        id: impl Into<StateId>,
        layer: usize,
    ) -> Option<&mut T> {
        let state = self.layers.get_mut(layer)?.state_mut(id.into())?;
        (state as &mut dyn Any).downcast_mut::<T>()
    }

    pub fn attach_logger(&mut self, logger: &StateLogger) {
        logger.reset();
        let own = logger.layer_log();
        for layer in &mut self.layers {
            layer.set_log(Some(own.clone()));
            for state in layer.states_mut() {
                state.attach_sub_layer_logger(&own);
            }
        }
    }

    /// Clear every layer's runtime records and reset every registered
    /// node; the graph, layer count, and defaults stay.
    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }

    fn ensure_layer(&mut self, index: usize) -> &mut Layer {
        while self.layers.len() <= index {
            self.layers.push(Layer::new(true));
        }
        &mut self.layers[index]
    }

    fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        if index >= self.layers.len() {
            let err = StateMachineError::LayerNotFound(index);
            tracing::warn!(machine = %self.id, "{err}");
            return None;
        }
        Some(&mut self.layers[index])
    }

    fn flush_bubble(&mut self, ctx: &mut StateContext) {
        let mut granted = false;
        for layer in &mut self.layers {
            granted |= layer.take_bubble();
        }
        if granted {
            ctx.state_can_exit();
        }
    }
}

impl StateBehavior for LayeredStateMachine {
    fn id(&self) -> StateId {
        self.id
    }

    fn can_exit_instantly(&self) -> bool {
        self.can_exit_instantly
    }

    fn on_enter(&mut self, ctx: &mut StateContext) {
        if let Err(err) = self.init() {
            tracing::error!(machine = %self.id, "{err}");
        }
        self.flush_bubble(ctx);
    }

    fn on_update(&mut self, ctx: &mut StateContext) {
        self.update();
        self.flush_bubble(ctx);
    }

    fn on_exit(&mut self, _ctx: &mut StateContext, cause: Option<&Transition>) {
        for layer in &mut self.layers {
            layer.exit(cause);
        }
    }

    fn on_exit_request(&mut self, ctx: &mut StateContext) {
        self.state_can_exit();
        self.flush_bubble(ctx);
    }

    fn on_action(&mut self, ctx: &mut StateContext, action: ActionId, payload: &ActionPayload) {
        for layer in &mut self.layers {
            layer.invoke_action(action, payload);
        }
        self.flush_bubble(ctx);
    }

    fn attach_sub_layer_logger(&mut self, log: &LayerLog) {
        let own = log.sub_layer();
        for layer in &mut self.layers {
            layer.set_log(Some(own.clone()));
            for state in layer.states_mut() {
                state.attach_sub_layer_logger(&own);
            }
        }
    }

    fn reset(&mut self) {
        LayeredStateMachine::reset(self);
    }
}

impl Machine for LayeredStateMachine {
    fn state_can_exit(&mut self) {
        LayeredStateMachine::state_can_exit(self);
    }

    /// The 2-argument form addresses layer 0.
    fn request_state_change(&mut self, target: StateId, force: bool) {
        self.request_state_change_in(0, target, force);
    }

    fn attach_logger(&mut self, logger: &StateLogger) {
        LayeredStateMachine::attach_logger(self, logger);
    }
}

impl fmt::Debug for LayeredStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredStateMachine")
            .field("id", &self.id)
            .field("layers", &self.layers.len())
            .field("active", &self.active_state_ids())
            .finish_non_exhaustive()
    }
}
