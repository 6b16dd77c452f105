//! Per-layer engine shared by every machine type: the state registry,
//! arbitration, and the two-phase exit negotiation.

use crate::core::action::ActionPayload;
use crate::core::context::{ChangeRequest, StateContext};
use crate::core::ident::{ActionId, StateId, TriggerId};
use crate::core::state::StateBehavior;
use crate::core::transition::Transition;
use crate::error::StateMachineError;
use crate::logger::LayerLog;
use std::collections::HashMap;

/// Registry slot for one state id: the node itself plus its outgoing
/// transition tables, created lazily so states without transitions (and
/// ids referenced before their state arrives) cost a single `None`.
#[derive(Default)]
pub(crate) struct StateBundle {
    pub state: Option<Box<dyn StateBehavior>>,
    pub transitions: Option<Vec<Transition>>,
    pub trigger_transitions: Option<HashMap<TriggerId, Vec<Transition>>>,
}

impl StateBundle {
    fn add_transition(&mut self, transition: Transition) {
        self.transitions.get_or_insert_with(Vec::new).push(transition);
    }

    fn add_trigger_transition(&mut self, trigger: TriggerId, transition: Transition) {
        self.trigger_transitions
            .get_or_insert_with(HashMap::new)
            .entry(trigger)
            .or_default()
            .push(transition);
    }
}

/// Which transition table a committed change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransitionSlot {
    Global,
    Local(StateId),
    GlobalTrigger(TriggerId),
    LocalTrigger(StateId, TriggerId),
}

/// Stable address of a registered transition, valid for the machine's
/// lifetime because transition tables are append-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TransitionKey {
    slot: TransitionSlot,
    index: usize,
}

#[derive(Clone, Copy, Debug)]
struct PendingChange {
    target: StateId,
    cause: Option<TransitionKey>,
}

/// Hard cap on instant-exit hops within a single commit; a cycle of
/// ghost states stops here with a diagnostic instead of recursing
/// without bound.
const MAX_GHOST_HOPS: usize = 32;

/// One layer's complete bookkeeping and protocol. `StateMachine` owns one,
/// `LayeredStateMachine` owns a vector, `TriggeredStateMachine` owns one
/// with `polled` off (no arbitration, no ghost routing).
pub(crate) struct Layer {
    bundles: HashMap<StateId, StateBundle>,
    transitions_from_any: Vec<Transition>,
    trigger_transitions_from_any: HashMap<TriggerId, Vec<Transition>>,
    default_state: Option<StateId>,
    pending: Option<PendingChange>,
    active: Option<StateId>,
    polled: bool,
    bubble: bool,
    ghost_hops: usize,
    log: Option<LayerLog>,
}

impl Layer {
    pub fn new(polled: bool) -> Self {
        Self {
            bundles: HashMap::new(),
            transitions_from_any: Vec::new(),
            trigger_transitions_from_any: HashMap::new(),
            default_state: None,
            pending: None,
            active: None,
            polled,
            bubble: false,
            ghost_hops: 0,
            log: None,
        }
    }

    // --- registration ---------------------------------------------------

    pub fn add_state(&mut self, state: Box<dyn StateBehavior>) {
        let id = state.id();
        let bundle = self.bundles.entry(id).or_default();
        if bundle.state.is_some() {
            let err = StateMachineError::DuplicateState(id);
            tracing::warn!("{err}");
        }
        bundle.state = Some(state);
        if self.default_state.is_none() {
            self.default_state = Some(id);
        }
    }

    pub fn set_default_state(&mut self, id: StateId) {
        self.default_state = Some(id);
    }

    pub fn add_transition(&mut self, transition: Transition) {
        self.bundles
            .entry(transition.from())
            .or_default()
            .add_transition(transition);
    }

    pub fn add_transition_from_any(&mut self, transition: Transition) {
        self.transitions_from_any.push(transition);
    }

    pub fn add_trigger_transition(&mut self, trigger: TriggerId, transition: Transition) {
        self.bundles
            .entry(transition.from())
            .or_default()
            .add_trigger_transition(trigger, transition);
    }

    pub fn add_trigger_transition_from_any(&mut self, trigger: TriggerId, transition: Transition) {
        self.trigger_transitions_from_any
            .entry(trigger)
            .or_default()
            .push(transition);
    }

    // --- queries --------------------------------------------------------

    pub fn active(&self) -> Option<StateId> {
        self.active
    }

    pub fn default_state(&self) -> Option<StateId> {
        self.default_state
    }

    pub fn pending_target(&self) -> Option<StateId> {
        self.pending.map(|p| p.target)
    }

    pub fn has_state(&self, id: StateId) -> bool {
        self.bundles
            .get(&id)
            .map(|bundle| bundle.state.is_some())
            .unwrap_or(false)
    }

    pub fn state(&self, id: StateId) -> Option<&dyn StateBehavior> {
        self.bundles.get(&id)?.state.as_deref()
    }

    pub fn state_mut(&mut self, id: StateId) -> Option<&mut dyn StateBehavior> {
        self.bundles.get_mut(&id)?.state.as_deref_mut()
    }

    pub fn states_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn StateBehavior>> {
        self.bundles
            .values_mut()
            .filter_map(|bundle| bundle.state.as_mut())
    }

    pub fn set_log(&mut self, log: Option<LayerLog>) {
        self.log = log;
    }

    pub fn log(&self) -> Option<&LayerLog> {
        self.log.as_ref()
    }

    /// True once per grant seen since the last call; the owning machine
    /// forwards it to its parent context when nested.
    pub fn take_bubble(&mut self) -> bool {
        std::mem::take(&mut self.bubble)
    }

    // --- protocol -------------------------------------------------------

    /// Enter the default state and arm the from-any tables.
    pub fn enter(&mut self) -> Result<(), StateMachineError> {
        let start = self.default_state.ok_or(StateMachineError::NoDefaultState)?;
        if !self.has_state(start) {
            return Err(StateMachineError::StateNotFound(start));
        }
        self.change_state(start, None);
        for transition in &mut self.transitions_from_any {
            transition.on_enter();
        }
        for list in self.trigger_transitions_from_any.values_mut() {
            for transition in list {
                transition.on_enter();
            }
        }
        Ok(())
    }

    /// Leave the active state for good (the owning machine is being exited
    /// or torn down). Any in-flight negotiation dies here; signals raised
    /// by the exit hook are deliberately not applied.
    pub fn exit(&mut self, cause: Option<&Transition>) {
        if let Some(active) = self.active.take() {
            if let Some(mut state) = self.take_state(active) {
                if let Some(log) = &self.log {
                    log.log_exit(active.name());
                }
                let mut ctx = StateContext::new();
                state.on_exit(&mut ctx, cause);
                self.put_state(active, state);
            }
        }
        self.pending = None;
    }

    /// One polled tick: global arbitration, local arbitration only if the
    /// global pass requested nothing, then the active state's update.
    pub fn update(&mut self) {
        if !self.try_global_transitions() {
            self.try_direct_transitions();
        }
        self.update_active();
    }

    pub fn update_active(&mut self) {
        let Some(active) = self.active else {
            return;
        };
        let Some(mut state) = self.take_state(active) else {
            return;
        };
        let mut ctx = StateContext::new();
        state.on_update(&mut ctx);
        self.put_state(active, state);
        self.apply(ctx);
    }

    pub fn try_global_transitions(&mut self) -> bool {
        match self.determine_transition(TransitionSlot::Global) {
            Some((key, target)) => {
                self.request_state_change(target, false, Some(key));
                true
            }
            None => false,
        }
    }

    pub fn try_direct_transitions(&mut self) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        match self.determine_transition(TransitionSlot::Local(active)) {
            Some((key, target)) => {
                self.request_state_change(target, false, Some(key));
                true
            }
            None => false,
        }
    }

    /// Fire a trigger: the from-any table wins over the active state's
    /// table, and a hit in either suppresses the other.
    pub fn trigger(&mut self, trigger: TriggerId) -> bool {
        if let Some((key, target)) =
            self.determine_transition(TransitionSlot::GlobalTrigger(trigger))
        {
            self.request_state_change(target, false, Some(key));
            return true;
        }
        let Some(active) = self.active else {
            return false;
        };
        if let Some((key, target)) =
            self.determine_transition(TransitionSlot::LocalTrigger(active, trigger))
        {
            self.request_state_change(target, false, Some(key));
            return true;
        }
        false
    }

    pub fn request_state_change(
        &mut self,
        target: StateId,
        force: bool,
        cause: Option<TransitionKey>,
    ) {
        if force {
            self.change_state(target, cause);
            return;
        }
        self.pending = Some(PendingChange { target, cause });
        match self.active {
            Some(active) => self.run_exit_request(active),
            // Nothing to negotiate with; commit like the entry path does.
            None => self.state_can_exit(),
        }
    }

    /// Grant a pending exit. Idempotent when nothing is pending; always
    /// flags a bubble so a nested owner notifies its parent.
    pub fn state_can_exit(&mut self) {
        // Take the pending record out before committing it: the commit may
        // cascade into a ghost state that parks a new pending change, and
        // that one must survive this call.
        if let Some(pending) = self.pending.take() {
            self.change_state(pending.target, pending.cause);
        }
        self.bubble = true;
    }

    pub fn invoke_action(&mut self, action: ActionId, payload: &ActionPayload) {
        let Some(active) = self.active else {
            return;
        };
        let Some(mut state) = self.take_state(active) else {
            return;
        };
        let mut ctx = StateContext::new();
        state.on_action(&mut ctx, action, payload);
        self.put_state(active, state);
        self.apply(ctx);
    }

    /// Restore pre-entry bookkeeping while keeping the graph: active and
    /// pending records are cleared and every registered node is reset.
    /// Exit hooks deliberately do not fire.
    pub fn reset(&mut self) {
        self.active = None;
        self.pending = None;
        self.bubble = false;
        for state in self.states_mut() {
            state.reset();
        }
    }

    // --- internals ------------------------------------------------------

    fn take_state(&mut self, id: StateId) -> Option<Box<dyn StateBehavior>> {
        self.bundles.get_mut(&id)?.state.take()
    }

    fn put_state(&mut self, id: StateId, state: Box<dyn StateBehavior>) {
        if let Some(bundle) = self.bundles.get_mut(&id) {
            bundle.state = Some(state);
        }
    }

    fn run_exit_request(&mut self, id: StateId) {
        let Some(mut state) = self.take_state(id) else {
            return;
        };
        let mut ctx = StateContext::new();
        state.on_exit_request(&mut ctx);
        self.put_state(id, state);
        self.apply(ctx);
    }

    /// Drain a hook's mailbox: change request, then trigger, then grant.
    fn apply(&mut self, ctx: StateContext) {
        let StateContext {
            granted,
            request,
            fired,
            ..
        } = ctx;
        if let Some(ChangeRequest { target, force }) = request {
            self.request_state_change(target, force, None);
        }
        if let Some(trigger) = fired {
            self.trigger(trigger);
        }
        if granted {
            self.state_can_exit();
        }
    }

    /// Commit a change. The target is validated before anything fires, so
    /// an unknown id leaves the current state untouched.
    fn change_state(&mut self, target: StateId, cause: Option<TransitionKey>) {
        if !self.has_state(target) {
            let err = StateMachineError::StateNotFound(target);
            tracing::error!("{err}");
            return;
        }

        let mut exit_ctx = None;
        if let Some(old_id) = self.active {
            if let Some(mut old) = self.take_state(old_id) {
                if let Some(log) = &self.log {
                    log.log_exit(old_id.name());
                }
                let mut ctx = StateContext::new();
                match cause.and_then(|key| self.resolve(key)) {
                    Some(transition) => old.on_exit(&mut ctx, Some(transition)),
                    None => old.on_exit(&mut ctx, None),
                }
                self.put_state(old_id, old);
                exit_ctx = Some(ctx);
            }
        }

        // The causing edge's own exit hook fires at commit time.
        if let Some(key) = cause {
            if let Some(transition) = self.resolve_mut(key) {
                transition.on_exit();
            }
        }

        self.active = Some(target);
        let mut enter_ctx = None;
        if let Some(mut next) = self.take_state(target) {
            if let Some(log) = &self.log {
                log.log_enter(target.name());
            }
            let mut ctx = StateContext::new();
            next.on_enter(&mut ctx);
            self.put_state(target, next);
            enter_ctx = Some(ctx);
        }

        // Arm the new state's outgoing edges.
        if let Some(bundle) = self.bundles.get_mut(&target) {
            if let Some(transitions) = bundle.transitions.as_mut() {
                for transition in transitions {
                    transition.on_enter();
                }
            }
            if let Some(tables) = bundle.trigger_transitions.as_mut() {
                for list in tables.values_mut() {
                    for transition in list {
                        transition.on_enter();
                    }
                }
            }
        }

        // Ghost states route onward within the same commit.
        if self.polled && self.exits_instantly(target) {
            if self.ghost_hops < MAX_GHOST_HOPS {
                self.ghost_hops += 1;
                self.try_direct_transitions();
                self.ghost_hops -= 1;
            } else {
                tracing::warn!(
                    "instant-exit chain exceeded {MAX_GHOST_HOPS} hops at `{target}`; \
                     the ghost states likely form a cycle"
                );
            }
        }

        if let Some(ctx) = exit_ctx {
            self.apply(ctx);
        }
        if let Some(ctx) = enter_ctx {
            self.apply(ctx);
        }
    }

    fn exits_instantly(&self, id: StateId) -> bool {
        self.state(id)
            .map(|state| state.can_exit_instantly())
            .unwrap_or(false)
    }

    /// Registration-order scan: skip edges targeting the active state and
    /// ineligible guards; highest desire wins with strict greater-than
    /// against a best-so-far starting at zero, so ties keep the earliest
    /// registration and non-positive desires never win.
    fn determine_transition(&self, slot: TransitionSlot) -> Option<(TransitionKey, StateId)> {
        let active = self.active?;
        let list = self.transition_list(slot)?;
        let mut best_desire = 0;
        let mut winner = None;
        for (index, transition) in list.iter().enumerate() {
            if transition.to() == active {
                continue;
            }
            if !transition.should_transition() {
                continue;
            }
            if transition.desire() > best_desire {
                best_desire = transition.desire();
                winner = Some((TransitionKey { slot, index }, transition.to()));
            }
        }
        winner
    }

    fn transition_list(&self, slot: TransitionSlot) -> Option<&[Transition]> {
        match slot {
            TransitionSlot::Global => Some(&self.transitions_from_any),
            TransitionSlot::Local(state) => self.bundles.get(&state)?.transitions.as_deref(),
            TransitionSlot::GlobalTrigger(trigger) => self
                .trigger_transitions_from_any
                .get(&trigger)
                .map(|list| list.as_slice()),
            TransitionSlot::LocalTrigger(state, trigger) => self
                .bundles
                .get(&state)?
                .trigger_transitions
                .as_ref()?
                .get(&trigger)
                .map(|list| list.as_slice()),
        }
    }

    fn resolve(&self, key: TransitionKey) -> Option<&Transition> {
        self.transition_list(key.slot)?.get(key.index)
    }

    fn resolve_mut(&mut self, key: TransitionKey) -> Option<&mut Transition> {
        let list = match key.slot {
            TransitionSlot::Global => &mut self.transitions_from_any,
            TransitionSlot::Local(state) => {
                self.bundles.get_mut(&state)?.transitions.as_mut()?
            }
            TransitionSlot::GlobalTrigger(trigger) => {
                self.trigger_transitions_from_any.get_mut(&trigger)?
            }
            TransitionSlot::LocalTrigger(state, trigger) => self
                .bundles
                .get_mut(&state)?
                .trigger_transitions
                .as_mut()?
                .get_mut(&trigger)?,
        };
        list.get_mut(key.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::State;

    #[test]
    fn bundle_tables_stay_absent_until_used() {
        let mut layer = Layer::new(true);
        layer.add_state(Box::new(State::new("Idle")));

        let bundle = layer.bundles.get(&StateId::of("Idle")).unwrap();
        assert!(bundle.transitions.is_none());
        assert!(bundle.trigger_transitions.is_none());

        layer.add_transition(Transition::new("Idle", "Run", 1));
        let bundle = layer.bundles.get(&StateId::of("Idle")).unwrap();
        assert_eq!(bundle.transitions.as_ref().unwrap().len(), 1);
        assert!(bundle.trigger_transitions.is_none());
    }

    #[test]
    fn transition_to_an_unregistered_state_creates_an_empty_bundle() {
        let mut layer = Layer::new(true);
        layer.add_transition(Transition::new("Ghost", "Nowhere", 1));

        assert!(layer.bundles.contains_key(&StateId::of("Ghost")));
        assert!(!layer.has_state(StateId::of("Ghost")));
    }

    #[test]
    fn first_registered_state_becomes_the_default() {
        let mut layer = Layer::new(true);
        layer.add_state(Box::new(State::new("First")));
        layer.add_state(Box::new(State::new("Second")));
        assert_eq!(layer.default_state(), Some(StateId::of("First")));

        layer.set_default_state(StateId::of("Second"));
        assert_eq!(layer.default_state(), Some(StateId::of("Second")));
    }

    #[test]
    fn duplicate_registration_replaces_the_node() {
        let mut layer = Layer::new(true);
        layer.add_state(Box::new(State::new("Idle")));
        layer.add_state(Box::new(State::ghost("Idle")));

        let state = layer.state(StateId::of("Idle")).unwrap();
        assert!(state.can_exit_instantly());
    }

    #[test]
    fn entering_without_a_default_fails() {
        let mut layer = Layer::new(true);
        assert_eq!(layer.enter(), Err(StateMachineError::NoDefaultState));
    }

    #[test]
    fn entering_an_unregistered_default_fails() {
        let mut layer = Layer::new(true);
        layer.set_default_state(StateId::of("Missing"));
        assert_eq!(
            layer.enter(),
            Err(StateMachineError::StateNotFound(StateId::of("Missing")))
        );
    }

    #[test]
    fn arbitration_needs_an_active_state() {
        let mut layer = Layer::new(true);
        layer.add_state(Box::new(State::new("Idle")));
        layer.add_transition_from_any(Transition::new("", "Idle", 5));
        assert!(layer.determine_transition(TransitionSlot::Global).is_none());
    }
}
