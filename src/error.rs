//! Error taxonomy for machine construction and the runtime protocol.

use crate::core::action::PayloadKind;
use crate::core::ident::{ActionId, StateId};
use thiserror::Error;

/// Everything that can go wrong while assembling or driving a machine.
///
/// Construction and entry paths (`init`) surface these as `Result`s.
/// Runtime protocol paths never panic: faults are reported through
/// `tracing` and the machine continues in a degraded but consistent
/// state — an unknown target aborts the change with the previous state
/// intact, a mismatched action payload is dropped, an uninitialized
/// machine skips its tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    /// The machine was driven before it entered its default state.
    #[error("state machine is not initialized; call init() after registering states")]
    NotInitialized,

    /// Entry was attempted with no default state to enter.
    #[error("no default state configured; register a state or call set_default_state() first")]
    NoDefaultState,

    /// An operation referenced a state id with no registered state.
    #[error("state `{0}` is not registered in this machine; check for typos and make sure the state was added")]
    StateNotFound(StateId),

    /// A state was registered under an id that already has one.
    #[error("state `{0}` is already registered; the previous definition was replaced")]
    DuplicateState(StateId),

    /// A layered operation addressed a layer that does not exist.
    #[error("layer {0} does not exist in this machine")]
    LayerNotFound(usize),

    /// An action was invoked with a payload of the wrong shape.
    #[error("action `{action}` expects a {expected} payload but was invoked with {found}")]
    ActionTypeMismatch {
        action: ActionId,
        expected: PayloadKind,
        found: PayloadKind,
    },
}
