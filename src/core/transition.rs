//! Prioritized, guarded edges between states.

use super::ident::StateId;
use std::fmt;
use std::sync::Arc;

type Guard = Arc<dyn Fn(&Transition) -> bool + Send + Sync>;
type EdgeHook = Box<dyn FnMut() + Send>;

/// A directed edge between two states with an arbitration priority.
///
/// Transitions are registered on a machine and polled during its update
/// (or fired by a trigger). A transition with no guard is always eligible;
/// a guarded one is eligible while the guard answers `true`. The `desire`
/// value decides arbitration between simultaneously eligible edges —
/// higher wins, and values of zero or below are never selected.
///
/// # Example
///
/// ```rust
/// use stateflow::Transition;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let ready = Arc::new(AtomicBool::new(false));
/// let watch = Arc::clone(&ready);
///
/// let t = Transition::new("Idle", "Run", 1).when(move |_| watch.load(Ordering::Relaxed));
/// assert!(!t.should_transition());
///
/// ready.store(true, Ordering::Relaxed);
/// assert!(t.should_transition());
/// ```
pub struct Transition {
    from: StateId,
    to: StateId,
    desire: i32,
    condition: Option<Guard>,
    inverse: bool,
    entered: Option<EdgeHook>,
    exited: Option<EdgeHook>,
}

impl Transition {
    /// Create an unguarded transition from `from` to `to` with the given
    /// arbitration priority.
    pub fn new(from: impl Into<StateId>, to: impl Into<StateId>, desire: i32) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            desire,
            condition: None,
            inverse: false,
            entered: None,
            exited: None,
        }
    }

    /// Attach a guard. The transition is only eligible while the guard
    /// answers `true` (or `false`, for a reversed edge).
    pub fn when(mut self, guard: impl Fn(&Transition) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(guard));
        self
    }

    /// Run `hook` whenever the source state of this transition becomes
    /// active. Useful for snapshotting values the guard will compare
    /// against.
    pub fn on_entered(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.entered = Some(Box::new(hook));
        self
    }

    /// Run `hook` when this transition causes a committed state change.
    pub fn on_exited(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.exited = Some(Box::new(hook));
        self
    }

    /// Source state.
    pub fn from(&self) -> StateId {
        self.from
    }

    /// Target state.
    pub fn to(&self) -> StateId {
        self.to
    }

    /// Arbitration priority.
    pub fn desire(&self) -> i32 {
        self.desire
    }

    /// Whether this edge interprets its guard negated.
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    /// Whether the transition is currently eligible.
    pub fn should_transition(&self) -> bool {
        match &self.condition {
            None => true,
            Some(guard) => {
                let answer = guard(self);
                if self.inverse {
                    !answer
                } else {
                    answer
                }
            }
        }
    }

    /// The mirrored edge: endpoints swapped, same desire, sharing this
    /// transition's guard with the opposite interpretation. Entry and exit
    /// hooks are not carried over.
    pub fn reverse(&self) -> Transition {
        Transition {
            from: self.to,
            to: self.from,
            desire: self.desire,
            condition: self.condition.clone(),
            inverse: !self.inverse,
            entered: None,
            exited: None,
        }
    }

    /// Invoked by the owning machine when the source state becomes active.
    pub fn on_enter(&mut self) {
        if let Some(hook) = self.entered.as_mut() {
            hook();
        }
    }

    /// Invoked by the owning machine when this transition causes a commit.
    pub fn on_exit(&mut self) {
        if let Some(hook) = self.exited.as_mut() {
            hook();
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("desire", &self.desire)
            .field("guarded", &self.condition.is_some())
            .field("inverse", &self.inverse)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn unguarded_transition_is_always_eligible() {
        let t = Transition::new("A", "B", 1);
        assert!(t.should_transition());
        assert!(t.reverse().should_transition());
    }

    #[test]
    fn guard_controls_eligibility() {
        let open = Arc::new(AtomicBool::new(false));
        let watch = Arc::clone(&open);
        let t = Transition::new("Closed", "Open", 1).when(move |_| watch.load(Ordering::Relaxed));

        assert!(!t.should_transition());
        open.store(true, Ordering::Relaxed);
        assert!(t.should_transition());
    }

    #[test]
    fn reverse_swaps_endpoints_and_negates_the_shared_guard() {
        let open = Arc::new(AtomicBool::new(true));
        let watch = Arc::clone(&open);
        let forward =
            Transition::new("Closed", "Open", 2).when(move |_| watch.load(Ordering::Relaxed));
        let backward = forward.reverse();

        assert_eq!(backward.from(), StateId::of("Open"));
        assert_eq!(backward.to(), StateId::of("Closed"));
        assert_eq!(backward.desire(), 2);
        assert!(backward.is_inverse());

        // Exactly one direction is eligible for any guard answer.
        assert!(forward.should_transition());
        assert!(!backward.should_transition());

        open.store(false, Ordering::Relaxed);
        assert!(!forward.should_transition());
        assert!(backward.should_transition());
    }

    #[test]
    fn double_reverse_restores_the_original_reading() {
        let t = Transition::new("A", "B", 1).when(|_| true);
        let back = t.reverse().reverse();
        assert_eq!(back.from(), t.from());
        assert_eq!(back.to(), t.to());
        assert!(!back.is_inverse());
        assert!(back.should_transition());
    }

    #[test]
    fn guard_sees_the_transition_it_guards() {
        let t = Transition::new("A", "B", 3).when(|t| t.desire() > 2);
        assert!(t.should_transition());

        let t = Transition::new("A", "B", 1).when(|t| t.desire() > 2);
        assert!(!t.should_transition());
    }

    #[test]
    fn edge_hooks_fire_when_invoked() {
        let entered = Arc::new(AtomicUsize::new(0));
        let exited = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&entered);
        let x = Arc::clone(&exited);

        let mut t = Transition::new("A", "B", 1)
            .on_entered(move || {
                e.fetch_add(1, Ordering::Relaxed);
            })
            .on_exited(move || {
                x.fetch_add(1, Ordering::Relaxed);
            });

        t.on_enter();
        t.on_enter();
        t.on_exit();

        assert_eq!(entered.load(Ordering::Relaxed), 2);
        assert_eq!(exited.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn reverse_does_not_carry_edge_hooks() {
        let entered = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&entered);
        let t = Transition::new("A", "B", 1).on_entered(move || {
            e.fetch_add(1, Ordering::Relaxed);
        });

        let mut back = t.reverse();
        back.on_enter();
        assert_eq!(entered.load(Ordering::Relaxed), 0);
    }
}
