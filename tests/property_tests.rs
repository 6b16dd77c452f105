//! Property-based tests for arbitration and negotiation.
//!
//! These tests use proptest to verify protocol invariants hold across
//! many randomly generated graphs and drive sequences.

use proptest::prelude::*;
use stateflow::{LayeredStateMachine, State, StateMachine, Transition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One external poke at a machine.
#[derive(Clone, Debug)]
enum Drive {
    Update,
    Trigger(&'static str),
    Request(&'static str, bool),
    Grant,
}

prop_compose! {
    fn arbitrary_drive()(selector in 0..8u8, force in any::<bool>()) -> Drive {
        match selector {
            0 | 1 | 2 => Drive::Update,
            3 => Drive::Trigger("Alarm"),
            4 => Drive::Trigger("Nothing"),
            5 => Drive::Request("S2", force),
            6 => Drive::Request("Missing", force),
            _ => Drive::Grant,
        }
    }
}

/// Small graph with a transient entry state, a two-way edge, a deferring
/// state, and a from-any trigger escape.
fn mesh() -> StateMachine {
    let mut machine = StateMachine::new("mesh");
    machine.add_state(State::new("S0"));
    machine.add_state(State::new("S1"));
    machine.add_state(State::new("S2").on_exit_requested(|_| {}));
    machine.add_state(State::new("S3"));
    machine.add_transition(Transition::new("S0", "S1", 1));
    machine.add_two_way_transition(Transition::new("S1", "S2", 1));
    machine.add_trigger_transition_from_any("Alarm", Transition::new("", "S3", 5));
    machine.add_transition(Transition::new("S3", "S0", 1));
    machine
}

fn apply(machine: &mut StateMachine, op: &Drive) {
    match op {
        Drive::Update => machine.update(),
        Drive::Trigger(name) => {
            machine.trigger(*name);
        }
        Drive::Request(target, force) => machine.request_state_change(*target, *force),
        Drive::Grant => machine.state_can_exit(),
    }
}

proptest! {
    #[test]
    fn arbitration_picks_the_first_highest_positive_desire(
        desires in prop::collection::vec(-3..12i32, 1..8)
    ) {
        let mut machine = StateMachine::new("arb");
        machine.add_state(State::new("Hub"));
        for index in 0..desires.len() {
            machine.add_state(State::new(format!("T{index}")));
        }
        for (index, desire) in desires.iter().enumerate() {
            machine.add_transition(Transition::new("Hub", format!("T{index}"), *desire));
        }
        machine.set_default_state("Hub");
        machine.init().unwrap();
        machine.update();

        let mut best = 0;
        let mut expected = None;
        for (index, desire) in desires.iter().enumerate() {
            if *desire > best {
                best = *desire;
                expected = Some(format!("T{index}"));
            }
        }
        match expected {
            Some(name) => prop_assert_eq!(machine.active_state_name(), Some(name.as_str())),
            None => prop_assert_eq!(machine.active_state_name(), Some("Hub")),
        }
    }

    #[test]
    fn self_transitions_are_never_selected(
        desires in prop::collection::vec(1..50i32, 1..6)
    ) {
        let mut machine = StateMachine::new("selfish");
        machine.add_state(State::new("Hub"));
        for desire in &desires {
            machine.add_transition(Transition::new("Hub", "Hub", *desire));
        }
        machine.init().unwrap();

        machine.update();
        machine.update();
        prop_assert_eq!(machine.active_state_name(), Some("Hub"));
    }

    #[test]
    fn from_any_outcome_beats_any_local_desire(
        local_desire in 1..50i32,
        global_desire in 1..50i32,
    ) {
        let mut machine = StateMachine::new("prio");
        machine.add_state(State::new("Start"));
        machine.add_state(State::new("Local"));
        machine.add_state(State::new("Global"));
        machine.add_transition(Transition::new("Start", "Local", local_desire));
        machine.add_transition_from_any(Transition::new("", "Global", global_desire));
        machine.init().unwrap();

        machine.update();
        prop_assert_eq!(machine.active_state_name(), Some("Global"));
    }

    #[test]
    fn two_way_guard_is_complementary(
        toggles in prop::collection::vec(any::<bool>(), 1..20)
    ) {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = Arc::clone(&flag);

        let mut machine = StateMachine::new("door");
        machine.add_state(State::new("A"));
        machine.add_state(State::new("B"));
        machine.add_two_way_transition(
            Transition::new("A", "B", 1).when(move |_| guard.load(Ordering::Relaxed)),
        );
        machine.init().unwrap();

        for value in toggles {
            flag.store(value, Ordering::Relaxed);
            machine.update();
            let expected = if value { "B" } else { "A" };
            prop_assert_eq!(machine.active_state_name(), Some(expected));
        }
    }

    #[test]
    fn driven_machine_stays_on_registered_states(
        ops in prop::collection::vec(arbitrary_drive(), 1..40)
    ) {
        let mut machine = mesh();
        machine.init().unwrap();

        for op in &ops {
            apply(&mut machine, op);
            let active = machine.active_state_name();
            prop_assert!(matches!(active, Some("S0" | "S1" | "S2" | "S3")));
        }
    }

    #[test]
    fn reset_then_init_restores_the_entry_state(
        ops in prop::collection::vec(arbitrary_drive(), 0..30)
    ) {
        let mut machine = mesh();
        machine.init().unwrap();
        for op in &ops {
            apply(&mut machine, op);
        }

        machine.reset();
        prop_assert_eq!(machine.active_state_id(), None);

        machine.init().unwrap();
        prop_assert_eq!(machine.active_state_name(), Some("S0"));
    }

    #[test]
    fn unknown_triggers_never_move_the_machine(
        names in prop::collection::vec("[a-z]{1,6}", 1..8)
    ) {
        let mut machine = StateMachine::new("quiet");
        machine.add_state(State::new("Idle"));
        machine.init().unwrap();

        for name in &names {
            machine.trigger(name.as_str());
        }
        prop_assert_eq!(machine.active_state_name(), Some("Idle"));
    }

    #[test]
    fn redundant_grants_are_idempotent(grants in 1..10usize) {
        let mut machine = StateMachine::new("calm");
        machine.add_state(State::new("Idle"));
        machine.init().unwrap();

        for _ in 0..grants {
            machine.state_can_exit();
        }
        prop_assert_eq!(machine.active_state_name(), Some("Idle"));
    }

    #[test]
    fn unaddressed_layers_never_move(
        ops in prop::collection::vec(arbitrary_drive(), 1..25)
    ) {
        let mut machine = LayeredStateMachine::new("split");
        machine.add_state(State::new("S0"), 0);
        machine.add_state(State::new("S2"), 0);
        machine.add_state(State::new("Still"), 1);
        machine.add_state(State::new("Other"), 1);
        machine.add_transition(Transition::new("S0", "S2", 1), 0);
        machine.init().unwrap();

        for op in &ops {
            match op {
                Drive::Update => machine.update(),
                Drive::Trigger(name) => {
                    machine.trigger(*name, 0);
                }
                Drive::Request(target, force) => {
                    machine.request_state_change_in(0, *target, *force)
                }
                Drive::Grant => machine.state_can_exit(),
            }
            prop_assert_eq!(machine.active_state_id(1).map(|id| id.name()), Some("Still"));
        }
    }
}
