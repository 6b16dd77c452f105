//! Layered Character HUD
//!
//! Three independent layers sharing one tick: the health readout, the
//! HUD visibility, and an alert banner. Each layer keeps its own active
//! state, defaults, and transitions; nothing crosses layers.
//!
//! Key concepts:
//! - LayeredStateMachine with per-layer registration
//! - Guarded transitions reading shared game data
//! - Per-layer triggers
//!
//! Run with: cargo run --example layered_hud

use stateflow::{LayeredStateMachine, State, Transition};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

const HEALTH: usize = 0;
const VISIBILITY: usize = 1;
const ALERT: usize = 2;

fn main() {
    tracing_subscriber::fmt().init();

    println!("=== Layered Character HUD ===\n");

    let hp = Arc::new(AtomicI32::new(100));

    let mut hud = LayeredStateMachine::new("hud");

    // Layer 0: health readout.
    hud.add_state(State::new("Healthy"), HEALTH);
    hud.add_state(State::new("Wounded"), HEALTH);
    hud.add_state(State::new("Critical"), HEALTH);
    let g = Arc::clone(&hp);
    hud.add_transition(
        Transition::new("Healthy", "Wounded", 1).when(move |_| g.load(Ordering::Relaxed) < 60),
        HEALTH,
    );
    let g = Arc::clone(&hp);
    hud.add_transition(
        Transition::new("Wounded", "Healthy", 1).when(move |_| g.load(Ordering::Relaxed) >= 60),
        HEALTH,
    );
    let g = Arc::clone(&hp);
    hud.add_transition(
        Transition::new("Wounded", "Critical", 2).when(move |_| g.load(Ordering::Relaxed) < 25),
        HEALTH,
    );
    let g = Arc::clone(&hp);
    hud.add_transition(
        Transition::new("Critical", "Wounded", 1).when(move |_| g.load(Ordering::Relaxed) >= 25),
        HEALTH,
    );

    // Layer 1: visibility, toggled by an external keybind.
    hud.add_state(State::new("Shown"), VISIBILITY);
    hud.add_state(State::new("Hidden"), VISIBILITY);
    hud.add_two_way_trigger_transition("Toggle", Transition::new("Shown", "Hidden", 1), VISIBILITY);

    // Layer 2: alert banner, driven by the same health value.
    hud.add_state(State::new("Calm"), ALERT);
    hud.add_state(State::new("Flashing"), ALERT);
    let g = Arc::clone(&hp);
    hud.add_transition_from_any(
        Transition::new("", "Flashing", 5).when(move |_| g.load(Ordering::Relaxed) < 25),
        ALERT,
    );
    let g = Arc::clone(&hp);
    hud.add_transition(
        Transition::new("Flashing", "Calm", 1).when(move |_| g.load(Ordering::Relaxed) >= 25),
        ALERT,
    );

    hud.init().unwrap();

    let script: [(i32, Option<&str>); 6] = [
        (100, None),
        (70, None),
        (45, Some("player took a hit")),
        (18, Some("player is nearly down")),
        (18, None),
        (80, Some("potion quaffed")),
    ];

    for (tick, (health, note)) in script.iter().enumerate() {
        hp.store(*health, Ordering::Relaxed);
        if let Some(note) = note {
            println!("-- {note} --");
        }
        if tick == 4 {
            println!("-- player presses the HUD keybind --");
            hud.trigger("Toggle", VISIBILITY);
        }
        hud.update();
        println!("tick {tick} (hp {health:>3}): {}", describe(&hud));
    }

    println!("\n=== Example Complete ===");
}

fn describe(hud: &LayeredStateMachine) -> String {
    hud.active_state_ids()
        .into_iter()
        .map(|id| id.map(|id| id.name()).unwrap_or("-"))
        .collect::<Vec<_>>()
        .join(" | ")
}
