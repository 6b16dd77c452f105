//! Triggered Door
//!
//! An event-driven door that never polls: every change comes from a
//! named trigger, and actions reach whichever state is active.
//!
//! Key concepts:
//! - TriggeredStateMachine (no per-tick arbitration)
//! - Two-way trigger transitions sharing one registration
//! - Typed action payloads
//!
//! Run with: cargo run --example door

use stateflow::{PayloadKind, State, Transition, TriggeredStateMachine};

fn main() {
    tracing_subscriber::fmt().init();

    println!("=== Triggered Door ===\n");

    let mut door = TriggeredStateMachine::new("door");

    door.add_state(
        State::new("Closed")
            .on_entered(|_| println!("  [Closed] the door clicks shut"))
            .with_action("Knock", |_| println!("  [Closed] knock knock, footsteps approach")),
    );
    door.add_state(
        State::new("Open")
            .on_entered(|_| println!("  [Open] daylight floods in"))
            .with_data_action("Announce", PayloadKind::Text, |payload, _| {
                println!("  [Open] a voice calls out: {payload:?}");
            }),
    );
    door.add_state(
        State::new("Locked")
            .on_entered(|_| println!("  [Locked] the bolt slides home"))
            .with_action("Knock", |_| println!("  [Locked] knock knock, nobody answers")),
    );

    door.add_two_way_trigger_transition("Toggle", Transition::new("Closed", "Open", 1));
    door.add_trigger_transition("Lock", Transition::new("Closed", "Locked", 1));
    door.add_trigger_transition("Unlock", Transition::new("Locked", "Closed", 1));

    door.init().unwrap();

    println!("\n-- toggling the door open --");
    door.trigger("Toggle");
    door.invoke_action_with("Announce", "anyone home?");

    println!("\n-- toggling it closed and locking it --");
    door.trigger("Toggle");
    door.trigger("Lock");
    door.invoke_action("Knock");

    println!("\n-- a locked door ignores the toggle --");
    if !door.trigger("Toggle") {
        println!("  the door does not budge");
    }

    println!("\n-- unlocking and opening again --");
    door.trigger("Unlock");
    door.trigger("Toggle");

    println!("\nFinal state: {}", door.active_state_name().unwrap_or("-"));
    println!("\n=== Example Complete ===");
}
