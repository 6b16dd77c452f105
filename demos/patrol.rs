//! Sentry Patrol with Negotiated Exits
//!
//! A patrolling sentry that refuses to abandon a leg of its route
//! mid-stride: when the alarm sounds, the high-priority from-any
//! transition asks for a change, and the marching state finishes the
//! current leg before granting it.
//!
//! Key concepts:
//! - Priority arbitration with a from-any alarm transition
//! - Two-phase exit negotiation (request now, grant later)
//! - Trace capture with StateLogger
//!
//! Run with: cargo run --example patrol

use stateflow::{State, StateLogger, StateMachine, Transition};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt().init();

    println!("=== Sentry Patrol ===\n");

    let alarm = Arc::new(AtomicBool::new(false));
    let steps = Arc::new(AtomicU32::new(0));
    let leaving = Arc::new(AtomicBool::new(false));

    let mut sentry = StateMachine::new("sentry");

    let march_steps = Arc::clone(&steps);
    let march_grant = Arc::clone(&leaving);
    let march_asked = Arc::clone(&leaving);
    sentry.add_state(
        State::new("March")
            .on_entered(|_| println!("  [March] back on the route"))
            .on_updated(move |ctx| {
                let count = march_steps.fetch_add(1, Ordering::Relaxed) + 1;
                println!("  [March] step {count}");
                if march_grant.load(Ordering::Relaxed) && count % 4 == 0 {
                    println!("  [March] leg finished, handing over");
                    march_grant.store(false, Ordering::Relaxed);
                    ctx.state_can_exit();
                }
            })
            .on_exit_requested(move |_| {
                if !march_asked.swap(true, Ordering::Relaxed) {
                    println!("  [March] asked to leave mid-leg, finishing it first");
                }
            }),
    );

    sentry.add_state(
        State::new("Chase")
            .on_entered(|_| println!("  [Chase] pursuing the intruder!"))
            .on_updated(|_| println!("  [Chase] still chasing")),
    );

    let alarm_guard = Arc::clone(&alarm);
    sentry.add_transition_from_any(
        Transition::new("", "Chase", 10).when(move |_| alarm_guard.load(Ordering::Relaxed)),
    );
    let calm_guard = Arc::clone(&alarm);
    sentry.add_transition(
        Transition::new("Chase", "March", 1).when(move |_| !calm_guard.load(Ordering::Relaxed)),
    );

    let logger = StateLogger::new();
    sentry.attach_logger(&logger);
    sentry.init().unwrap();

    for tick in 1..=10 {
        if tick == 3 {
            println!("\n!! alarm raised !!");
            alarm.store(true, Ordering::Relaxed);
        }
        if tick == 7 {
            println!("\n-- all clear --");
            alarm.store(false, Ordering::Relaxed);
        }
        println!("tick {tick}:");
        sentry.update();
        println!("  active: {}", sentry.active_state_name().unwrap_or("-"));
    }

    println!("\nCaptured trace:");
    for event in logger.events() {
        println!("  depth {} {:?} {}", event.depth, event.kind, event.state);
    }

    println!("\n=== Example Complete ===");
}
