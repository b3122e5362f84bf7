//! Two trains, two roads, and the order the roads are locked in.
//!
//! Run with: cargo run --bin deadlock
//! Set `order = "consistent"` under `[intersection]` in the config file to fix it.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use thread_hazards::intersection::{run_trains, CrossingEvent, Intersection, LockOrder, TrafficPlan};
use thread_hazards::logging::init_tracing;
use thread_hazards::{HarnessConfig, HarnessError};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");
    let config = HarnessConfig::load()?.intersection;

    println!("=== Intersection with {:?} lock order ===\n", config.order);
    let intersection = Intersection::new(config.order)
        .with_crossing_time(Duration::from_millis(config.crossing_ms))
        .with_approach_time(Duration::from_millis(config.approach_ms))
        .with_observer(Arc::new(|event: &CrossingEvent| println!("{event:?}")));
    let plan = TrafficPlan {
        rounds: config.rounds,
        jitter: Duration::from_millis(config.jitter_ms),
        timeout: config.timeout(),
    };

    match run_trains(Arc::new(intersection), plan) {
        Ok(report) => println!(
            "\n{}",
            format!("{} crossings in {:?}", report.crossings, report.elapsed).green()
        ),
        Err(HarnessError::Deadlock { waited }) => {
            println!("\n{}", format!("Deadlock: no train moved for {waited:?}").red());
            if config.order == LockOrder::Inverted {
                println!("Train B locks road B first while train A holds road A.");
            }
            // The deadlocked trains can never finish; end the process explicitly.
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    }

    println!("\n=== Key Points ===");
    println!("1. Deadlock needs a cycle: each train holds what the other wants");
    println!("2. Locking resources in one global order makes a cycle impossible");
    Ok(())
}
