//! Lost updates on a shared inventory counter.
//!
//! Run with: cargo run --bin race_condition

use colored::Colorize;
use thread_hazards::counter::{run_inventory, SharedCounter, UpdatePolicy};
use thread_hazards::logging::init_tracing;
use thread_hazards::HarnessConfig;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");
    let config = HarnessConfig::load()?;
    let iterations = config.counter.iterations;

    println!("=== Inventory Counter: {iterations} increments vs {iterations} decrements ===\n");
    for policy in UpdatePolicy::ALL {
        for trial in 1..=config.counter.trials {
            let counter = SharedCounter::new(policy);
            let items = run_inventory(&counter, iterations)?;
            let line = format!("{policy:?} #{trial}: We currently have {items}");
            if items == 0 {
                println!("{}", line.green());
            } else {
                println!("{}", line.red());
            }
        }
        println!();
    }

    println!("=== Key Points ===");
    println!("1. items++ is a read, an add and a write; another thread can run in between");
    println!("2. A Mutex serialises the whole read-modify-write");
    println!("3. fetch_add does the same in one atomic instruction");
    Ok(())
}
