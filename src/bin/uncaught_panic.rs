//! A job that panics on a named pool thread.
//!
//! Run with: cargo run --bin uncaught_panic

use std::thread;

use colored::Colorize;
use thread_hazards::logging::init_tracing;
use thread_hazards::WorkerPool;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");

    println!("=== Handling a panic in a worker thread ===\n");
    let pool = WorkerPool::builder(1)
        .name_prefix("Test Thread")
        .on_failure(|failure| {
            let line = format!(
                "A critical error happened in thread {} the error is {}",
                failure.worker, failure.message
            );
            println!("{}", line.red());
        })
        .build()?;

    pool.submit(|| {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        println!("This thread's name is {name}");
        panic!("Occurred RuntimeException !!");
    })?;
    pool.submit(|| println!("{}", "The same worker keeps serving jobs".green()))?;
    pool.shutdown();

    println!("\n=== Key Points ===");
    println!("1. catch_unwind stops a panic at the worker boundary");
    println!("2. The failure handler plays the role of an uncaught exception handler");
    Ok(())
}
