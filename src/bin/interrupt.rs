//! Stopping a sleeping thread and a busy one.
//!
//! Run with: cargo run --bin interrupt

use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use thread_hazards::computation::{BlockingTask, PowerTask};
use thread_hazards::logging::init_tracing;
use thread_hazards::task::spawn_task;
use thread_hazards::TaskOutcome;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");

    println!("=== Interrupting a blocking wait ===\n");
    let blocking = spawn_task("blocking-task", BlockingTask::new(Duration::from_secs(500)))?;
    let requested = Instant::now();
    blocking.cancel();
    if blocking.join()?.is_cancelled() {
        println!("{}", format!("Exiting blocking thread after {:?}", requested.elapsed()).green());
    }

    println!("\n=== Interrupting a long computation ===\n");
    let (base, power) = (200_000, 300_000_000);
    let computation = spawn_task("long-computation", PowerTask::new(base, power))?;
    thread::sleep(Duration::from_millis(100));
    computation.cancel();
    match computation.join()? {
        TaskOutcome::Completed(result) => println!("{base}^{power} mod p = {result}"),
        TaskOutcome::Cancelled(sentinel) => {
            println!("{}", format!("Prematurely interrupted computation (result {sentinel})").yellow());
        }
    }

    println!("\n=== Key Points ===");
    println!("1. Rust has no way to kill a thread from outside");
    println!("2. A sleeping task is woken by the token's condvar");
    println!("3. A busy task has to check the token itself");
    Ok(())
}
