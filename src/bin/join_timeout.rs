//! Waiting for factorials, but not forever.
//!
//! Run with: cargo run --bin join_timeout

use colored::Colorize;
use thread_hazards::computation::{join_all_with_timeout, FactorialResult};
use thread_hazards::logging::init_tracing;
use thread_hazards::HarnessConfig;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");
    let config = HarnessConfig::load()?.join;

    println!("=== Factorials joined with a {:?} timeout ===\n", config.timeout());
    for report in join_all_with_timeout(&config.inputs, config.timeout())? {
        match report.result {
            FactorialResult::Finished(value) => {
                println!("{}", format!("Factorial of {} is {value} (mod p)", report.input).green());
            }
            FactorialResult::InProgress => {
                println!("{}", format!("The Calculation for {} is still in progress", report.input).yellow());
            }
        }
    }

    println!("\n=== Key Points ===");
    println!("1. A timed join lets the caller move on without the result");
    println!("2. Unfinished tasks are cancelled, not abandoned as daemon threads");
    Ok(())
}
