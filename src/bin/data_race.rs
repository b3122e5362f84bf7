//! Two fields updated in order, observed out of order.
//!
//! Run with: cargo run --bin data_race

use colored::Colorize;
use thread_hazards::counter::{run_race_check, MemoryOrdering, RacePair};
use thread_hazards::logging::init_tracing;

const ITERATIONS: u64 = 50_000_000;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");

    println!("=== Data Race: x++ then y++, reader checks y > x ===\n");
    for ordering in [MemoryOrdering::Relaxed, MemoryOrdering::SeqCst] {
        let pair = RacePair::new(ordering);
        let report = run_race_check(&pair, ITERATIONS)?;
        let line = format!(
            "{ordering:?}: {} checks, y > x detected {} times",
            report.checks, report.detections
        );
        if report.detections == 0 {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
        }
    }

    println!("\n=== Key Points ===");
    println!("1. Relaxed accesses may be reordered by the compiler or a weakly ordered CPU");
    println!("2. x86 rarely shows it; ARM can");
    println!("3. SeqCst gives every thread the same order of x and y updates");
    Ok(())
}
