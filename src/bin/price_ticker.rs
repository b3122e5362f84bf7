//! A console price board fed by a background updater.
//!
//! Run with: cargo run --bin price_ticker

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use thread_hazards::logging::init_tracing;
use thread_hazards::prices::{PriceUpdater, PricesContainer};
use thread_hazards::task::spawn_task;

const RUN_FOR: Duration = Duration::from_secs(10);
const FRAME: Duration = Duration::from_millis(250);

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");

    println!("=== Cryptocurrency Prices ===\n");
    let container = Arc::new(PricesContainer::new());
    let updater = spawn_task("price-updater", PriceUpdater::new(Arc::clone(&container)))?;

    let started = Instant::now();
    let mut shown = u64::MAX;
    while started.elapsed() < RUN_FOR {
        match container.try_snapshot() {
            Some(prices) if container.updates() != shown => {
                shown = container.updates();
                let board: Vec<String> = prices
                    .entries()
                    .iter()
                    .map(|(symbol, price)| format!("{} {price:>10.2}", symbol.blue()))
                    .collect();
                println!("{}", board.join("  "));
            }
            Some(_) => {}
            None => println!("{}", "(update in progress, frame skipped)".dimmed()),
        }
        thread::sleep(FRAME);
    }

    updater.cancel();
    updater.join()?;
    Ok(())
}
