//! Hackers against the clock.
//!
//! Run with: cargo run --bin vault_heist

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use thread_hazards::logging::init_tracing;
use thread_hazards::vault::{run_heist, HeistOutcome, HeistPlan, Vault};
use thread_hazards::HarnessConfig;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");
    let config = HarnessConfig::load()?.vault;

    println!("=== Vault Heist ===\n");
    let vault = Arc::new(Vault::with_random_password(
        config.max_password,
        Duration::from_millis(config.check_delay_ms),
    ));
    let plan = HeistPlan {
        max_password: config.max_password,
        countdown: config.countdown,
        tick: Duration::from_secs(1),
    };

    match run_heist(vault, plan)? {
        HeistOutcome::Cracked { by, password } => {
            println!("\n{}", format!("{} cracked the vault: {password}", by.name()).red());
        }
        HeistOutcome::Caught => println!("\n{}", "The police caught the hackers".green()),
    }
    Ok(())
}
