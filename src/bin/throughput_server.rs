//! Word count server for throughput measurements.
//!
//! Run with: cargo run --release --bin throughput_server
//! Then load it with e.g. JMeter: GET http://localhost:8000/search?word=talk
//! Vary THREAD_HAZARDS_POOL_SIZE between runs to compare throughput.

use thread_hazards::logging::init_tracing;
use thread_hazards::server::{bind, WordCountServer};
use thread_hazards::HarnessConfig;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");
    let config = HarnessConfig::load()?.server;

    let server = WordCountServer::from_config(&config)?;
    let listener = bind(config.socket_addr()?).await?;
    tracing::info!(pool_size = config.pool_size, "word count server ready");

    server
        .serve(listener, async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("could not listen for Ctrl-C; serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
