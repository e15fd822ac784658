use crate::config::Config;
use crate::error::Result;
use crate::processor::Processor;
use tracing::info;

mod clients;
mod config;
mod error;
mod processor;
mod report;
mod scrapers;
mod session;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new()?;

    let level = config
        .args
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let processor = Processor::new(config);
    processor.run().await?;

    info!("Report completed successfully!");
    Ok(())
}
