//! Market Harvester - Solana market data poller
//!
//! Polls Birdeye and Dexscreener on independent schedules and stores the
//! results in SQLite.

use anyhow::Result;

use market_harvester::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (API keys go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
