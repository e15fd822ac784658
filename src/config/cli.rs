use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Path to the credential cache (cookies + access token)
    #[arg(long, default_value = "cookiestore.json")]
    pub cookie_store: PathBuf,

    /// Path to the scraped purchase-history cache
    #[arg(long, default_value = "purchase_history.json")]
    pub history_cache: PathBuf,

    /// Path of the spreadsheet report to write
    #[arg(long, default_value = "purchases.xlsx")]
    pub output: PathBuf,

    /// WebDriver endpoint to connect to
    #[arg(long, default_value = "http://localhost:4444")]
    pub webdriver_url: String,

    /// geckodriver binary to spawn before connecting
    #[arg(long, default_value = "geckodriver", env = "GECKODRIVER")]
    pub geckodriver: String,

    /// Seconds to wait for a manual login before giving up
    #[arg(long, default_value_t = 900)]
    pub login_timeout: u64,

    /// Re-scrape the purchase history even if a cache file exists
    #[arg(long)]
    pub skip_cache: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
