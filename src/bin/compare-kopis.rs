//! Compares KOPIS visit concerts with the catalog and optionally reports to Discord.

use anyhow::Context;
use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use concert_etl::apis::KopisClient;
use concert_etl::compare::notify_discord;
use concert_etl::config::Config;
use concert_etl::dates::normalize_date;
use concert_etl::logging;
use concert_etl::pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "compare-kopis")]
#[command(about = "Compare KOPIS visit concerts with concerts.csv")]
struct Cli {
    /// First day of the window; defaults to today
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// Last day of the window; defaults to 180 days from today
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,

    /// Catalog directory (overrides OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Post the summary to DISCORD_WEBHOOK_URL
    #[arg(long)]
    notify: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    normalize_date(raw).ok_or_else(|| format!("invalid date '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(dir) = cli.output_dir {
        config = config.with_output_dir(dir);
    }
    let guard = logging::init_logging(Path::new("logs"), &config.log_level);

    let today = Local::now().date_naive();
    let start = cli.start.unwrap_or(today);
    let end = cli.end.unwrap_or(today + Duration::days(180));

    let kopis = Arc::new(KopisClient::new(&config)?);
    let report = Pipeline::new(&config).compare(kopis, start, end).await?;

    if cli.notify {
        match &config.discord_webhook_url {
            Some(url) => {
                let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
                notify_discord(&client, url, &report).await?;
                println!("📨 Sent report to Discord");
            }
            None => warn!("--notify given but DISCORD_WEBHOOK_URL is not set"),
        }
    }

    if !report.is_in_sync() {
        drop(guard);
        std::process::exit(1);
    }
    Ok(())
}
