use anyhow::Context;
use chrono::{Duration, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use concert_etl::apis::{build_llm_client, KopisClient, MusixmatchClient};
use concert_etl::config::Config;
use concert_etl::dates::normalize_date;
use concert_etl::db::Database;
use concert_etl::logging;
use concert_etl::pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "concert_etl")]
#[command(about = "KOPIS concert catalog ETL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Process only a few concerts and write under <output-dir>/test
    #[arg(long, global = true)]
    test_mode: bool,

    /// Directory for CSV output (overrides OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct Window {
    /// First day of the window (YYYY-MM-DD, YYYY.MM.DD or YYYYMMDD); defaults to 30 days ago
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// Last day of the window; defaults to 180 days from today
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,
}

impl Window {
    fn resolve(self) -> (NaiveDate, NaiveDate) {
        let today = Local::now().date_naive();
        (
            self.start.unwrap_or(today - Duration::days(30)),
            self.end.unwrap_or(today + Duration::days(180)),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stage 1: fetch KOPIS visit concerts into kopis_concerts.csv
    Fetch {
        #[command(flatten)]
        window: Window,
    },
    /// Stage 2: enrich concerts with model answers and write the catalog files
    Collect,
    /// Stage 3: fill missing lyrics from Musixmatch
    Lyrics,
    /// Stage 4: upsert catalog files into MySQL
    Upsert {
        /// Table to load, or "all"
        #[arg(long, default_value = "all")]
        table: String,
    },
    /// Run fetch, collect and lyrics in sequence
    Run {
        #[command(flatten)]
        window: Window,
    },
    /// Compare KOPIS visit concerts with concerts.csv
    Compare {
        #[command(flatten)]
        window: Window,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    normalize_date(raw).ok_or_else(|| format!("invalid date '{raw}'"))
}

async fn run_lyrics(pipeline: &Pipeline<'_>, config: &Config) -> anyhow::Result<()> {
    match MusixmatchClient::new(config) {
        Ok(client) => pipeline.lyrics(Arc::new(client)).await?.print(),
        Err(e) => println!("⚠️  Skipping lyrics: {e}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()
        .context("failed to load configuration")?
        .with_test_mode(cli.test_mode);
    if let Some(dir) = cli.output_dir {
        config = config.with_output_dir(dir);
    }

    let _guard = logging::init_logging(Path::new("logs"), &config.log_level);
    info!(output = %config.data_dir().display(), test_mode = config.test_mode, "Starting concert_etl");
    if config.test_mode {
        println!("🧪 Test mode: at most {} concerts, writing to {}", config.test_concert_limit, config.data_dir().display());
    }

    let pipeline = Pipeline::new(&config);
    match cli.command {
        Commands::Fetch { window } => {
            let (start, end) = window.resolve();
            let kopis = KopisClient::new(&config)?;
            pipeline.fetch(&kopis, start, end).await?.print();
        }
        Commands::Collect => {
            let llm = build_llm_client(&config)?;
            pipeline.collect(llm).await?.print();
        }
        Commands::Lyrics => run_lyrics(&pipeline, &config).await?,
        Commands::Upsert { table } => {
            println!("🗄️  Upserting {} into MySQL...", table);
            let mut db = Database::connect(&config).await.context("database connection failed")?;
            let result = pipeline.upsert(db.connection(), Some(table.as_str())).await;
            db.close().await?;
            result?.print();
        }
        Commands::Run { window } => {
            println!("🚀 Running fetch, collect and lyrics...");
            let (start, end) = window.resolve();
            let kopis = KopisClient::new(&config)?;
            pipeline.fetch(&kopis, start, end).await?.print();
            let llm = build_llm_client(&config)?;
            pipeline.collect(llm).await?.print();
            run_lyrics(&pipeline, &config).await?;
        }
        Commands::Compare { window } => {
            let (start, end) = window.resolve();
            let kopis = Arc::new(KopisClient::new(&config)?);
            if let Err(e) = pipeline.compare(kopis, start, end).await {
                error!("Comparison failed: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("Done");
    Ok(())
}
