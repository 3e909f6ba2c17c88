use crate::apis::kopis::{is_visit_concert, ConcertSource};
use crate::apis::llm::LlmClient;
use crate::apis::musixmatch::LyricsProvider;
use crate::collector::DataCollector;
use crate::compare::{compare_with_catalog, ComparisonReport};
use crate::config::Config;
use crate::constants::{COMPARE_MIN_INTERVAL_MS, COMPARE_WORKERS};
use crate::csv_store::{CsvStore, MergeReport};
use crate::db::{find_table, upsert_all, upsert_table, UpsertReport};
use crate::domain::{Concert, Song};
use crate::error::{EtlError, Result};
use crate::lyrics::LyricsEnricher;
use crate::rate_limiter::RateLimiter;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use sqlx::mysql::MySqlConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Result of one stage run
#[derive(Debug, Default, Serialize)]
pub struct StageResult {
    pub stage: &'static str,
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub outputs: Vec<String>,
}

impl StageResult {
    fn new(stage: &'static str) -> Self {
        Self {
            stage,
            ..Default::default()
        }
    }

    fn record_merge(&mut self, merge: &MergeReport) {
        if merge.inserted + merge.updated > 0 {
            self.outputs.push(format!(
                "{} (+{} new, {} updated, {} rows)",
                merge.file, merge.inserted, merge.updated, merge.total
            ));
        }
    }

    pub fn print(&self) {
        println!("\n📊 {} results:", self.stage);
        println!("   Total: {}", self.total);
        println!("   Processed: {}", self.processed);
        println!("   Skipped: {}", self.skipped);
        println!("   Errors: {}", self.errors.len());
        for output in &self.outputs {
            println!("   💾 {}", output);
        }
        if !self.errors.is_empty() {
            warn!("{} errors encountered during {}", self.errors.len(), self.stage);
            println!("\n⚠️  Errors encountered:");
            for error in &self.errors {
                println!("   - {}", error);
            }
        }
    }
}

/// Stage runners over one output directory.
pub struct Pipeline<'a> {
    config: &'a Config,
    store: CsvStore,
    today: NaiveDate,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            store: CsvStore::new(config.data_dir()),
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Stage 1: KOPIS visit concerts in `[start, end]` into `kopis_concerts.csv`.
    #[instrument(skip(self, source))]
    pub async fn fetch(&self, source: &dyn ConcertSource, start: NaiveDate, end: NaiveDate) -> Result<StageResult> {
        let mut result = StageResult::new("fetch");
        println!("📡 Fetching KOPIS performances {} ~ {}...", start, end);
        let codes = source.fetch_codes_all_states(start, end).await?;
        result.total = codes.len();
        println!("✅ Fetched {} performance codes", codes.len());

        let details = source.fetch_details(&codes).await;
        let failed = codes.len() - details.len();
        if failed > 0 {
            result.errors.push(format!("{failed} detail records could not be fetched"));
        }

        let concerts: Vec<Concert> = details
            .iter()
            .filter(|detail| is_visit_concert(detail))
            .map(|detail| detail.to_concert())
            .collect();
        result.processed = concerts.len();
        result.skipped = details.len() - concerts.len();
        info!("{} of {} performances are visit concerts", concerts.len(), details.len());
        println!("🔧 {} visit concerts ({} other performances skipped)", result.processed, result.skipped);

        let merge = self.store.save_kopis_concerts(&concerts, self.today)?;
        result.record_merge(&merge);
        Ok(result)
    }

    /// Stage 2: enrich the stage 1 concerts and write every catalog file.
    #[instrument(skip(self, llm), fields(llm = llm.name()))]
    pub async fn collect(&self, llm: Arc<dyn LlmClient>) -> Result<StageResult> {
        let mut result = StageResult::new("collect");
        let concerts = self.store.load_kopis_concerts()?;
        if concerts.is_empty() {
            println!("⚠️  No concerts in {}; run fetch first", self.store.dir().display());
            return Ok(result);
        }
        println!("🔧 Collecting details for {} concerts with {}...", concerts.len(), llm.name());

        let collector = DataCollector::new(llm, self.config).with_today(self.today);
        let (batch, report) = collector.collect(concerts).await;
        result.total = report.total;
        result.processed = report.collected;
        result.skipped = report.total - report.collected;
        result.errors = report.errors;
        println!("✅ Collected {} concerts, {} with setlists", report.collected, report.with_setlist);

        for merge in self.store.save_batch(&batch, self.today)? {
            result.record_merge(&merge);
        }
        Ok(result)
    }

    /// Stage 3: lyrics for songs in `songs.csv` that have none.
    #[instrument(skip(self, provider))]
    pub async fn lyrics(&self, provider: Arc<dyn LyricsProvider>) -> Result<StageResult> {
        let mut result = StageResult::new("lyrics");
        let mut songs: Vec<Song> = self.store.load()?;
        result.total = songs.len();
        println!("🎵 Looking up lyrics for {} songs...", songs.len());

        let enricher = LyricsEnricher::new(provider, RateLimiter::with_min_interval(self.config.request_delay()));
        let report = enricher.enrich(&mut songs).await;
        result.processed = report.matched;
        result.skipped = report.rejected + report.missing;
        if report.errors > 0 {
            result.errors.push(format!("{} lyrics lookups failed", report.errors));
        }
        println!(
            "✅ {} matched, {} rejected, {} without lyrics",
            report.matched, report.rejected, report.missing
        );

        let merge = self.store.merge(&songs)?;
        result.record_merge(&merge);
        Ok(result)
    }

    /// Stage 4: load one table, or all of them in dependency order.
    #[instrument(skip(self, conn))]
    pub async fn upsert(&self, conn: &mut MySqlConnection, table: Option<&str>) -> Result<StageResult> {
        let mut result = StageResult::new("upsert");
        let reports: Vec<UpsertReport> = match table {
            None | Some("all") => upsert_all(conn, &self.store).await?,
            Some(name) => {
                let spec = find_table(name).ok_or_else(|| EtlError::Config(format!("unknown table '{name}'")))?;
                let rows = self.store.load_raw(spec.csv_file)?;
                vec![upsert_table(conn, spec, &rows).await?]
            }
        };
        for report in &reports {
            result.total += report.upserted + report.skipped;
            result.processed += report.upserted;
            result.skipped += report.skipped;
            result.outputs.push(format!("{}: {} upserted, {} skipped", report.table, report.upserted, report.skipped));
        }
        Ok(result)
    }

    /// Diagnostic comparison of KOPIS against `concerts.csv`.
    pub async fn compare(&self, source: Arc<dyn ConcertSource>, start: NaiveDate, end: NaiveDate) -> Result<ComparisonReport> {
        println!("🔍 Comparing KOPIS visit concerts {} ~ {} with the catalog...", start, end);
        let report = compare_with_catalog(
            source,
            &self.store,
            start,
            end,
            COMPARE_WORKERS,
            Duration::from_millis(COMPARE_MIN_INTERVAL_MS),
        )
        .await?;
        println!("{}", report.summary());
        Ok(report)
    }
}
