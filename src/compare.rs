//! Diagnostic: compares KOPIS visit concerts against the catalog in `concerts.csv`.
//!
//! Details are fetched by a bounded pool of workers sharing one rate limiter; this is
//! the only concurrent part of the pipeline.

use crate::apis::kopis::{is_visit_concert, ConcertSource};
use crate::csv_store::CsvStore;
use crate::dates::normalize_date;
use crate::domain::ConcertRow;
use crate::error::{EtlError, Result};
use crate::rate_limiter::{Limits, RateLimiter};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub fetched_codes: usize,
    pub fetched_details: usize,
    pub failed_details: usize,
    pub visit_concerts: usize,
    pub catalog_concerts: usize,
    /// Visit concerts on KOPIS that the catalog lacks.
    pub missing: Vec<String>,
    /// Catalog concerts in the window that KOPIS no longer lists as visit concerts.
    pub extra: Vec<String>,
}

impl ComparisonReport {
    pub fn is_in_sync(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    pub fn summary(&self) -> String {
        let window = match (self.start, self.end) {
            (Some(s), Some(e)) => format!("{s} ~ {e}"),
            _ => "-".to_string(),
        };
        let mut lines = vec![
            format!("KOPIS comparison {window}"),
            format!(
                "KOPIS visit concerts: {} (of {} codes, {} failed)",
                self.visit_concerts, self.fetched_codes, self.failed_details
            ),
            format!("Catalog concerts in window: {}", self.catalog_concerts),
            format!("Missing from catalog: {}", self.missing.len()),
            format!("Not on KOPIS: {}", self.extra.len()),
        ];
        if !self.missing.is_empty() {
            lines.push(format!("Missing: {}", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            lines.push(format!("Extra: {}", self.extra.join(", ")));
        }
        lines.join("\n")
    }
}

fn overlaps(row: &ConcertRow, start: NaiveDate, end: NaiveDate) -> bool {
    match (normalize_date(&row.start_date), normalize_date(&row.end_date)) {
        (Some(s), Some(e)) => s <= end && e >= start,
        _ => false,
    }
}

#[instrument(skip(source, store))]
pub async fn compare_with_catalog(
    source: Arc<dyn ConcertSource>,
    store: &CsvStore,
    start: NaiveDate,
    end: NaiveDate,
    workers: usize,
    min_interval: Duration,
) -> Result<ComparisonReport> {
    let codes = source.fetch_codes_all_states(start, end).await?;
    info!("Comparing {} KOPIS codes with {} workers", codes.len(), workers);

    let limiter = RateLimiter::new(Limits {
        min_interval,
        concurrency: Some(workers.max(1)),
    });
    let mut tasks = JoinSet::new();
    for code in codes.iter().cloned() {
        let source = Arc::clone(&source);
        let limiter = limiter.clone();
        tasks.spawn(async move {
            let _permit = limiter.acquire().await;
            let detail = source.fetch_detail(&code).await;
            (code, detail)
        });
    }

    let mut report = ComparisonReport {
        start: Some(start),
        end: Some(end),
        fetched_codes: codes.len(),
        ..Default::default()
    };
    let mut visit_codes = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let (code, detail) = joined.map_err(|e| EtlError::Validation(format!("comparison worker failed: {e}")))?;
        match detail {
            Ok(detail) => {
                report.fetched_details += 1;
                if is_visit_concert(&detail) {
                    visit_codes.insert(detail.code.trim().to_string());
                }
            }
            Err(e) => {
                warn!("Detail fetch failed for {}: {}", code, e);
                report.failed_details += 1;
            }
        }
    }
    report.visit_concerts = visit_codes.len();

    let catalog: BTreeSet<String> = store
        .load::<ConcertRow>()?
        .into_iter()
        .filter(|row| overlaps(row, start, end))
        .map(|row| row.kopis_code)
        .collect();
    report.catalog_concerts = catalog.len();
    report.missing = visit_codes.difference(&catalog).cloned().collect();
    report.extra = catalog.difference(&visit_codes).cloned().collect();

    info!(
        "Comparison done: {} missing, {} extra",
        report.missing.len(),
        report.extra.len()
    );
    Ok(report)
}

/// Posts the report summary to a Discord webhook.
pub async fn notify_discord(client: &reqwest::Client, webhook_url: &str, report: &ComparisonReport) -> Result<()> {
    let response = client
        .post(webhook_url)
        .json(&serde_json::json!({ "content": report.summary() }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EtlError::Api {
            service: "discord",
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }
    info!("Comparison report sent to Discord");
    Ok(())
}
