//! Stage 2: enriches KOPIS concerts with model answers.
//!
//! Concerts are processed one at a time and every model call is spaced by the
//! configured request delay. Each annotation is parsed and validated on its own, so a
//! bad answer only empties that annotation. A concert whose artist cannot be resolved
//! is dropped from the batch.

use crate::apis::llm::LlmClient;
use crate::artist_name::resolve_artist_name;
use crate::config::Config;
use crate::constants::{canonical_genre, MIN_SETLIST_SONGS, SETLIST_ATTEMPTS};
use crate::dates::normalize_date;
use crate::domain::{
    ids, Artist, CollectedConcert, CollectedSetlist, CollectionBatch, Concert, ConcertGenre, ConcertInfo, Culture,
    Merchandise, Schedule, SetlistKind,
};
use crate::error::{EtlError, Result};
use crate::lyrics::{LyricsEnricher, LyricsReport};
use crate::parser::{array_field, clean_text, string_field, string_list, strip_citations};
use crate::prompts;
use crate::rate_limiter::RateLimiter;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Outcome of a collection run.
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub total: usize,
    pub collected: usize,
    pub with_setlist: usize,
    pub errors: Vec<String>,
    pub lyrics: Option<LyricsReport>,
}

pub struct DataCollector<'a> {
    llm: Arc<dyn LlmClient>,
    lyrics: Option<LyricsEnricher>,
    config: &'a Config,
    pacer: RateLimiter,
    today: NaiveDate,
}

impl<'a> DataCollector<'a> {
    pub fn new(llm: Arc<dyn LlmClient>, config: &'a Config) -> Self {
        Self {
            llm,
            lyrics: None,
            config,
            pacer: RateLimiter::with_min_interval(config.request_delay()),
            today: Local::now().date_naive(),
        }
    }

    /// Also fills lyrics for the collected setlist songs before returning.
    pub fn with_lyrics(mut self, enricher: LyricsEnricher) -> Self {
        self.lyrics = Some(enricher);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    #[instrument(skip_all, fields(llm = self.llm.name()))]
    pub async fn collect(&self, concerts: Vec<Concert>) -> (CollectionBatch, CollectionReport) {
        let limit = self.config.concert_limit().unwrap_or(usize::MAX);
        let concerts: Vec<Concert> = concerts.into_iter().take(limit).collect();
        let mut report = CollectionReport {
            total: concerts.len(),
            ..Default::default()
        };
        let mut batch = CollectionBatch::default();

        for (i, concert) in concerts.into_iter().enumerate() {
            info!("[{}/{}] Collecting {} ({})", i + 1, report.total, concert.title, concert.kopis_code);
            let code = concert.kopis_code.clone();
            match self.collect_concert(concert).await {
                Ok(collected) => {
                    report.collected += 1;
                    if collected.setlist.is_some() {
                        report.with_setlist += 1;
                    }
                    batch.push(collected);
                }
                Err(e) => {
                    error!("Collection failed for {}: {}", code, e);
                    report.errors.push(format!("{code}: {e}"));
                }
            }
        }

        if let Some(enricher) = &self.lyrics {
            report.lyrics = Some(enricher.enrich(&mut batch.songs).await);
        }

        info!(
            "Collected {}/{} concerts ({} with setlists, {} errors)",
            report.collected,
            report.total,
            report.with_setlist,
            report.errors.len()
        );
        (batch, report)
    }

    pub async fn collect_concert(&self, mut concert: Concert) -> Result<CollectedConcert> {
        let cast = concert.artist.clone();
        let artist = {
            let _pace = self.pacer.acquire().await;
            resolve_artist_name(Some(cast.as_str()), &concert.title, self.llm.as_ref()).await
        }
        .ok_or_else(|| EtlError::Validation(format!("no artist for '{}'", concert.title)))?;
        concert.set_artist(&artist);

        if concert.ticket_url.is_none() {
            let ticket = self.step("ticket", self.ticket_info(&concert)).await;
            if let Some((site, url)) = ticket {
                concert.ticket_site = concert.ticket_site.take().or(site);
                concert.ticket_url = Some(url);
            }
        }

        let mut collected = CollectedConcert::new(concert.clone());
        collected.setlist = self.step("setlist", self.setlist(&concert)).await;
        collected.cultures = self.step("culture", self.cultures(&concert)).await.unwrap_or_default();
        collected.schedules = self.step("schedule", self.schedules(&concert)).await.unwrap_or_default();
        collected.merchandise = self.step("merchandise", self.merchandise(&concert)).await.unwrap_or_default();
        collected.infos = self.step("info", self.infos(&concert)).await.unwrap_or_default();
        // The concert row references the artist, so a failed bio still yields a bare artist.
        let artist = self.step("artist", self.artist(&concert)).await;
        collected.artist = Some(artist.unwrap_or_else(|| Artist::new(&concert.artist)));
        collected.genres = self.step("genres", self.genres(&concert)).await.unwrap_or_default();
        Ok(collected)
    }

    /// Runs one enrichment step; a failure is logged and yields `None`.
    async fn step<T>(&self, name: &str, fut: impl std::future::Future<Output = Result<Option<T>>>) -> Option<T> {
        match fut.await {
            Ok(value) => value,
            Err(e) => {
                warn!("{} step failed: {}", name, e);
                None
            }
        }
    }

    async fn ask(&self, prompt: String) -> Result<Value> {
        let _pace = self.pacer.acquire().await;
        self.llm.query_json(&prompt, self.config.max_retries).await
    }

    async fn ticket_info(&self, concert: &Concert) -> Result<Option<(Option<String>, String)>> {
        let value = self.ask(prompts::ticket_info(concert)).await?;
        Ok(string_field(&value, "ticket_url")
            .filter(|url| is_url(url))
            .map(|url| (string_field(&value, "ticket_site"), url)))
    }

    async fn setlist(&self, concert: &Concert) -> Result<Option<CollectedSetlist>> {
        let kind = SetlistKind::for_status(concert.status(self.today));
        for attempt in 1..=SETLIST_ATTEMPTS {
            let value = self.ask(prompts::setlist(concert, kind)).await?;
            let titles = distinct_titles(&value);
            if titles.len() >= MIN_SETLIST_SONGS {
                debug!("{} setlist with {} songs on attempt {}", kind.as_str(), titles.len(), attempt);
                return Ok(Some(CollectedSetlist::build(concert, kind, &titles)));
            }
            warn!(
                "Setlist for '{}' had {} songs (attempt {}/{})",
                concert.title,
                titles.len(),
                attempt,
                SETLIST_ATTEMPTS
            );
        }
        Ok(None)
    }

    async fn cultures(&self, concert: &Concert) -> Result<Option<Vec<Culture>>> {
        let value = self.ask(prompts::culture(concert)).await?;
        let cultures = array_field(&value, "cultures")
            .iter()
            .filter_map(|item| {
                let title = string_field(item, "title")?;
                let content = clean_text(&string_field(item, "content")?);
                Some(Culture {
                    id: ids::child("culture", &concert.id, &[&title]),
                    concert_id: concert.id,
                    concert_title: concert.title.clone(),
                    title,
                    content,
                })
            })
            .collect();
        Ok(Some(cultures))
    }

    async fn schedules(&self, concert: &Concert) -> Result<Option<Vec<Schedule>>> {
        let value = self.ask(prompts::schedule(concert)).await?;
        let schedules = array_field(&value, "schedules")
            .iter()
            .filter_map(|item| {
                let category = string_field(item, "category")?;
                let scheduled_at = string_field(item, "scheduled_at")?;
                if !is_schedule_datetime(&scheduled_at) {
                    debug!("Dropping schedule '{}' with datetime '{}'", category, scheduled_at);
                    return None;
                }
                Some(Schedule {
                    id: ids::child("schedule", &concert.id, &[&category, &scheduled_at]),
                    concert_id: concert.id,
                    concert_title: concert.title.clone(),
                    category,
                    scheduled_at,
                })
            })
            .collect();
        Ok(Some(schedules))
    }

    async fn merchandise(&self, concert: &Concert) -> Result<Option<Vec<Merchandise>>> {
        let value = self.ask(prompts::merchandise(concert)).await?;
        let items = array_field(&value, "merchandise")
            .iter()
            .filter_map(|item| {
                let name = string_field(item, "name")?;
                Some(Merchandise {
                    id: ids::child("md", &concert.id, &[&name]),
                    concert_id: concert.id,
                    concert_title: concert.title.clone(),
                    name,
                    price: string_field(item, "price"),
                    img_url: string_field(item, "img_url").filter(|u| is_url(u)),
                })
            })
            .collect();
        Ok(Some(items))
    }

    async fn infos(&self, concert: &Concert) -> Result<Option<Vec<ConcertInfo>>> {
        let value = self.ask(prompts::concert_info(concert)).await?;
        let infos = array_field(&value, "infos")
            .iter()
            .filter_map(|item| {
                let category = string_field(item, "category")?;
                let content = clean_text(&string_field(item, "content")?);
                Some(ConcertInfo {
                    id: ids::child("concert_info", &concert.id, &[&category]),
                    concert_id: concert.id,
                    concert_title: concert.title.clone(),
                    category,
                    content,
                })
            })
            .collect();
        Ok(Some(infos))
    }

    async fn artist(&self, concert: &Concert) -> Result<Option<Artist>> {
        let value = self.ask(prompts::artist_bio(&concert.artist)).await?;
        let mut artist = Artist::new(&concert.artist);
        artist.debut_date = string_field(&value, "debut_date")
            .and_then(|d| normalize_date(&d))
            .map(|d| d.format("%Y-%m-%d").to_string());
        artist.category = string_field(&value, "category");
        artist.detail = string_field(&value, "detail").map(|d| clean_text(&d));
        artist.instagram_url = string_field(&value, "instagram_url").filter(|u| is_url(u));
        artist.img_url = string_field(&value, "img_url").filter(|u| is_url(u));
        let keywords = string_list(&value, "keywords");
        artist.keywords = if keywords.is_empty() {
            string_field(&value, "keywords")
        } else {
            Some(keywords.join(", "))
        };
        Ok(Some(artist))
    }

    async fn genres(&self, concert: &Concert) -> Result<Option<Vec<ConcertGenre>>> {
        let value = self.ask(prompts::genres(concert)).await?;
        let mut seen = HashSet::new();
        let genres = string_list(&value, "genres")
            .iter()
            .filter_map(|raw| canonical_genre(raw))
            .filter(|genre| seen.insert(*genre))
            .map(|genre| ConcertGenre {
                id: ids::child("concert_genre", &concert.id, &[genre]),
                concert_id: concert.id,
                concert_title: concert.title.clone(),
                genre: genre.to_string(),
            })
            .collect();
        Ok(Some(genres))
    }
}

/// Song titles in answer order, citations stripped, duplicates dropped.
fn distinct_titles(value: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut titles = string_list(value, "songs");
    if titles.is_empty() {
        titles = string_list(value, "setlist");
    }
    titles
        .into_iter()
        .map(|t| strip_citations(&t))
        .filter(|t| !t.is_empty() && seen.insert(ids::normalize_key(t)))
        .collect()
}

fn is_schedule_datetime(value: &str) -> bool {
    NaiveDateTime::parse_from_str(value, SCHEDULE_FORMAT).is_ok()
}

fn is_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}
