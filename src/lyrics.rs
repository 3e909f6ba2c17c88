//! Lyrics matching against Musixmatch search results.
//!
//! A search hit is only trusted when both its title and its artist are close enough
//! to what was asked for; otherwise popular songs with similar names win the search
//! and the wrong lyrics get attached.

use crate::apis::musixmatch::{LyricsProvider, TrackCandidate};
use crate::constants::{CONTAINMENT_SIMILARITY, LYRICS_MIN_ARTIST_SIMILARITY, LYRICS_MIN_TITLE_SIMILARITY};
use crate::domain::Song;
use crate::rate_limiter::RateLimiter;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 1.0 for normalized equality, `CONTAINMENT_SIMILARITY` when one contains the
/// other, otherwise the normalized Levenshtein ratio.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return CONTAINMENT_SIMILARITY;
    }
    strsim::normalized_levenshtein(&a, &b)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub title: f64,
    pub artist: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            title: LYRICS_MIN_TITLE_SIMILARITY,
            artist: LYRICS_MIN_ARTIST_SIMILARITY,
        }
    }
}

impl MatchThresholds {
    pub fn accepts(&self, title_similarity: f64, artist_similarity: f64) -> bool {
        !(title_similarity < self.title || artist_similarity < self.artist)
    }

    /// Scores `candidate` against the requested song.
    pub fn evaluate(&self, song: &Song, candidate: &TrackCandidate) -> MatchDecision {
        let title_similarity = similarity(&song.title, &candidate.track_name);
        let artist_similarity = best_artist_similarity(&song.artist, &candidate.artist_name);
        MatchDecision {
            title_similarity,
            artist_similarity,
            accepted: self.accepts(title_similarity, artist_similarity),
        }
    }
}

/// Artist display names are often "Native (Korean)"; either half may match.
fn best_artist_similarity(requested: &str, found: &str) -> f64 {
    let mut best = similarity(requested, found);
    if let Some((native, rest)) = requested.split_once('(') {
        let local = rest.trim_end_matches(')');
        best = best.max(similarity(native, found)).max(similarity(local, found));
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchDecision {
    pub title_similarity: f64,
    pub artist_similarity: f64,
    pub accepted: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LyricsReport {
    pub searched: usize,
    pub matched: usize,
    pub rejected: usize,
    pub missing: usize,
    pub errors: usize,
}

/// Fills `lyrics` on songs that lack them.
pub struct LyricsEnricher {
    provider: Arc<dyn LyricsProvider>,
    thresholds: MatchThresholds,
    limiter: RateLimiter,
}

impl LyricsEnricher {
    pub fn new(provider: Arc<dyn LyricsProvider>, limiter: RateLimiter) -> Self {
        Self {
            provider,
            thresholds: MatchThresholds::default(),
            limiter,
        }
    }

    pub async fn enrich(&self, songs: &mut [Song]) -> LyricsReport {
        let mut report = LyricsReport::default();
        for song in songs.iter_mut().filter(|s| s.lyrics.as_deref().map_or(true, str::is_empty)) {
            report.searched += 1;
            match self.enrich_song(song).await {
                Ok(Outcome::Matched) => report.matched += 1,
                Ok(Outcome::Rejected) => report.rejected += 1,
                Ok(Outcome::Missing) => report.missing += 1,
                Err(e) => {
                    warn!("Lyrics lookup failed for '{}' by {}: {}", song.title, song.artist, e);
                    report.errors += 1;
                }
            }
        }
        info!(
            "Lyrics: {} searched, {} matched, {} rejected, {} missing, {} errors",
            report.searched, report.matched, report.rejected, report.missing, report.errors
        );
        report
    }

    async fn enrich_song(&self, song: &mut Song) -> crate::error::Result<Outcome> {
        let permit = self.limiter.acquire().await;
        let found = self.provider.search_track(&song.title, &song.artist).await?;
        drop(permit);
        let Some(candidate) = found else {
            return Ok(Outcome::Missing);
        };

        let decision = self.thresholds.evaluate(song, &candidate);
        if !decision.accepted {
            debug!(
                "Rejected '{}' / '{}' for '{}' / '{}' (title {:.2}, artist {:.2})",
                candidate.track_name,
                candidate.artist_name,
                song.title,
                song.artist,
                decision.title_similarity,
                decision.artist_similarity
            );
            return Ok(Outcome::Rejected);
        }

        let _permit = self.limiter.acquire().await;
        match self.provider.fetch_lyrics(candidate.track_id).await? {
            Some(lyrics) => {
                song.lyrics = Some(lyrics);
                song.musixmatch_track_id = Some(candidate.track_id);
                Ok(Outcome::Matched)
            }
            None => Ok(Outcome::Missing),
        }
    }
}

enum Outcome {
    Matched,
    Rejected,
    Missing,
}
