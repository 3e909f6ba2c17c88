use crate::apis::retry::with_linear_backoff;
use crate::config::Config;
use crate::constants::MUSIXMATCH_BASE_URL;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const LYRICS_TRAILER: &str = "*******";

/// Best search hit for a title/artist query.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCandidate {
    pub track_id: u64,
    pub track_name: String,
    pub artist_name: String,
}

#[async_trait]
pub trait LyricsProvider: Send + Sync {
    async fn search_track(&self, title: &str, artist: &str) -> Result<Option<TrackCandidate>>;

    async fn fetch_lyrics(&self, track_id: u64) -> Result<Option<String>>;
}

pub struct MusixmatchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl MusixmatchClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, MUSIXMATCH_BASE_URL)
    }

    pub fn with_base_url(config: &Config, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.musixmatch_key()?.to_string(),
            max_retries: config.max_retries,
            retry_delay: config.request_delay(),
        })
    }

    /// Calls a method and returns `message.body`, retrying rate limits and server errors.
    async fn call(&self, method: &str, query: &[(&str, String)]) -> Result<Value> {
        with_linear_backoff(method, self.max_retries, self.retry_delay, |_| self.call_once(method, query)).await
    }

    /// One request; both the HTTP status and the envelope status are checked.
    async fn call_once(&self, method: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, method))
            .query(&[("apikey", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Api {
                service: "musixmatch",
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let mut envelope: Value = response.json().await?;
        let code = envelope["message"]["header"]["status_code"].as_u64().unwrap_or(200);
        if code == 404 {
            return Ok(Value::Null);
        }
        if code != 200 {
            return Err(EtlError::Api {
                service: "musixmatch",
                status: u16::try_from(code).unwrap_or(u16::MAX),
                message: format!("{method} returned status {code}"),
            });
        }
        Ok(envelope.pointer_mut("/message/body").map(Value::take).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl LyricsProvider for MusixmatchClient {
    #[instrument(skip(self))]
    async fn search_track(&self, title: &str, artist: &str) -> Result<Option<TrackCandidate>> {
        let body = self
            .call(
                "track.search",
                &[
                    ("q_track", title.to_string()),
                    ("q_artist", artist.to_string()),
                    ("f_has_lyrics", "1".to_string()),
                    ("s_track_rating", "desc".to_string()),
                    ("page_size", "1".to_string()),
                    ("page", "1".to_string()),
                ],
            )
            .await?;

        let candidate = body["track_list"]
            .as_array()
            .and_then(|list| list.first())
            .and_then(|entry| {
                let track = &entry["track"];
                Some(TrackCandidate {
                    track_id: track["track_id"].as_u64()?,
                    track_name: track["track_name"].as_str()?.to_string(),
                    artist_name: track["artist_name"].as_str().unwrap_or_default().to_string(),
                })
            });
        debug!("Musixmatch candidate: {:?}", candidate);
        Ok(candidate)
    }

    #[instrument(skip(self))]
    async fn fetch_lyrics(&self, track_id: u64) -> Result<Option<String>> {
        let body = self.call("track.lyrics.get", &[("track_id", track_id.to_string())]).await?;
        Ok(body["lyrics"]["lyrics_body"]
            .as_str()
            .map(strip_lyrics_trailer)
            .filter(|lyrics| !lyrics.is_empty()))
    }
}

/// Drops the "NOT for Commercial use" notice appended to free-tier lyrics.
pub fn strip_lyrics_trailer(lyrics: &str) -> String {
    match lyrics.find(LYRICS_TRAILER) {
        Some(idx) => lyrics[..idx].trim().to_string(),
        None => lyrics.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::strip_lyrics_trailer;

    #[test]
    fn removes_commercial_use_notice() {
        let body = "Look at the stars\nLook how they shine for you\n...\n\n******* This Lyrics is NOT for Commercial use *******\n(1409623093573)";
        assert_eq!(strip_lyrics_trailer(body), "Look at the stars\nLook how they shine for you\n...");
        assert_eq!(strip_lyrics_trailer("  plain  "), "plain");
    }
}
