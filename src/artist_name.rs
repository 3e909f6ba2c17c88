//! Resolves the performing artist for a concert.
//!
//! KOPIS `prfcast` is preferred. When it is empty the model is asked to read the artist
//! out of the title, and as a last resort the title itself is stripped down to a name.

use crate::apis::llm::LlmClient;
use crate::parser::{is_not_found_response, is_placeholder, parse_llm_json, string_field};
use crate::prompts;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

const MAX_NAME_CHARS: usize = 80;

static LABELLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:\*\*)?(?:아티스트|가수|artist)(?:\*\*)?\s*[:：]\s*(.+?)\s*$").expect("valid label regex")
});
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["“'「『]([^"”'」』\n]+)["”'」』]"#).expect("valid quote regex"));

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|<[^>]*>|〈[^〉]*〉|「[^」]*」|『[^』]*』").expect("valid bracket regex"));
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));
static TOUR_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)내한\s*공연|내한|단독\s*공연|콘서트|live\s+in\s+(?:seoul|korea|incheon|busan)|in\s+(?:seoul|korea)|(?:world|asia|asian)\s+tour|\btour\b|\bconcert\b|\blive\b|\bseoul\b|\bkorea\b",
    )
    .expect("valid tour regex")
});
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-–—:|/,~]+").expect("valid separator regex"));

/// Returns the artist name, trying KOPIS cast, then the model, then the title.
pub async fn resolve_artist_name(kopis_cast: Option<&str>, title: &str, llm: &dyn LlmClient) -> Option<String> {
    if let Some(name) = kopis_cast.and_then(from_cast) {
        debug!("Artist from KOPIS cast: {}", name);
        return Some(name);
    }

    match llm.query(&prompts::artist_name(title)).await {
        Ok(answer) => {
            if let Some(name) = parse_artist_answer(&answer) {
                debug!("Artist from {}: {}", llm.name(), name);
                return Some(name);
            }
        }
        Err(e) => warn!("Artist lookup for '{}' failed: {}", title, e),
    }

    let name = strip_title(title);
    if name.is_some() {
        debug!("Artist from title heuristics: {:?}", name);
    }
    name
}

/// First performer of a comma separated cast list.
fn from_cast(cast: &str) -> Option<String> {
    let first = cast.split([',', '、']).next()?.trim();
    let first = first.strip_suffix(" 등").unwrap_or(first).trim();
    accept(first)
}

pub fn parse_artist_answer(answer: &str) -> Option<String> {
    if is_not_found_response(answer) {
        return None;
    }
    if let Ok(value) = parse_llm_json(answer) {
        if value.is_object() {
            return string_field(&value, "artist").and_then(|n| accept(&n));
        }
    }
    if let Some(name) = LABELLED.captures(answer).and_then(|c| accept(&c[1])) {
        return Some(name);
    }
    if let Some(name) = QUOTED.captures(answer).and_then(|c| accept(&c[1])) {
        return Some(name);
    }
    let trimmed = answer.trim();
    if !trimmed.contains('\n') {
        return accept(trimmed.trim_end_matches('.'));
    }
    None
}

/// Strips brackets, years and tour words from a concert title.
pub fn strip_title(title: &str) -> Option<String> {
    let stripped = BRACKETED.replace_all(title, " ");
    let stripped = YEAR.replace_all(&stripped, " ");
    let stripped = TOUR_WORDS.replace_all(&stripped, " ");
    let collapsed = SEPARATORS.replace_all(&stripped, " ");
    accept(collapsed.trim())
}

fn accept(candidate: &str) -> Option<String> {
    let name = candidate.trim().trim_matches(|c| c == '*' || c == '"').trim();
    if is_placeholder(name) || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EtlError, Result};
    use async_trait::async_trait;

    struct Fixed(Option<&'static str>);

    #[async_trait]
    impl LlmClient for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn query(&self, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| EtlError::Validation("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn kopis_cast_wins_over_model() {
        let llm = Fixed(Some(r#"{"artist": "Wrong"}"#));
        let name = resolve_artist_name(Some("Coldplay, H.E.R."), "Coldplay Live in Seoul", &llm).await;
        assert_eq!(name.as_deref(), Some("Coldplay"));
    }

    #[tokio::test]
    async fn placeholder_cast_falls_through_to_model() {
        let llm = Fixed(Some("아티스트: Oasis"));
        let name = resolve_artist_name(Some("정보 없음"), "OASIS LIVE '25", &llm).await;
        assert_eq!(name.as_deref(), Some("Oasis"));
    }

    #[tokio::test]
    async fn failing_model_falls_back_to_title() {
        let name = resolve_artist_name(None, "[내한공연] Sum 41 WORLD TOUR 2025", &Fixed(None)).await;
        assert_eq!(name.as_deref(), Some("Sum 41"));
    }

    #[test]
    fn answer_patterns() {
        assert_eq!(parse_artist_answer("```json\n{\"artist\": \"Muse\"}\n```").as_deref(), Some("Muse"));
        assert_eq!(parse_artist_answer("The performer is:\nArtist: **Green Day**").as_deref(), Some("Green Day"));
        assert_eq!(parse_artist_answer("공연하는 가수는 \"Keane\" 입니다.\n확인해 보세요.").as_deref(), Some("Keane"));
        assert_eq!(parse_artist_answer("Travis Scott").as_deref(), Some("Travis Scott"));
        assert_eq!(parse_artist_answer("해당 정보를 찾을 수 없습니다."), None);
        assert_eq!(parse_artist_answer(r#"{"artist": "정보 없음"}"#), None);
    }

    #[test]
    fn title_heuristics() {
        assert_eq!(strip_title("Coldplay : Music of the Spheres World Tour"), Some("Coldplay Music of the Spheres".to_string()));
        assert_eq!(strip_title("2025 Post Malone LIVE IN SEOUL").as_deref(), Some("Post Malone"));
        assert_eq!(strip_title("[내한공연] 2025"), None);
    }
}
