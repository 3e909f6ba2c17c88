//! Text gates applied to model-written prose before it is stored.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const PLACEHOLDERS: &[&str] = &[
    "-",
    "--",
    "n/a",
    "na",
    "null",
    "none",
    "unknown",
    "tbd",
    "tba",
    "not available",
    "no information",
    "정보 없음",
    "정보없음",
    "없음",
    "미정",
    "미확인",
    "확인 불가",
    "확인불가",
    "알 수 없음",
    "해당 없음",
    "해당없음",
];

/// Answers longer than this are treated as content even if they mention missing info.
const NOT_FOUND_MAX_CHARS: usize = 300;

static NOT_FOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(찾을 수 없|찾지 못|정보가 없|정보는 없|확인되지 않|확인할 수 없|공개된 정보가 없|알려진 정보가 없|no (relevant |available )?information|not found|could not find|couldn't find|unable to find|no data available)",
    )
    .expect("valid not-found regex")
});

static NUMERIC_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+(?:\s*[,\-–]\s*\d+)*\]").expect("valid citation regex"));
static BRACKET_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"【[^】]*】").expect("valid citation regex"));
static SOURCE_NOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\s*(?:출처|참고|source|sources)\s*[:：][^)]*\)").expect("valid source regex")
});
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+([.,!?])").expect("valid spacing regex"));
static INLINE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid spacing regex"));

/// How a matched ending is rewritten.
#[derive(Clone, Copy)]
enum Ending {
    Fixed(&'static str),
    /// `이에요` or `예요`, chosen by the preceding syllable.
    Copula,
    /// `아요` or `어요`, chosen by the vowel of the stem.
    Harmony,
}

/// Formal and plain sentence endings and their 해요체 replacements, longest first.
const HAEYO_ENDINGS: &[(&str, Ending)] = &[
    ("있습니다", Ending::Fixed("있어요")),
    ("없습니다", Ending::Fixed("없어요")),
    ("했습니다", Ending::Fixed("했어요")),
    ("였습니다", Ending::Fixed("였어요")),
    ("었습니다", Ending::Fixed("었어요")),
    ("았습니다", Ending::Fixed("았어요")),
    ("됐습니다", Ending::Fixed("됐어요")),
    ("겠습니다", Ending::Fixed("겠어요")),
    ("합니다", Ending::Fixed("해요")),
    ("됩니다", Ending::Fixed("돼요")),
    ("입니다", Ending::Copula),
    ("습니다", Ending::Harmony),
    ("있다", Ending::Fixed("있어요")),
    ("없다", Ending::Fixed("없어요")),
    ("했다", Ending::Fixed("했어요")),
    ("였다", Ending::Fixed("였어요")),
    ("었다", Ending::Fixed("었어요")),
    ("았다", Ending::Fixed("았어요")),
    ("한다", Ending::Fixed("해요")),
    ("된다", Ending::Fixed("돼요")),
    ("이다", Ending::Copula),
];

static HAEYO: Lazy<Regex> = Lazy::new(|| {
    let alternation = HAEYO_ENDINGS
        .iter()
        .map(|(from, _)| *from)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?m)(?P<prev>[가-힣]?)(?P<ending>{alternation})(?P<end>[.!?]|$)"))
        .expect("valid ending regex")
});

pub fn is_placeholder(value: &str) -> bool {
    let normalized = value.trim().trim_end_matches('.').trim().to_lowercase();
    normalized.is_empty() || PLACEHOLDERS.contains(&normalized.as_str())
}

/// True for short answers saying the requested information could not be found.
pub fn is_not_found_response(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || (trimmed.chars().count() <= NOT_FOUND_MAX_CHARS && NOT_FOUND.is_match(trimmed))
}

/// Removes search-citation markers such as `[1]`, `[1][2]`, `【3†source】`, `(출처: ...)`.
pub fn strip_citations(text: &str) -> String {
    let without = NUMERIC_CITATION.replace_all(text, "");
    let without = BRACKET_CITATION.replace_all(&without, "");
    let without = SOURCE_NOTE.replace_all(&without, "");
    let without = SPACE_BEFORE_PUNCT.replace_all(&without, "$1");
    INLINE_SPACES.replace_all(&without, " ").trim().to_string()
}

/// Rewrites sentence endings to the polite 해요체 register used in the catalog.
pub fn normalize_haeyo(text: &str) -> String {
    HAEYO
        .replace_all(text, |caps: &Captures| {
            let prev = caps.name("prev").map_or("", |m| m.as_str());
            let ending = &caps["ending"];
            let end = caps.name("end").map_or("", |m| m.as_str());
            let rule = HAEYO_ENDINGS
                .iter()
                .find(|(from, _)| *from == ending)
                .map_or(Ending::Copula, |(_, rule)| *rule);
            let replacement = match rule {
                Ending::Fixed(to) => to.to_string(),
                Ending::Copula => copula_for(prev),
                Ending::Harmony => format!("{}요", harmony_for(prev)),
            };
            format!("{prev}{replacement}{end}")
        })
        .into_owned()
}

/// `이에요` after a closed syllable, `예요` after an open one.
fn copula_for(prev: &str) -> String {
    let has_final_consonant = prev
        .chars()
        .last()
        .map(|c| {
            let code = c as u32;
            (0xAC00..=0xD7A3).contains(&code) && (code - 0xAC00) % 28 != 0
        })
        .unwrap_or(true);
    if has_final_consonant { "이에요" } else { "예요" }.to_string()
}

/// `아` after a stem in ㅏ, ㅑ or ㅗ, otherwise `어`. A past-tense `ㅆ` stem always takes `어`.
fn harmony_for(prev: &str) -> &'static str {
    let Some(code) = prev.chars().last().map(|c| c as u32).filter(|c| (0xAC00..=0xD7A3).contains(c)) else {
        return "어";
    };
    let offset = code - 0xAC00;
    let vowel = (offset / 28) % 21;
    let final_consonant = offset % 28;
    if final_consonant != 20 && matches!(vowel, 0 | 2 | 8) {
        "아"
    } else {
        "어"
    }
}

/// Citation strip, tone normalization and whitespace cleanup in one pass.
pub fn clean_text(text: &str) -> String {
    normalize_haeyo(&strip_citations(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_recognized() {
        for value in ["", "  ", "N/A", "정보 없음", "미정.", "Unknown", "-"] {
            assert!(is_placeholder(value), "{value:?} should be a placeholder");
        }
        assert!(!is_placeholder("Coldplay"));
        assert!(!is_placeholder("없음표"));
    }

    #[test]
    fn not_found_answers_are_detected() {
        assert!(is_not_found_response("죄송하지만 해당 공연의 셋리스트 정보를 찾을 수 없습니다."));
        assert!(is_not_found_response("I couldn't find any merchandise information."));
        assert!(!is_not_found_response("{\"songs\": [\"Yellow\"]}"));
        let long_answer = format!("{} 일부 곡은 공개되지 않았지만 확인되지 않은 곡도 있어요.", "가".repeat(400));
        assert!(!is_not_found_response(&long_answer));
    }

    #[test]
    fn citations_are_stripped() {
        assert_eq!(strip_citations("팬들은 떼창을 해요[1][2]."), "팬들은 떼창을 해요.");
        assert_eq!(strip_citations("응원봉이 있어요 [3, 4] (출처: 위버스)"), "응원봉이 있어요");
        assert_eq!(strip_citations("굿즈 줄이 길어요【2†source】."), "굿즈 줄이 길어요.");
    }

    #[test]
    fn endings_become_haeyo() {
        assert_eq!(normalize_haeyo("공연이 시작됩니다."), "공연이 시작돼요.");
        assert_eq!(normalize_haeyo("응원법이 있습니다!"), "응원법이 있어요!");
        assert_eq!(normalize_haeyo("첫 내한 공연입니다."), "첫 내한 공연이에요.");
        assert_eq!(normalize_haeyo("월드 투어입니다"), "월드 투어예요");
        assert_eq!(normalize_haeyo("팬들이 함께 노래한다.\n굿즈는 없다."), "팬들이 함께 노래해요.\n굿즈는 없어요.");
        assert_eq!(normalize_haeyo("이미 해요체예요."), "이미 해요체예요.");
        assert_eq!(normalize_haeyo("분위기가 좋습니다."), "분위기가 좋아요.");
        assert_eq!(normalize_haeyo("현장 예매도 받습니다."), "현장 예매도 받아요.");
        assert_eq!(normalize_haeyo("공연장이 넓습니다."), "공연장이 넓어요.");
        assert_eq!(normalize_haeyo("일찍 매진됐습니다."), "일찍 매진됐어요.");
    }

    #[test]
    fn clean_text_combines_gates() {
        assert_eq!(clean_text("공연 시간은 약 2시간입니다[1]."), "공연 시간은 약 2시간이에요.");
    }
}
