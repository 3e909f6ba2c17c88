/// Endpoints and fixed tuning values shared across the pipeline.

// External services
pub const KOPIS_BASE_URL: &str = "http://www.kopis.or.kr/openApi/restful";
pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_FALLBACK_MODEL: &str = "gemini-2.0-flash-exp";
pub const MUSIXMATCH_BASE_URL: &str = "https://api.musixmatch.com/ws/1.1";

// KOPIS query parameters
pub const KOPIS_ROWS_PER_PAGE: usize = 100;
pub const KOPIS_MAX_PAGES: u32 = 200;
/// Genre code for popular music.
pub const KOPIS_GENRE_POPULAR_MUSIC: &str = "CCCD";

// Catalog files
pub const KOPIS_CONCERTS_CSV: &str = "kopis_concerts.csv";
pub const CONCERTS_CSV: &str = "concerts.csv";
pub const ARTISTS_CSV: &str = "artists.csv";
pub const SONGS_CSV: &str = "songs.csv";
pub const SETLISTS_CSV: &str = "setlists.csv";
pub const SETLIST_SONGS_CSV: &str = "setlist_songs.csv";
pub const CONCERT_SETLISTS_CSV: &str = "concert_setlists.csv";
pub const CULTURES_CSV: &str = "cultures.csv";
pub const SCHEDULE_CSV: &str = "schedule.csv";
pub const MD_CSV: &str = "md.csv";
pub const CONCERT_INFO_CSV: &str = "concert_info.csv";
pub const CONCERT_GENRES_CSV: &str = "concert_genres.csv";
pub const BACKUP_DIR: &str = "backup";

// Validation thresholds
pub const MIN_SETLIST_SONGS: usize = 10;
pub const SETLIST_ATTEMPTS: u32 = 3;
pub const LYRICS_MIN_TITLE_SIMILARITY: f64 = 0.6;
pub const LYRICS_MIN_ARTIST_SIMILARITY: f64 = 0.8;
pub const CONTAINMENT_SIMILARITY: f64 = 0.9;

// Diagnostic comparison
pub const COMPARE_WORKERS: usize = 20;
pub const COMPARE_MIN_INTERVAL_MS: u64 = 100;

/// Genre vocabulary concerts are classified into.
pub const GENRES: &[&str] = &[
    "POP",
    "ROCK_METAL",
    "RAP_HIPHOP",
    "R&B_SOUL",
    "JPOP",
    "INDIE",
    "ELECTRONIC",
    "JAZZ",
    "ACOUSTIC_FOLK",
    "CLASSICAL_CROSSOVER",
];

/// Returns the canonical genre name for a model answer, if it is in the vocabulary.
pub fn canonical_genre(raw: &str) -> Option<&'static str> {
    let wanted: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' || c == '/' { '_' } else { c })
        .collect();
    GENRES.iter().copied().find(|g| *g == wanted)
}

#[cfg(test)]
mod tests {
    use super::canonical_genre;

    #[test]
    fn genres_normalize_case_and_separators() {
        assert_eq!(canonical_genre("rock/metal"), Some("ROCK_METAL"));
        assert_eq!(canonical_genre(" jpop "), Some("JPOP"));
        assert_eq!(canonical_genre("k-pop"), None);
    }
}
