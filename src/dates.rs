use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source formats seen in KOPIS and model output, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y.%m.%d", "%Y-%m-%d", "%Y%m%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConcertStatus {
    Upcoming,
    Ongoing,
    Past,
    Unknown,
}

impl ConcertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConcertStatus::Upcoming => "UPCOMING",
            ConcertStatus::Ongoing => "ONGOING",
            ConcertStatus::Past => "PAST",
            ConcertStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ConcertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Normalizes to `YYYY-MM-DD`, keeping the input when no format matches.
pub fn normalize_date_string(raw: &str) -> String {
    normalize_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

pub fn compute_status(today: NaiveDate, start_date: &str, end_date: &str) -> ConcertStatus {
    let (Some(start), Some(end)) = (normalize_date(start_date), normalize_date(end_date)) else {
        return ConcertStatus::Unknown;
    };
    if today < start {
        ConcertStatus::Upcoming
    } else if today > end {
        ConcertStatus::Past
    } else {
        ConcertStatus::Ongoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_the_three_known_formats() {
        assert_eq!(normalize_date("2025.03.01"), Some(day(2025, 3, 1)));
        assert_eq!(normalize_date("2025-03-01"), Some(day(2025, 3, 1)));
        assert_eq!(normalize_date(" 20250301 "), Some(day(2025, 3, 1)));
        assert_eq!(normalize_date("03/01/2025"), None);
        assert_eq!(normalize_date_string("2025.03.01"), "2025-03-01");
    }

    #[test]
    fn status_follows_today_relative_to_range() {
        let today = day(2025, 3, 10);
        assert_eq!(compute_status(today, "2025.03.11", "2025.03.12"), ConcertStatus::Upcoming);
        assert_eq!(compute_status(today, "2025.03.10", "2025.03.10"), ConcertStatus::Ongoing);
        assert_eq!(compute_status(today, "2025-03-01", "20250315"), ConcertStatus::Ongoing);
        assert_eq!(compute_status(today, "2025.03.01", "2025.03.09"), ConcertStatus::Past);
    }

    #[test]
    fn unknown_only_when_a_date_is_unparseable() {
        let today = day(2025, 3, 10);
        assert_eq!(compute_status(today, "미정", "2025.03.09"), ConcertStatus::Unknown);
        assert_eq!(compute_status(today, "2025.03.01", ""), ConcertStatus::Unknown);
    }
}
