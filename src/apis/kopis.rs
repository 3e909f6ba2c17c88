//! KOPIS (Korea Performing Arts Box Office Information System) registry client.

use crate::config::Config;
use crate::constants::{KOPIS_BASE_URL, KOPIS_GENRE_POPULAR_MUSIC, KOPIS_MAX_PAGES, KOPIS_ROWS_PER_PAGE};
use crate::dates::normalize_date_string;
use crate::domain::Concert;
use crate::error::{EtlError, Result};
use crate::parser::is_placeholder;
use crate::venue::clean_venue;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// `prfstate` filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceState {
    Upcoming,
    Ongoing,
    Completed,
}

impl PerformanceState {
    pub const ALL: [PerformanceState; 3] = [
        PerformanceState::Upcoming,
        PerformanceState::Ongoing,
        PerformanceState::Completed,
    ];

    pub fn code(self) -> &'static str {
        match self {
            PerformanceState::Upcoming => "01",
            PerformanceState::Ongoing => "02",
            PerformanceState::Completed => "03",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(rename = "db", default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    #[serde(rename = "mt20id", default)]
    code: String,
}

#[derive(Debug, Default, Deserialize)]
struct DetailResponse {
    #[serde(rename = "db", default)]
    items: Vec<KopisDetail>,
}

/// One `pblprfr/{code}` record. Only the fields the catalog uses are read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KopisDetail {
    #[serde(rename = "mt20id", default)]
    pub code: String,
    #[serde(rename = "prfnm", default)]
    pub title: String,
    #[serde(rename = "prfpdfrom", default)]
    pub start_date: String,
    #[serde(rename = "prfpdto", default)]
    pub end_date: String,
    #[serde(rename = "fcltynm", default)]
    pub venue: String,
    #[serde(rename = "prfcast", default)]
    pub cast: String,
    #[serde(rename = "entrpsnm", default)]
    pub company: String,
    #[serde(rename = "entrpsnmP", default)]
    pub promoter: String,
    #[serde(default)]
    pub poster: String,
    #[serde(rename = "sty", default)]
    pub story: String,
    #[serde(rename = "genrenm", default)]
    pub genre: String,
    #[serde(rename = "prfstate", default)]
    pub state: String,
    #[serde(default)]
    pub visit: String,
    #[serde(default)]
    pub festival: String,
    #[serde(default)]
    pub relates: Option<Relates>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Relates {
    #[serde(rename = "relate", default)]
    pub items: Vec<Relate>,
}

/// Ticket vendor link.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Relate {
    #[serde(rename = "relatenm", default)]
    pub name: String,
    #[serde(rename = "relateurl", default)]
    pub url: String,
}

/// International guest performance that is not a festival, with a title and a cast.
pub fn is_visit_concert(detail: &KopisDetail) -> bool {
    detail.visit.trim() == "Y"
        && detail.festival.trim() == "N"
        && !detail.title.trim().is_empty()
        && !detail.cast.trim().is_empty()
}

fn non_placeholder(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!is_placeholder(trimmed)).then(|| trimmed.to_string())
}

impl KopisDetail {
    pub fn to_concert(&self) -> Concert {
        let mut concert = Concert::new(self.code.trim(), self.title.trim());
        concert.artist = self.cast.trim().to_string();
        concert.start_date = normalize_date_string(&self.start_date);
        concert.end_date = normalize_date_string(&self.end_date);
        concert.venue = clean_venue(&self.venue);
        concert.poster = non_placeholder(&self.poster);
        concert.label = non_placeholder(&self.promoter).or_else(|| non_placeholder(&self.company));
        concert.introduction = non_placeholder(&self.story);
        concert.genre = non_placeholder(&self.genre);

        if let Some(relate) = self
            .relates
            .as_ref()
            .and_then(|r| r.items.iter().find(|item| !item.url.trim().is_empty()))
        {
            concert.ticket_site = non_placeholder(&relate.name);
            concert.ticket_url = non_placeholder(&relate.url);
        }
        concert
    }
}

/// Source of performance listings; implemented by the KOPIS client and by test stubs.
#[async_trait]
pub trait ConcertSource: Send + Sync {
    async fn fetch_codes(&self, start: NaiveDate, end: NaiveDate, state: PerformanceState) -> Result<Vec<String>>;

    async fn fetch_detail(&self, code: &str) -> Result<KopisDetail>;

    /// Codes for every performance state, de-duplicated in first-seen order.
    async fn fetch_codes_all_states(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut codes = Vec::new();
        for state in PerformanceState::ALL {
            for code in self.fetch_codes(start, end, state).await? {
                if seen.insert(code.clone()) {
                    codes.push(code);
                }
            }
        }
        Ok(codes)
    }

    /// Details for `codes`; a code that fails is logged and skipped.
    async fn fetch_details(&self, codes: &[String]) -> Vec<KopisDetail> {
        let mut details = Vec::with_capacity(codes.len());
        for code in codes {
            match self.fetch_detail(code).await {
                Ok(detail) => details.push(detail),
                Err(e) => warn!("Skipping KOPIS code {}: {}", code, e),
            }
        }
        details
    }
}

pub struct KopisClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl KopisClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, KOPIS_BASE_URL)
    }

    pub fn with_base_url(config: &Config, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: config.kopis_key()?.to_string(),
        })
    }

    async fn get_xml(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EtlError::Api {
                service: "kopis",
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ConcertSource for KopisClient {
    #[instrument(skip(self))]
    async fn fetch_codes(&self, start: NaiveDate, end: NaiveDate, state: PerformanceState) -> Result<Vec<String>> {
        let url = format!("{}/pblprfr", self.base_url);
        let mut codes = Vec::new();

        for page in 1..=KOPIS_MAX_PAGES {
            let query = [
                ("service", self.service_key.clone()),
                ("stdate", start.format("%Y%m%d").to_string()),
                ("eddate", end.format("%Y%m%d").to_string()),
                ("rows", KOPIS_ROWS_PER_PAGE.to_string()),
                ("cpage", page.to_string()),
                ("shcate", KOPIS_GENRE_POPULAR_MUSIC.to_string()),
                ("prfstate", state.code().to_string()),
            ];
            let xml = self.get_xml(&url, &query).await?;
            let listing: ListResponse = quick_xml::de::from_str(&xml)?;
            let count = listing.items.len();
            debug!("KOPIS page {} returned {} rows", page, count);

            codes.extend(
                listing
                    .items
                    .into_iter()
                    .map(|item| item.code.trim().to_string())
                    .filter(|code| !code.is_empty()),
            );
            if count < KOPIS_ROWS_PER_PAGE {
                break;
            }
        }

        info!("Fetched {} KOPIS codes for state {}", codes.len(), state.code());
        Ok(codes)
    }

    async fn fetch_detail(&self, code: &str) -> Result<KopisDetail> {
        let url = format!("{}/pblprfr/{}", self.base_url, code);
        let xml = self.get_xml(&url, &[("service", self.service_key.clone())]).await?;
        let parsed: DetailResponse = quick_xml::de::from_str(&xml)?;
        parsed
            .items
            .into_iter()
            .next()
            .ok_or_else(|| EtlError::MissingField(format!("KOPIS detail record for {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dbs>
  <db>
    <mt20id>PF250001</mt20id>
    <prfnm>콜드플레이 내한공연 MUSIC OF THE SPHERES</prfnm>
    <prfpdfrom>2025.04.16</prfpdfrom>
    <prfpdto>2025.04.25</prfpdto>
    <fcltynm>고양종합운동장 (주경기장) (고양종합운동장 (주경기장))</fcltynm>
    <prfcast>콜드플레이</prfcast>
    <entrpsnm> </entrpsnm>
    <entrpsnmP>라이브네이션코리아</entrpsnmP>
    <poster>http://www.kopis.or.kr/upload/pfmPoster/PF_PF250001.jpg</poster>
    <sty/>
    <genrenm>대중음악</genrenm>
    <prfstate>공연예정</prfstate>
    <visit>Y</visit>
    <festival>N</festival>
    <relates>
      <relate>
        <relatenm>쿠팡플레이</relatenm>
        <relateurl>https://tickets.example.com/coldplay</relateurl>
      </relate>
    </relates>
  </db>
</dbs>"#;

    fn detail() -> KopisDetail {
        let parsed: DetailResponse = quick_xml::de::from_str(DETAIL_XML).unwrap();
        parsed.items.into_iter().next().unwrap()
    }

    #[test]
    fn parses_detail_xml() {
        let detail = detail();
        assert_eq!(detail.code, "PF250001");
        assert_eq!(detail.cast, "콜드플레이");
        assert_eq!(detail.relates.as_ref().unwrap().items.len(), 1);
    }

    #[test]
    fn visit_flags_gate_concerts() {
        let mut detail = KopisDetail {
            title: "X".to_string(),
            cast: "Y".to_string(),
            visit: "Y".to_string(),
            festival: "N".to_string(),
            ..Default::default()
        };
        assert!(is_visit_concert(&detail));

        detail.festival = "Y".to_string();
        assert!(!is_visit_concert(&detail));

        detail.festival = "N".to_string();
        detail.visit = "N".to_string();
        assert!(!is_visit_concert(&detail));

        detail.visit = "Y".to_string();
        detail.cast = "  ".to_string();
        assert!(!is_visit_concert(&detail));
    }

    #[test]
    fn maps_detail_to_concert() {
        let concert = detail().to_concert();
        assert_eq!(concert.kopis_code, "PF250001");
        assert_eq!(concert.start_date, "2025-04-16");
        assert_eq!(concert.end_date, "2025-04-25");
        assert_eq!(concert.venue, "고양종합운동장 (주경기장)");
        assert_eq!(concert.label.as_deref(), Some("라이브네이션코리아"));
        assert_eq!(concert.introduction, None);
        assert_eq!(concert.ticket_site.as_deref(), Some("쿠팡플레이"));
        assert_eq!(concert.ticket_url.as_deref(), Some("https://tickets.example.com/coldplay"));
    }

    #[test]
    fn parses_listing_codes() {
        let xml = "<dbs><db><mt20id>PF1</mt20id><prfnm>A</prfnm></db><db><mt20id>PF2</mt20id></db></dbs>";
        let listing: ListResponse = quick_xml::de::from_str(xml).unwrap();
        let codes: Vec<_> = listing.items.into_iter().map(|i| i.code).collect();
        assert_eq!(codes, vec!["PF1", "PF2"]);
    }
}
