//! Catalog records shared by every pipeline stage.
//!
//! Each record carries a surrogate `id` derived from its natural key, so records
//! referencing each other do so by id instead of by title strings. Field order is the
//! CSV column order and the first column is always the merge key.

use crate::dates::{compute_status, ConcertStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod ids {
    use once_cell::sync::Lazy;
    use uuid::Uuid;

    static NAMESPACE: Lazy<Uuid> =
        Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"https://catalog.concert-etl/"));

    /// Lowercases, trims and collapses whitespace so cosmetic differences map to one id.
    pub fn normalize_key(part: &str) -> String {
        part.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }

    pub fn derive(kind: &str, parts: &[&str]) -> Uuid {
        let mut name = String::from(kind);
        for part in parts {
            name.push('\u{1f}');
            name.push_str(&normalize_key(part));
        }
        Uuid::new_v5(&NAMESPACE, name.as_bytes())
    }

    pub fn concert(kopis_code: &str) -> Uuid {
        derive("concert", &[kopis_code])
    }

    pub fn artist(name: &str) -> Uuid {
        derive("artist", &[name])
    }

    pub fn song(title: &str, artist: &str) -> Uuid {
        derive("song", &[title, artist])
    }

    pub fn child(kind: &str, parent: &Uuid, parts: &[&str]) -> Uuid {
        let parent = parent.to_string();
        let mut all = vec![parent.as_str()];
        all.extend_from_slice(parts);
        derive(kind, &all)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetlistKind {
    Expected,
    Past,
}

impl SetlistKind {
    pub fn for_status(status: ConcertStatus) -> Self {
        match status {
            ConcertStatus::Past => SetlistKind::Past,
            _ => SetlistKind::Expected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SetlistKind::Expected => "EXPECTED",
            SetlistKind::Past => "PAST",
        }
    }
}

/// A concert as fetched from KOPIS and enriched later. Status is derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concert {
    pub id: Uuid,
    pub kopis_code: String,
    pub title: String,
    pub artist: String,
    pub artist_id: Option<Uuid>,
    pub start_date: String,
    pub end_date: String,
    pub venue: String,
    pub poster: Option<String>,
    pub ticket_site: Option<String>,
    pub ticket_url: Option<String>,
    pub label: Option<String>,
    pub introduction: Option<String>,
    pub genre: Option<String>,
}

/// `concerts.csv` row: the concert plus its status as of the write date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcertRow {
    pub id: Uuid,
    pub kopis_code: String,
    pub title: String,
    pub artist: String,
    pub artist_id: Option<Uuid>,
    pub start_date: String,
    pub end_date: String,
    pub status: ConcertStatus,
    pub venue: String,
    pub poster: Option<String>,
    pub ticket_site: Option<String>,
    pub ticket_url: Option<String>,
    pub label: Option<String>,
    pub introduction: Option<String>,
    pub genre: Option<String>,
}

impl Concert {
    pub fn new(kopis_code: &str, title: &str) -> Self {
        Self {
            id: ids::concert(kopis_code),
            kopis_code: kopis_code.to_string(),
            title: title.to_string(),
            artist: String::new(),
            artist_id: None,
            start_date: String::new(),
            end_date: String::new(),
            venue: String::new(),
            poster: None,
            ticket_site: None,
            ticket_url: None,
            label: None,
            introduction: None,
            genre: None,
        }
    }

    pub fn status(&self, today: NaiveDate) -> ConcertStatus {
        compute_status(today, &self.start_date, &self.end_date)
    }

    pub fn set_artist(&mut self, name: &str) {
        self.artist = name.to_string();
        self.artist_id = Some(ids::artist(name));
    }

    pub fn to_row(&self, today: NaiveDate) -> ConcertRow {
        ConcertRow {
            id: self.id,
            kopis_code: self.kopis_code.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artist_id: self.artist_id,
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            status: self.status(today),
            venue: self.venue.clone(),
            poster: self.poster.clone(),
            ticket_site: self.ticket_site.clone(),
            ticket_url: self.ticket_url.clone(),
            label: self.label.clone(),
            introduction: self.introduction.clone(),
            genre: self.genre.clone(),
        }
    }
}

impl From<ConcertRow> for Concert {
    /// Drops the persisted status; it is recomputed whenever needed.
    fn from(row: ConcertRow) -> Self {
        Self {
            id: row.id,
            kopis_code: row.kopis_code,
            title: row.title,
            artist: row.artist,
            artist_id: row.artist_id,
            start_date: row.start_date,
            end_date: row.end_date,
            venue: row.venue,
            poster: row.poster,
            ticket_site: row.ticket_site,
            ticket_url: row.ticket_url,
            label: row.label,
            introduction: row.introduction,
            genre: row.genre,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    /// Display name, often "Native (Korean)".
    pub artist: String,
    pub debut_date: Option<String>,
    pub category: Option<String>,
    pub detail: Option<String>,
    pub instagram_url: Option<String>,
    /// Comma separated.
    pub keywords: Option<String>,
    pub img_url: Option<String>,
}

impl Artist {
    pub fn new(name: &str) -> Self {
        Self {
            id: ids::artist(name),
            artist: name.to_string(),
            debut_date: None,
            category: None,
            detail: None,
            instagram_url: None,
            keywords: None,
            img_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub lyrics: Option<String>,
    pub musixmatch_track_id: Option<u64>,
}

impl Song {
    pub fn new(title: &str, artist: &str) -> Self {
        Self {
            id: ids::song(title, artist),
            title: title.to_string(),
            artist: artist.to_string(),
            lyrics: None,
            musixmatch_track_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setlist {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub start_date: String,
    pub end_date: String,
    pub venue: String,
    pub img_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetlistSong {
    pub id: Uuid,
    pub setlist_id: Uuid,
    pub song_id: Uuid,
    pub setlist_title: String,
    pub song_title: String,
    pub order_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcertSetlist {
    pub id: Uuid,
    pub concert_id: Uuid,
    pub setlist_id: Uuid,
    pub concert_title: String,
    pub setlist_title: String,
    #[serde(rename = "type")]
    pub kind: SetlistKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Culture {
    pub id: Uuid,
    pub concert_id: Uuid,
    pub concert_title: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub concert_id: Uuid,
    pub concert_title: String,
    pub category: String,
    pub scheduled_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchandise {
    pub id: Uuid,
    pub concert_id: Uuid,
    pub concert_title: String,
    pub name: String,
    pub price: Option<String>,
    pub img_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcertInfo {
    pub id: Uuid,
    pub concert_id: Uuid,
    pub concert_title: String,
    pub category: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcertGenre {
    pub id: Uuid,
    pub concert_id: Uuid,
    pub concert_title: String,
    pub genre: String,
}

/// A setlist attached to one concert, with its ordered songs.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedSetlist {
    pub setlist: Setlist,
    pub link: ConcertSetlist,
    pub entries: Vec<SetlistSong>,
    pub songs: Vec<Song>,
}

impl CollectedSetlist {
    /// Builds the setlist, its concert link and song rows from ordered song titles.
    pub fn build(concert: &Concert, kind: SetlistKind, titles: &[String]) -> Self {
        let setlist_title = match kind {
            SetlistKind::Expected => format!("{} 예상 셋리스트", concert.title),
            SetlistKind::Past => format!("{} 셋리스트", concert.title),
        };
        let setlist_id = ids::child("setlist", &concert.id, &[kind.as_str()]);
        let setlist = Setlist {
            id: setlist_id,
            title: setlist_title.clone(),
            artist: concert.artist.clone(),
            start_date: concert.start_date.clone(),
            end_date: concert.end_date.clone(),
            venue: concert.venue.clone(),
            img_url: concert.poster.clone(),
        };
        let link = ConcertSetlist {
            id: ids::child("concert_setlist", &concert.id, &[&setlist_id.to_string()]),
            concert_id: concert.id,
            setlist_id,
            concert_title: concert.title.clone(),
            setlist_title: setlist_title.clone(),
            kind,
        };

        let mut songs = Vec::with_capacity(titles.len());
        let mut entries = Vec::with_capacity(titles.len());
        for (index, title) in titles.iter().enumerate() {
            let song = Song::new(title, &concert.artist);
            let order_index = index as u32 + 1;
            entries.push(SetlistSong {
                id: ids::child("setlist_song", &setlist_id, &[&order_index.to_string()]),
                setlist_id,
                song_id: song.id,
                setlist_title: setlist_title.clone(),
                song_title: song.title.clone(),
                order_index,
            });
            songs.push(song);
        }

        Self { setlist, link, entries, songs }
    }
}

/// Everything collected for one concert in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedConcert {
    pub concert: Concert,
    pub artist: Option<Artist>,
    pub setlist: Option<CollectedSetlist>,
    pub cultures: Vec<Culture>,
    pub schedules: Vec<Schedule>,
    pub merchandise: Vec<Merchandise>,
    pub infos: Vec<ConcertInfo>,
    pub genres: Vec<ConcertGenre>,
}

impl CollectedConcert {
    pub fn new(concert: Concert) -> Self {
        Self {
            concert,
            artist: None,
            setlist: None,
            cultures: Vec::new(),
            schedules: Vec::new(),
            merchandise: Vec::new(),
            infos: Vec::new(),
            genres: Vec::new(),
        }
    }
}

/// Records of one run grouped per output file. Shared records (artists, songs) are
/// de-duplicated by id, last write wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionBatch {
    pub concerts: Vec<Concert>,
    pub artists: Vec<Artist>,
    pub songs: Vec<Song>,
    pub setlists: Vec<Setlist>,
    pub setlist_songs: Vec<SetlistSong>,
    pub concert_setlists: Vec<ConcertSetlist>,
    pub cultures: Vec<Culture>,
    pub schedules: Vec<Schedule>,
    pub merchandise: Vec<Merchandise>,
    pub infos: Vec<ConcertInfo>,
    pub genres: Vec<ConcertGenre>,
}

impl CollectionBatch {
    pub fn push(&mut self, collected: CollectedConcert) {
        upsert_by_id(&mut self.concerts, collected.concert, |c| c.id);
        if let Some(artist) = collected.artist {
            upsert_by_id(&mut self.artists, artist, |a| a.id);
        }
        if let Some(setlist) = collected.setlist {
            upsert_by_id(&mut self.setlists, setlist.setlist, |s| s.id);
            upsert_by_id(&mut self.concert_setlists, setlist.link, |l| l.id);
            for entry in setlist.entries {
                upsert_by_id(&mut self.setlist_songs, entry, |e| e.id);
            }
            for song in setlist.songs {
                upsert_by_id(&mut self.songs, song, |s| s.id);
            }
        }
        self.cultures.extend(collected.cultures);
        self.schedules.extend(collected.schedules);
        self.merchandise.extend(collected.merchandise);
        self.infos.extend(collected.infos);
        self.genres.extend(collected.genres);
    }

    pub fn is_empty(&self) -> bool {
        self.concerts.is_empty()
    }
}

fn upsert_by_id<T, F>(items: &mut Vec<T>, item: T, key: F)
where
    F: Fn(&T) -> Uuid,
{
    let id = key(&item);
    match items.iter().position(|existing| key(existing) == id) {
        Some(pos) => items[pos] = item,
        None => items.push(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concert() -> Concert {
        let mut concert = Concert::new("PF250001", "Coldplay Live in Seoul");
        concert.set_artist("Coldplay (콜드플레이)");
        concert.start_date = "2025-04-16".to_string();
        concert.end_date = "2025-04-25".to_string();
        concert.venue = "고양종합운동장".to_string();
        concert
    }

    #[test]
    fn ids_ignore_case_and_spacing() {
        assert_eq!(ids::artist("Coldplay"), ids::artist("  coldplay "));
        assert_ne!(ids::song("Yellow", "Coldplay"), ids::song("Fix You", "Coldplay"));
    }

    #[test]
    fn status_is_computed_not_stored() {
        let concert = concert();
        let before = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        assert_eq!(concert.to_row(before).status, ConcertStatus::Upcoming);
        assert_eq!(concert.to_row(after).status, ConcertStatus::Past);
        assert_eq!(Concert::from(concert.to_row(after)), concert);
    }

    #[test]
    fn setlist_songs_reference_song_ids() {
        let concert = concert();
        let titles = vec!["Yellow".to_string(), "Fix You".to_string()];
        let built = CollectedSetlist::build(&concert, SetlistKind::Expected, &titles);
        assert_eq!(built.entries.len(), 2);
        assert_eq!(built.entries[1].order_index, 2);
        assert_eq!(built.entries[1].song_id, built.songs[1].id);
        assert_eq!(built.link.concert_id, concert.id);
        assert_eq!(built.link.setlist_id, built.setlist.id);
    }

    #[test]
    fn batch_deduplicates_shared_songs() {
        let concert = concert();
        let titles = vec!["Yellow".to_string()];
        let mut first = CollectedConcert::new(concert.clone());
        first.setlist = Some(CollectedSetlist::build(&concert, SetlistKind::Expected, &titles));
        let second = first.clone();

        let mut batch = CollectionBatch::default();
        batch.push(first);
        batch.push(second);
        assert_eq!(batch.concerts.len(), 1);
        assert_eq!(batch.songs.len(), 1);
        assert_eq!(batch.setlist_songs.len(), 1);
    }
}
