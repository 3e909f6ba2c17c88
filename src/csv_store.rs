//! CSV catalog files, one per entity.
//!
//! Files are UTF-8 with a BOM so spreadsheet tools open Korean text correctly. Writes
//! merge into what is already on disk, keyed on the first column, and the previous
//! file is copied to `backup/` first.

use crate::constants::*;
use crate::domain::{
    Artist, CollectionBatch, Concert, ConcertGenre, ConcertInfo, ConcertRow, ConcertSetlist, Culture, Merchandise,
    Schedule, Setlist, SetlistSong, Song,
};
use crate::error::{EtlError, Result};
use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BOM: &str = "\u{feff}";

/// A row type stored in its own catalog file.
pub trait CsvRecord: Serialize + DeserializeOwned {
    const FILE_NAME: &'static str;
}

macro_rules! csv_record {
    ($($ty:ty => $file:expr),* $(,)?) => {
        $(impl CsvRecord for $ty {
            const FILE_NAME: &'static str = $file;
        })*
    };
}

csv_record! {
    ConcertRow => CONCERTS_CSV,
    Artist => ARTISTS_CSV,
    Song => SONGS_CSV,
    Setlist => SETLISTS_CSV,
    SetlistSong => SETLIST_SONGS_CSV,
    ConcertSetlist => CONCERT_SETLISTS_CSV,
    Culture => CULTURES_CSV,
    Schedule => SCHEDULE_CSV,
    Merchandise => MD_CSV,
    ConcertInfo => CONCERT_INFO_CSV,
    ConcertGenre => CONCERT_GENRES_CSV,
}

/// Headers plus rows as column-name maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl RawTable {
    fn key_column(&self) -> Option<&str> {
        self.headers.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub file: String,
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
    pub backup: Option<PathBuf>,
}

pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn load<T: CsvRecord>(&self) -> Result<Vec<T>> {
        self.load_from(T::FILE_NAME)
    }

    /// Deserializes `file_name`; a missing file is an empty list.
    pub fn load_from<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>> {
        let path = self.path(file_name);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let content = read_without_bom(&path)?;
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
        debug!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(rows)
    }

    pub fn load_raw(&self, file_name: &str) -> Result<RawTable> {
        let path = self.path(file_name);
        if !path.is_file() {
            return Ok(RawTable::default());
        }
        parse_raw(&read_without_bom(&path)?)
    }

    pub fn merge<T: CsvRecord>(&self, rows: &[T]) -> Result<MergeReport> {
        self.merge_into(T::FILE_NAME, rows)
    }

    /// Merges `rows` into `file_name` by first-column key. Existing keys are replaced
    /// in place, new keys are appended, and columns only the old file has are kept.
    /// An empty incoming cell never blanks a filled one.
    pub fn merge_into<T: Serialize>(&self, file_name: &str, rows: &[T]) -> Result<MergeReport> {
        let mut report = MergeReport {
            file: file_name.to_string(),
            ..Default::default()
        };
        if rows.is_empty() {
            debug!("Nothing to write to {}", file_name);
            return Ok(report);
        }

        let incoming = to_raw(rows)?;
        let mut merged = self.load_raw(file_name)?;
        let key = match merged.key_column().or(incoming.key_column()) {
            Some(key) => key.to_string(),
            None => return Ok(report),
        };

        for header in &incoming.headers {
            if !merged.headers.contains(header) {
                merged.headers.push(header.clone());
            }
        }

        let mut positions: HashMap<String, usize> = merged
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.get(&key).map(|k| (k.clone(), i)))
            .collect();

        for row in incoming.rows {
            let row_key = row.get(&key).cloned().unwrap_or_default();
            match positions.get(&row_key) {
                Some(&pos) => {
                    let existing = &mut merged.rows[pos];
                    for (column, value) in row {
                        if value.is_empty() && existing.get(&column).is_some_and(|v| !v.is_empty()) {
                            continue;
                        }
                        existing.insert(column, value);
                    }
                    report.updated += 1;
                }
                None => {
                    positions.insert(row_key, merged.rows.len());
                    merged.rows.push(row);
                    report.inserted += 1;
                }
            }
        }

        report.backup = self.backup(file_name)?;
        self.write_raw(file_name, &merged)?;
        report.total = merged.rows.len();
        info!(
            "{}: {} inserted, {} updated, {} total",
            file_name, report.inserted, report.updated, report.total
        );
        Ok(report)
    }

    /// Copies the current file to `backup/<stem>_<YYYYmmdd_HHMMSS>.csv`.
    fn backup(&self, file_name: &str) -> Result<Option<PathBuf>> {
        let path = self.path(file_name);
        if !path.is_file() {
            return Ok(None);
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EtlError::Validation(format!("invalid csv file name {file_name}")))?;
        let backup_dir = self.dir.join(BACKUP_DIR);
        fs::create_dir_all(&backup_dir)?;
        let target = backup_dir.join(format!("{}_{}.csv", stem, Local::now().format("%Y%m%d_%H%M%S")));
        fs::copy(&path, &target)?;
        debug!("Backed up {} to {}", path.display(), target.display());
        Ok(Some(target))
    }

    fn write_raw(&self, file_name: &str, table: &RawTable) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = fs::File::create(self.path(file_name))?;
        file.write_all(BOM.as_bytes())?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(table.headers.iter().map(|h| row.get(h).map(String::as_str).unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes every catalog file for the batch, with concert status as of `today`.
    pub fn save_batch(&self, batch: &CollectionBatch, today: NaiveDate) -> Result<Vec<MergeReport>> {
        let concert_rows: Vec<ConcertRow> = batch.concerts.iter().map(|c| c.to_row(today)).collect();
        Ok(vec![
            self.merge(&concert_rows)?,
            self.merge(&batch.artists)?,
            self.merge(&batch.songs)?,
            self.merge(&batch.setlists)?,
            self.merge(&batch.setlist_songs)?,
            self.merge(&batch.concert_setlists)?,
            self.merge(&batch.cultures)?,
            self.merge(&batch.schedules)?,
            self.merge(&batch.merchandise)?,
            self.merge(&batch.infos)?,
            self.merge(&batch.genres)?,
        ])
    }

    /// Stage 1 output: raw KOPIS concerts before enrichment.
    pub fn save_kopis_concerts(&self, concerts: &[Concert], today: NaiveDate) -> Result<MergeReport> {
        let rows: Vec<ConcertRow> = concerts.iter().map(|c| c.to_row(today)).collect();
        self.merge_into(KOPIS_CONCERTS_CSV, &rows)
    }

    pub fn load_kopis_concerts(&self) -> Result<Vec<Concert>> {
        Ok(self
            .load_from::<ConcertRow>(KOPIS_CONCERTS_CSV)?
            .into_iter()
            .map(Concert::from)
            .collect())
    }
}

fn read_without_bom(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(match content.strip_prefix(BOM) {
        Some(rest) => rest.to_string(),
        None => content,
    })
}

fn parse_raw(content: &str) -> Result<RawTable> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect::<HashMap<_, _>>(),
        );
    }
    Ok(RawTable { headers, rows })
}

fn to_raw<T: Serialize>(rows: &[T]) -> Result<RawTable> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::Validation(format!("csv buffer: {}", e.error())))?;
    let content = String::from_utf8(bytes).map_err(|e| EtlError::Validation(format!("csv buffer: {e}")))?;
    parse_raw(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn song(title: &str, lyrics: Option<&str>) -> Song {
        let mut song = Song::new(title, "Coldplay");
        song.lyrics = lyrics.map(str::to_string);
        song
    }

    #[test]
    fn writes_bom_and_reads_it_back() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.merge(&[song("Yellow", Some("Look at the stars"))]).unwrap();

        let bytes = fs::read(store.path(SONGS_CSV)).unwrap();
        assert!(bytes.starts_with(BOM.as_bytes()));

        let songs: Vec<Song> = store.load().unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].lyrics.as_deref(), Some("Look at the stars"));
    }

    #[test]
    fn merging_the_same_rows_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let rows = vec![song("Yellow", None), song("Fix You", None)];

        let first = store.merge(&rows).unwrap();
        assert_eq!((first.inserted, first.updated, first.total), (2, 0, 2));
        assert!(first.backup.is_none());

        let second = store.merge(&rows).unwrap();
        assert_eq!((second.inserted, second.updated, second.total), (0, 2, 2));
        assert!(second.backup.unwrap().is_file());
        assert_eq!(store.load::<Song>().unwrap(), rows);
    }

    #[test]
    fn last_write_wins_in_original_position() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.merge(&[song("Yellow", None), song("Fix You", None)]).unwrap();
        store
            .merge(&[song("Clocks", None), song("Yellow", Some("updated"))])
            .unwrap();

        let songs: Vec<Song> = store.load().unwrap();
        let titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Yellow", "Fix You", "Clocks"]);
        assert_eq!(songs[0].lyrics.as_deref(), Some("updated"));
    }

    #[test]
    fn columns_only_in_the_old_file_are_kept() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let existing = song("Yellow", None);
        let legacy = format!(
            "{BOM}id,title,artist,lyrics,musixmatch_track_id,note\n{},Yellow,Coldplay,,,keep me\n",
            existing.id
        );
        fs::write(store.path(SONGS_CSV), legacy).unwrap();

        store.merge(&[song("Yellow", Some("la la"))]).unwrap();
        let raw = store.load_raw(SONGS_CSV).unwrap();
        assert_eq!(raw.headers.last().map(String::as_str), Some("note"));
        assert_eq!(raw.rows[0]["note"], "keep me");
        assert_eq!(raw.rows[0]["lyrics"], "la la");
    }

    #[test]
    fn empty_cells_keep_existing_values() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let mut full = song("Yellow", Some("Look at the stars"));
        full.musixmatch_track_id = Some(42);
        store.merge(&[full.clone()]).unwrap();

        let report = store.merge(&[Song::new("Yellow", "Coldplay")]).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(store.load::<Song>().unwrap(), vec![full]);
    }

    #[test]
    fn missing_files_load_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("nowhere"));
        assert!(store.load::<Artist>().unwrap().is_empty());
        assert!(store.load_raw(ARTISTS_CSV).unwrap().is_empty());
    }
}
