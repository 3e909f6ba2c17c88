//! Table declarations, listed in load order: a table only references tables above it.
//!
//! Every table has an auto-increment `id` and a unique `uuid` holding the catalog id.

use crate::constants::*;
use crate::db::upsert::{ColumnMap, TableSpec};

const UUID_KEY: &[&str] = &["uuid"];

pub const ARTISTS: TableSpec = TableSpec {
    table: "artists",
    csv_file: ARTISTS_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::value("artist", "artist"),
        ColumnMap::value("debut_date", "debut_date"),
        ColumnMap::value("category", "category"),
        ColumnMap::value("detail", "detail"),
        ColumnMap::value("instagram_url", "instagram_url"),
        ColumnMap::value("keywords", "keywords"),
        ColumnMap::value("img_url", "img_url"),
    ],
};

pub const CONCERTS: TableSpec = TableSpec {
    table: "concerts",
    csv_file: CONCERTS_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::value("kopis_code", "code"),
        ColumnMap::value("title", "title"),
        ColumnMap::value("artist", "artist"),
        ColumnMap::foreign_key("artist_id", "artist_id", "artists"),
        ColumnMap::value("start_date", "start_date"),
        ColumnMap::value("end_date", "end_date"),
        ColumnMap::value("status", "status"),
        ColumnMap::value("venue", "venue"),
        ColumnMap::value("poster", "poster"),
        ColumnMap::value("ticket_site", "ticket_site"),
        ColumnMap::value("ticket_url", "ticket_url"),
        ColumnMap::value("label", "label"),
        ColumnMap::value("introduction", "introduction"),
        ColumnMap::value("genre", "genre"),
    ],
};

pub const SONGS: TableSpec = TableSpec {
    table: "songs",
    csv_file: SONGS_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::value("title", "title"),
        ColumnMap::value("artist", "artist"),
        ColumnMap::value("lyrics", "lyrics"),
        ColumnMap::value("musixmatch_track_id", "musixmatch_track_id"),
    ],
};

pub const SETLISTS: TableSpec = TableSpec {
    table: "setlists",
    csv_file: SETLISTS_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::value("title", "title"),
        ColumnMap::value("artist", "artist"),
        ColumnMap::value("start_date", "start_date"),
        ColumnMap::value("end_date", "end_date"),
        ColumnMap::value("venue", "venue"),
        ColumnMap::value("img_url", "img_url"),
    ],
};

pub const SETLIST_SONGS: TableSpec = TableSpec {
    table: "setlist_songs",
    csv_file: SETLIST_SONGS_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("setlist_id", "setlist_id", "setlists"),
        ColumnMap::foreign_key("song_id", "song_id", "songs"),
        ColumnMap::value("setlist_title", "setlist_title"),
        ColumnMap::value("song_title", "song_title"),
        ColumnMap::value("order_index", "order_index"),
    ],
};

pub const CONCERT_SETLISTS: TableSpec = TableSpec {
    table: "concert_setlists",
    csv_file: CONCERT_SETLISTS_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
        ColumnMap::foreign_key("setlist_id", "setlist_id", "setlists"),
        ColumnMap::value("concert_title", "concert_title"),
        ColumnMap::value("setlist_title", "setlist_title"),
        ColumnMap::value("type", "type"),
    ],
};

pub const CULTURES: TableSpec = TableSpec {
    table: "cultures",
    csv_file: CULTURES_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
        ColumnMap::value("concert_title", "concert_title"),
        ColumnMap::value("title", "title"),
        ColumnMap::value("content", "content"),
    ],
};

pub const SCHEDULE: TableSpec = TableSpec {
    table: "schedule",
    csv_file: SCHEDULE_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
        ColumnMap::value("concert_title", "concert_title"),
        ColumnMap::value("category", "category"),
        ColumnMap::value("scheduled_at", "scheduled_at"),
    ],
};

pub const MD: TableSpec = TableSpec {
    table: "md",
    csv_file: MD_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
        ColumnMap::value("concert_title", "concert_title"),
        ColumnMap::value("name", "item_name"),
        ColumnMap::value("price", "price"),
        ColumnMap::value("img_url", "img_url"),
    ],
};

pub const CONCERT_INFO: TableSpec = TableSpec {
    table: "concert_info",
    csv_file: CONCERT_INFO_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
        ColumnMap::value("concert_title", "concert_title"),
        ColumnMap::value("category", "category"),
        ColumnMap::value("content", "content"),
    ],
};

pub const CONCERT_GENRES: TableSpec = TableSpec {
    table: "concert_genres",
    csv_file: CONCERT_GENRES_CSV,
    key_columns: UUID_KEY,
    columns: &[
        ColumnMap::value("id", "uuid"),
        ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
        ColumnMap::value("concert_title", "concert_title"),
        ColumnMap::value("genre", "genre"),
    ],
};

pub const ALL_TABLES: &[TableSpec] = &[
    ARTISTS,
    CONCERTS,
    SONGS,
    SETLISTS,
    SETLIST_SONGS,
    CONCERT_SETLISTS,
    CULTURES,
    SCHEDULE,
    MD,
    CONCERT_INFO,
    CONCERT_GENRES,
];

pub fn find_table(name: &str) -> Option<&'static TableSpec> {
    ALL_TABLES.iter().find(|spec| spec.table == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CollectedSetlist, CollectionBatch, Concert, SetlistKind};
    use crate::csv_store::CsvStore;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn foreign_keys_point_at_earlier_tables() {
        for (i, spec) in ALL_TABLES.iter().enumerate() {
            for column in spec.columns {
                if let ColumnMap::ForeignKey { ref_table, .. } = column {
                    let target = ALL_TABLES.iter().position(|t| t.table == *ref_table).unwrap();
                    assert!(target < i, "{} references {} which loads later", spec.table, ref_table);
                }
            }
        }
    }

    #[test]
    fn csv_columns_exist_in_written_files() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let mut concert = Concert::new("PF1", "Keane Live");
        concert.set_artist("Keane");
        let titles: Vec<String> = ["Somewhere Only We Know"].iter().map(|s| s.to_string()).collect();
        let mut collected = crate::domain::CollectedConcert::new(concert.clone());
        collected.setlist = Some(CollectedSetlist::build(&concert, SetlistKind::Expected, &titles));
        collected.artist = Some(crate::domain::Artist::new("Keane"));
        let mut batch = CollectionBatch::default();
        batch.push(collected);
        store
            .save_batch(&batch, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .unwrap();

        for spec in [&ARTISTS, &CONCERTS, &SONGS, &SETLISTS, &SETLIST_SONGS, &CONCERT_SETLISTS] {
            let raw = store.load_raw(spec.csv_file).unwrap();
            for column in spec.columns {
                assert!(
                    raw.headers.iter().any(|h| h == column.csv()),
                    "{} lacks column {}",
                    spec.csv_file,
                    column.csv()
                );
            }
        }
    }

    #[test]
    fn finds_tables_by_name() {
        assert_eq!(find_table("md").map(|t| t.csv_file), Some(MD_CSV));
        assert!(find_table("tickets").is_none());
    }
}
