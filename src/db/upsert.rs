//! Declarative CSV-to-table upserts.
//!
//! A `TableSpec` lists which CSV column feeds which table column. Foreign-key columns
//! carry the referenced record's uuid in the CSV and are swapped for the referenced
//! row's numeric id before insert.

use crate::csv_store::{CsvStore, RawTable};
use crate::db::tables::ALL_TABLES;
use crate::error::Result;
use sqlx::mysql::MySqlConnection;
use sqlx::Connection;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnMap {
    Value {
        csv: &'static str,
        db: &'static str,
    },
    ForeignKey {
        csv: &'static str,
        db: &'static str,
        ref_table: &'static str,
        ref_key: &'static str,
    },
}

impl ColumnMap {
    pub const fn value(csv: &'static str, db: &'static str) -> Self {
        ColumnMap::Value { csv, db }
    }

    pub const fn foreign_key(csv: &'static str, db: &'static str, ref_table: &'static str) -> Self {
        ColumnMap::ForeignKey {
            csv,
            db,
            ref_table,
            ref_key: "uuid",
        }
    }

    pub fn csv(&self) -> &'static str {
        match self {
            ColumnMap::Value { csv, .. } | ColumnMap::ForeignKey { csv, .. } => csv,
        }
    }

    pub fn db(&self) -> &'static str {
        match self {
            ColumnMap::Value { db, .. } | ColumnMap::ForeignKey { db, .. } => db,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSpec {
    pub table: &'static str,
    pub csv_file: &'static str,
    /// Table columns of the unique key; never updated.
    pub key_columns: &'static [&'static str],
    pub columns: &'static [ColumnMap],
}

impl TableSpec {
    fn foreign_keys(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.columns.iter().filter_map(|c| match c {
            ColumnMap::ForeignKey { ref_table, ref_key, .. } => Some((*ref_table, *ref_key)),
            ColumnMap::Value { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    pub table: String,
    pub upserted: usize,
    pub skipped: usize,
}

/// `INSERT ... ON DUPLICATE KEY UPDATE col = VALUES(col)` over every non-key column.
pub fn build_upsert_sql(spec: &TableSpec) -> String {
    let columns: Vec<String> = spec.columns.iter().map(|c| format!("`{}`", c.db())).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut updates: Vec<String> = spec
        .columns
        .iter()
        .map(ColumnMap::db)
        .filter(|db| !spec.key_columns.contains(db))
        .map(|db| format!("`{db}` = VALUES(`{db}`)"))
        .collect();
    if updates.is_empty() {
        if let Some(key) = spec.key_columns.first() {
            updates.push(format!("`{key}` = `{key}`"));
        }
    }
    format!(
        "INSERT INTO `{}` ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
        spec.table,
        columns.join(", "),
        placeholders,
        updates.join(", ")
    )
}

/// A value ready to bind, in column order.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(Option<String>),
    Id(Option<i64>),
}

pub type ForeignKeyMaps = HashMap<(&'static str, &'static str), HashMap<String, i64>>;

/// Maps one CSV row onto bind values. A non-empty foreign key that does not resolve
/// returns `Err` naming the column.
pub fn resolve_row(
    spec: &TableSpec,
    row: &HashMap<String, String>,
    fk_maps: &ForeignKeyMaps,
) -> std::result::Result<Vec<BindValue>, String> {
    spec.columns
        .iter()
        .map(|column| {
            let raw = row.get(column.csv()).map(|v| v.trim()).filter(|v| !v.is_empty());
            match column {
                ColumnMap::Value { .. } => Ok(BindValue::Text(raw.map(str::to_string))),
                ColumnMap::ForeignKey { csv, ref_table, ref_key, .. } => match raw {
                    None => Ok(BindValue::Id(None)),
                    Some(value) => fk_maps
                        .get(&(*ref_table, *ref_key))
                        .and_then(|map| map.get(value))
                        .map(|id| BindValue::Id(Some(*id)))
                        .ok_or_else(|| format!("{csv}={value} not found in {ref_table}")),
                },
            }
        })
        .collect()
}

async fn load_fk_map(conn: &mut MySqlConnection, ref_table: &str, ref_key: &str) -> Result<HashMap<String, i64>> {
    let sql = format!("SELECT CAST(`{ref_key}` AS CHAR), CAST(`id` AS SIGNED) FROM `{ref_table}`");
    let pairs: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
    Ok(pairs.into_iter().collect())
}

/// Upserts `rows` in one transaction. Rows with unresolvable foreign keys are skipped.
#[instrument(skip_all, fields(table = spec.table))]
pub async fn upsert_table(conn: &mut MySqlConnection, spec: &TableSpec, rows: &RawTable) -> Result<UpsertReport> {
    let mut report = UpsertReport {
        table: spec.table.to_string(),
        ..Default::default()
    };

    let mut fk_maps: ForeignKeyMaps = HashMap::new();
    for (ref_table, ref_key) in spec.foreign_keys() {
        if !fk_maps.contains_key(&(ref_table, ref_key)) {
            let map = load_fk_map(conn, ref_table, ref_key).await?;
            fk_maps.insert((ref_table, ref_key), map);
        }
    }

    let sql = build_upsert_sql(spec);
    let mut tx = conn.begin().await?;
    for row in &rows.rows {
        let values = match resolve_row(spec, row, &fk_maps) {
            Ok(values) => values,
            Err(reason) => {
                warn!("Skipping {} row: {}", spec.table, reason);
                report.skipped += 1;
                continue;
            }
        };
        let mut query = sqlx::query(&sql);
        for value in values {
            query = match value {
                BindValue::Text(text) => query.bind(text),
                BindValue::Id(id) => query.bind(id),
            };
        }
        query.execute(&mut *tx).await?;
        report.upserted += 1;
    }
    tx.commit().await?;

    info!("{}: {} upserted, {} skipped", spec.table, report.upserted, report.skipped);
    Ok(report)
}

/// Loads every table in dependency order from the CSV store.
pub async fn upsert_all(conn: &mut MySqlConnection, store: &CsvStore) -> Result<Vec<UpsertReport>> {
    let mut reports = Vec::with_capacity(ALL_TABLES.len());
    for spec in ALL_TABLES {
        let rows = store.load_raw(spec.csv_file)?;
        if rows.is_empty() {
            info!("{}: no rows in {}", spec.table, spec.csv_file);
            continue;
        }
        reports.push(upsert_table(conn, spec, &rows).await?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGS: TableSpec = TableSpec {
        table: "concert_genres",
        csv_file: "concert_genres.csv",
        key_columns: &["uuid"],
        columns: &[
            ColumnMap::value("id", "uuid"),
            ColumnMap::foreign_key("concert_id", "concert_id", "concerts"),
            ColumnMap::value("genre", "genre"),
        ],
    };

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn builds_upsert_statement() {
        assert_eq!(
            build_upsert_sql(&TAGS),
            "INSERT INTO `concert_genres` (`uuid`, `concert_id`, `genre`) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE `concert_id` = VALUES(`concert_id`), `genre` = VALUES(`genre`)"
        );
    }

    #[test]
    fn key_only_tables_still_produce_valid_sql() {
        const KEY_ONLY: &[ColumnMap] = &[ColumnMap::value("id", "uuid")];
        let spec = TableSpec {
            columns: KEY_ONLY,
            ..TAGS
        };
        assert!(build_upsert_sql(&spec).ends_with("ON DUPLICATE KEY UPDATE `uuid` = `uuid`"));
    }

    #[test]
    fn resolves_foreign_keys_and_nulls() {
        let mut fk_maps: ForeignKeyMaps = HashMap::new();
        fk_maps.insert(("concerts", "uuid"), HashMap::from([("c-1".to_string(), 42)]));

        let values = resolve_row(&TAGS, &row(&[("id", "g-1"), ("concert_id", "c-1"), ("genre", "ROCK_METAL")]), &fk_maps);
        assert_eq!(
            values.unwrap(),
            vec![
                BindValue::Text(Some("g-1".to_string())),
                BindValue::Id(Some(42)),
                BindValue::Text(Some("ROCK_METAL".to_string())),
            ]
        );

        let values = resolve_row(&TAGS, &row(&[("id", "g-2"), ("concert_id", ""), ("genre", " ")]), &fk_maps).unwrap();
        assert_eq!(values[1], BindValue::Id(None));
        assert_eq!(values[2], BindValue::Text(None));
    }

    #[test]
    fn unresolved_foreign_key_is_reported() {
        let fk_maps: ForeignKeyMaps = HashMap::from([(("concerts", "uuid"), HashMap::new())]);
        let err = resolve_row(&TAGS, &row(&[("id", "g-1"), ("concert_id", "missing")]), &fk_maps).unwrap_err();
        assert!(err.contains("concert_id=missing"));
    }
}
