//! Date cache (spec.md §4.5): one bulk query per entity family against the
//! external relational DB, snapshotted into a columnar store keyed by
//! accession for random access during JSONL emission.

use std::path::Path;

use chrono::NaiveDateTime;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::{Nullable, Text, Timestamp};
use diesel::{sql_query, PgConnection, QueryableByName, RunQueryDsl};
use duckdb::{params, Connection};

use crate::errors::Error;

const SCHEMA: &str = "
CREATE TABLE date_cache (
    accession    TEXT NOT NULL PRIMARY KEY,
    date_created  TIMESTAMP,
    date_modified TIMESTAMP,
    date_published TIMESTAMP
);
";

#[derive(QueryableByName, Debug, Clone)]
struct DateRow {
    #[diesel(sql_type = Text)]
    accession: String,
    #[diesel(sql_type = Nullable<Timestamp>)]
    date_created: Option<NaiveDateTime>,
    #[diesel(sql_type = Nullable<Timestamp>)]
    date_modified: Option<NaiveDateTime>,
    #[diesel(sql_type = Nullable<Timestamp>)]
    date_published: Option<NaiveDateTime>,
}

/// One bulk query per family, matching spec.md §4.5 "Runs one bulk query per
/// entity family". The query text is intentionally the caller's
/// responsibility (families differ in which upstream table holds their
/// dates); this keeps the date cache builder source-agnostic.
pub const BIOPROJECT_QUERY: &str = "SELECT accession, date_created, date_modified, date_published FROM bioproject_dates";
pub const BIOSAMPLE_QUERY: &str = "SELECT accession, date_created, date_modified, date_published FROM biosample_dates";

/// Builds the cache store from one or more family queries run against
/// `postgres_url`. Connection failures raise `CRITICAL` (spec.md §4.5).
pub fn build(postgres_url: &str, queries: &[&str], store_path: &Path) -> Result<usize, Error> {
    let manager = ConnectionManager::<PgConnection>::new(postgres_url);
    let pool = Pool::builder()
        .build(manager)
        .map_err(|e| Error::Critical(format!("could not connect to date source: {e}")))?;
    let mut conn = pool.get()?;

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = store_path.with_extension("tmp");
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    let duck = Connection::open(&tmp_path)?;
    duck.execute_batch(SCHEMA)?;
    let mut total = 0usize;
    {
        let mut appender = duck.appender("date_cache")?;
        for query in queries {
            let rows: Vec<DateRow> = sql_query(*query).load(&mut conn).map_err(Error::Database)?;
            for row in rows {
                appender.append_row(params![
                    row.accession,
                    row.date_created,
                    row.date_modified,
                    row.date_published,
                ])?;
                total += 1;
            }
        }
        appender.flush()?;
    }
    drop(duck);

    if store_path.exists() {
        std::fs::remove_file(store_path)?;
    }
    std::fs::rename(&tmp_path, store_path)?;
    Ok(total)
}

/// `(dateCreated, dateModified, datePublished)` for one accession.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedDates {
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub published: Option<NaiveDateTime>,
}

/// Read-only handle over a built date cache store. JSONL emitters fail fast
/// (spec.md §4.5) if this store is missing or older than the current run;
/// that freshness check is the caller's responsibility (compare mtimes),
/// since it requires knowing the run's start time.
pub struct DateCache {
    conn: Connection,
}

impl DateCache {
    pub fn open(store_path: &Path) -> Result<DateCache, Error> {
        if !store_path.exists() {
            return Err(Error::Lookup(crate::errors::LookupError::StaleDateCache));
        }
        let conn = Connection::open(store_path)?;
        Ok(DateCache { conn })
    }

    /// Date-cache values, when present, override anything derivable from the
    /// XML (spec.md I5, P5).
    pub fn lookup(&self, accession: &str) -> Result<Option<CachedDates>, Error> {
        let result = self.conn.query_row(
            "SELECT date_created, date_modified, date_published FROM date_cache WHERE accession = ?",
            params![accession],
            |row| {
                Ok(CachedDates {
                    created: row.get(0)?,
                    modified: row.get(1)?,
                    published: row.get(2)?,
                })
            },
        );
        match result {
            Ok(dates) => Ok(Some(dates)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Store(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_store_is_stale() {
        let dir = tempdir().unwrap();
        let err = DateCache::open(&dir.path().join("missing.store")).unwrap_err();
        assert!(matches!(err, Error::Lookup(crate::errors::LookupError::StaleDateCache)));
    }

    #[test]
    fn lookup_overrides_are_independent_of_xml() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("bp_bs_date.store");
        let conn = Connection::open(&store_path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO date_cache VALUES (?, ?, ?, ?)",
            params![
                "PRJNA001",
                NaiveDateTime::parse_from_str("2026-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
                NaiveDateTime::parse_from_str("2026-02-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
                Option::<NaiveDateTime>::None,
            ],
        )
        .unwrap();
        drop(conn);

        let cache = DateCache::open(&store_path).unwrap();
        let dates = cache.lookup("PRJNA001").unwrap().unwrap();
        assert_eq!(dates.modified.unwrap().format("%Y-%m").to_string(), "2026-02");
        assert!(cache.lookup("PRJNA002").unwrap().is_none());
    }
}
