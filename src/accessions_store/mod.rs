//! Columnar on-disk store loaded from the daily SRA/DRA accessions tables
//! (spec.md §4.3). Backed by DuckDB (SPEC_FULL.md §3.1): bulk load via
//! `Appender`, point/range lookups via prepared statements.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};

use crate::accession::AccessionType;
use crate::errors::Error;

/// One row of the source tab file, trimmed to the columns the spec names
/// (spec.md §3 "Accessions store"): `Accession, Submission, Study,
/// Experiment, Sample, Analysis, Run, Type, Updated, Published`.
#[derive(Debug, Clone)]
pub struct AccessionRow {
    pub accession: String,
    pub submission: Option<String>,
    pub study: Option<String>,
    pub experiment: Option<String>,
    pub sample: Option<String>,
    pub analysis: Option<String>,
    pub run: Option<String>,
    pub kind: String,
    pub updated: Option<NaiveDateTime>,
    pub published: Option<NaiveDateTime>,
}

const SCHEMA: &str = "
CREATE TABLE accessions (
    accession  TEXT NOT NULL PRIMARY KEY,
    submission TEXT,
    study      TEXT,
    experiment TEXT,
    sample     TEXT,
    analysis   TEXT,
    run        TEXT,
    kind       TEXT,
    updated    TIMESTAMP,
    published  TIMESTAMP
);
CREATE INDEX idx_accessions_submission ON accessions(submission);
CREATE INDEX idx_accessions_updated ON accessions(updated);
";

/// Reads one NCBI/DDBJ-style `SRA_Accessions.tab` shard into rows. Columns are
/// matched by header name so NCBI and DRA variants (which differ in column
/// order) both load correctly.
pub fn read_tab(path: &Path) -> Result<Vec<AccessionRow>, Error> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let (ia, is, ist, ie, isa, ian, ir, ik, iu, ip) = (
        col("Accession"),
        col("Submission"),
        col("Study"),
        col("Experiment"),
        col("Sample"),
        col("Analysis"),
        col("Run"),
        col("Type"),
        col("Updated"),
        col("Published"),
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i)).map(str::trim).filter(|s| !s.is_empty() && *s != "-").map(String::from)
        };
        let accession = match get(ia) {
            Some(a) => a,
            None => continue,
        };
        rows.push(AccessionRow {
            accession,
            submission: get(is),
            study: get(ist),
            experiment: get(ie),
            sample: get(isa),
            analysis: get(ian),
            run: get(ir),
            kind: get(ik).unwrap_or_default(),
            updated: get(iu).and_then(|s| parse_timestamp(&s)),
            published: get(ip).and_then(|s| parse_timestamp(&s)),
        });
    }
    Ok(rows)
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| raw.parse::<chrono::NaiveDate>().map(|d| d.and_hms_opt(0, 0, 0).unwrap()))
        .ok()
}

/// Builds (or rebuilds — existing store files for the same date are
/// overwritten) the store from one or more source tabs, concatenated.
/// `(accession)` collisions across sources are resolved last-writer-wins,
/// logged at DEBUG, matching spec.md §4.3 "Multi-source merge".
pub fn build(sources: &[PathBuf], store_path: &Path) -> Result<usize, Error> {
    let mut merged: HashMap<String, AccessionRow> = HashMap::new();
    for source in sources {
        for row in read_tab(source)? {
            if let Some(existing) = merged.get(&row.accession) {
                tracing::debug!(
                    debug_category = "ACCESSION_MERGE_OVERWRITE",
                    accession = %row.accession,
                    previous_kind = %existing.kind,
                    new_kind = %row.kind,
                    "last-writer-wins merge of accessions store row"
                );
            }
            merged.insert(row.accession.clone(), row);
        }
    }

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = store_path.with_extension("tmp");
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    let conn = Connection::open(&tmp_path)?;
    conn.execute_batch(SCHEMA)?;
    {
        let mut appender = conn.appender("accessions")?;
        for row in merged.values() {
            appender.append_row(params![
                row.accession,
                row.submission,
                row.study,
                row.experiment,
                row.sample,
                row.analysis,
                row.run,
                row.kind,
                row.updated,
                row.published,
            ])?;
        }
        appender.flush()?;
    }
    drop(conn);

    if store_path.exists() {
        std::fs::remove_file(store_path)?;
    }
    std::fs::rename(&tmp_path, store_path)?;
    Ok(merged.len())
}

pub struct AccessionsStore {
    conn: Connection,
}

impl AccessionsStore {
    pub fn open(store_path: &Path) -> Result<AccessionsStore, Error> {
        let conn = Connection::open(store_path)?;
        Ok(AccessionsStore { conn })
    }

    /// `submission -> {study, experiment, run, sample, analysis}` (spec.md §4.3 (a)).
    pub fn downstream(&self, submission: &str) -> Result<Vec<(AccessionType, String)>, Error> {
        let mut stmt = self.conn.prepare(
            "SELECT study, experiment, run, sample, analysis FROM accessions WHERE submission = ?",
        )?;
        let mut out = Vec::new();
        let rows = stmt.query_map(params![submission], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        for row in rows {
            let (study, experiment, run, sample, analysis) = row?;
            for (kind, value) in [
                (AccessionType::SraStudy, study),
                (AccessionType::SraExperiment, experiment),
                (AccessionType::SraRun, run),
                (AccessionType::SraSample, sample),
                (AccessionType::SraAnalysis, analysis),
            ] {
                if let Some(value) = value {
                    out.push((kind, value));
                }
            }
        }
        Ok(out)
    }

    /// `accession -> AccessionType | null` (spec.md §4.3 (b)).
    pub fn type_of(&self, accession: &str) -> Result<Option<AccessionType>, Error> {
        let kind: Option<String> = self
            .conn
            .query_row("SELECT kind FROM accessions WHERE accession = ?", params![accession], |row| row.get(0))
            .ok();
        Ok(kind.and_then(|k| sra_type_from_column(&k)))
    }

    /// `updated_since(ts) -> iterator of submissions` (spec.md §4.3 (c)).
    pub fn updated_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, Error> {
        let naive = cutoff.naive_utc();
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT submission FROM accessions WHERE updated >= ? AND submission IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![naive], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
    }

    /// Every distinct non-null submission accession in the store, used by the
    /// `sra_internal` DBLink extractor to enumerate edges (spec.md §4.4 row
    /// `sra_internal`).
    pub fn all_submissions(&self) -> Result<Vec<String>, Error> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT submission FROM accessions WHERE submission IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
    }

    pub fn updated(&self, accession: &str) -> Result<Option<NaiveDateTime>, Error> {
        self.conn
            .query_row("SELECT updated FROM accessions WHERE accession = ?", params![accession], |row| row.get(0))
            .map_err(|e| match e {
                duckdb::Error::QueryReturnedNoRows => duckdb::Error::QueryReturnedNoRows,
                other => other,
            })
            .or(Ok(None))
    }

    /// `(updated, published)` pair for one accession, used by the SRA JSONL
    /// emitter which has no separate date cache to consult (spec.md §4.7 (b)
    /// table row "SRA/DRA | Accessions store `Updated` column").
    pub fn dates(&self, accession: &str) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), Error> {
        self.conn
            .query_row("SELECT updated, published FROM accessions WHERE accession = ?", params![accession], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .or(Ok((None, None)))
    }
}

/// Maps the tab file's free-text `Type` column (`STUDY`, `EXPERIMENT`, ...) to
/// the corresponding sra-* AccessionType, independent of the ID classifier's
/// shape-based inference (the tab file is authoritative for this mapping).
fn sra_type_from_column(kind: &str) -> Option<AccessionType> {
    use AccessionType::*;
    match kind.to_ascii_uppercase().as_str() {
        "SUBMISSION" => Some(SraSubmission),
        "STUDY" => Some(SraStudy),
        "EXPERIMENT" => Some(SraExperiment),
        "RUN" => Some(SraRun),
        "SAMPLE" => Some(SraSample),
        "ANALYSIS" => Some(SraAnalysis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn write_tab(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn builds_and_queries_downstream() {
        let dir = tempdir().unwrap();
        let tab = write_tab(
            dir.path(),
            "sra.tab",
            "Accession\tSubmission\tStudy\tExperiment\tSample\tAnalysis\tRun\tType\tUpdated\tPublished\n\
             DRA000001\tDRA000001\tDRP000001\t-\t-\t-\t-\tSUBMISSION\t2026-01-01T00:00:00Z\t-\n\
             DRR000001\tDRA000001\t-\t-\t-\t-\t-\tRUN\t2026-01-02T00:00:00Z\t-\n",
        );
        let store_path = dir.path().join("sra.duckdb");
        let count = build(&[tab], &store_path).unwrap();
        assert_eq!(count, 2);

        let store = AccessionsStore::open(&store_path).unwrap();
        let downstream = store.downstream("DRA000001").unwrap();
        assert!(downstream.contains(&(AccessionType::SraStudy, "DRP000001".to_string())));
        assert_eq!(store.type_of("DRR000001").unwrap(), Some(AccessionType::SraRun));
    }

    #[test]
    fn multi_source_merge_is_last_writer_wins() {
        let dir = tempdir().unwrap();
        let first = write_tab(
            dir.path(),
            "sra.tab",
            "Accession\tSubmission\tStudy\tExperiment\tSample\tAnalysis\tRun\tType\tUpdated\tPublished\n\
             SRA000001\tSRA000001\t-\t-\t-\t-\t-\tSUBMISSION\t2025-01-01T00:00:00Z\t-\n",
        );
        let second = write_tab(
            dir.path(),
            "dra.tab",
            "Accession\tSubmission\tStudy\tExperiment\tSample\tAnalysis\tRun\tType\tUpdated\tPublished\n\
             SRA000001\tSRA000001\tSRP999999\t-\t-\t-\t-\tSUBMISSION\t2026-01-01T00:00:00Z\t-\n",
        );
        let store_path = dir.path().join("merged.duckdb");
        build(&[first, second], &store_path).unwrap();

        let store = AccessionsStore::open(&store_path).unwrap();
        let downstream = store.downstream("SRA000001").unwrap();
        assert!(downstream.contains(&(AccessionType::SraStudy, "SRP999999".to_string())));
    }
}
