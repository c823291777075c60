//! Run coordinator & log facade (spec.md §4.8, §6 "Run log").
//!
//! Assigns each step a `run_id`, records start/end/status, and exposes the
//! structured log API (`info`, `warning`, `error` with required `error=…`,
//! `debug` with required `debug_category=…`) that every other component logs
//! through. Records land in two places: the JSONL log file named by the run
//! id, and `log.duckdb`, queried by `show_log`/`show_log_summary`.
//!
//! Grounded in the teacher's `set_default_instrumentation(database::simple_logger)`
//! setup in `main.rs`: there, one hook observes every diesel query; here, a
//! `RunCoordinator` plays the same "one place everything funnels through"
//! role for run-level events, generalized from query instrumentation to
//! run-lifecycle bookkeeping.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Critical => "CRITICAL",
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

/// One JSONL record of the run log (spec.md §6 "Run log").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: DateTime<Utc>,
    pub level: String,
    pub run_id: String,
    pub run_name: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Optional fields a caller can attach to one log call.
#[derive(Debug, Clone, Default)]
pub struct LogFields {
    pub file: Option<String>,
    pub accession: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    InProgress,
    Success,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }
}

const RUNS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    run_name TEXT NOT NULL,
    start_ts TIMESTAMP NOT NULL,
    end_ts TIMESTAMP,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS log_events (
    run_id TEXT NOT NULL,
    run_name TEXT NOT NULL,
    ts TIMESTAMP NOT NULL,
    level TEXT NOT NULL,
    msg TEXT NOT NULL,
    file TEXT,
    accession TEXT,
    source TEXT,
    debug_category TEXT,
    error TEXT
);
";

/// Owns the run's JSONL log file and `log.duckdb` connection, and arms a
/// termination guard: the `end` record is always written, either explicitly
/// via [`RunCoordinator::finish`] or, failing that, by `Drop` as `FAILED`
/// (spec.md §4.8 "arms a termination handler that always writes an `end`
/// record").
pub struct RunCoordinator {
    pub run_id: String,
    pub run_name: String,
    pub start: DateTime<Utc>,
    log_writer: Mutex<BufWriter<File>>,
    store: Mutex<Connection>,
    cancelled: Arc<AtomicBool>,
    finished: Mutex<bool>,
    counts: Mutex<std::collections::HashMap<&'static str, usize>>,
}

impl RunCoordinator {
    /// Assigns `run_id = {run_name}_{YYYYMMDDHHMMSS}` and writes the `start`
    /// record to both sinks (spec.md §4.8).
    pub fn start(run_name: &str, result_dir: &Path) -> Result<RunCoordinator, Error> {
        let now = Utc::now();
        let run_id = format!("{run_name}_{}", now.format("%Y%m%d%H%M%S"));

        let logs_dir = result_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;
        let log_path = logs_dir.join(format!("{run_id}.log.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        let store_path = result_dir.join("log.duckdb");
        let conn = Connection::open(&store_path)?;
        conn.execute_batch(RUNS_SCHEMA)?;
        conn.execute(
            "INSERT INTO runs (run_id, run_name, start_ts, status) VALUES (?, ?, ?, ?)",
            params![run_id, run_name, now.naive_utc(), RunStatus::InProgress.as_str()],
        )?;

        let coordinator = RunCoordinator {
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            start: now,
            log_writer: Mutex::new(BufWriter::new(file)),
            store: Mutex::new(conn),
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Mutex::new(false),
            counts: Mutex::new(std::collections::HashMap::new()),
        };
        coordinator.write_record(Level::Info, "run started", LogFields::default(), None, None)?;
        Ok(coordinator)
    }

    /// A cooperative cancellation flag shared with workers: set on `CRITICAL`
    /// (spec.md §5 "Cancellation"), checked by shard/record loops between
    /// units of work.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn write_record(
        &self,
        level: Level,
        msg: &str,
        fields: LogFields,
        debug_category: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), Error> {
        let record = LogRecord {
            ts: Utc::now(),
            level: level.as_str().to_string(),
            run_id: self.run_id.clone(),
            run_name: self.run_name.clone(),
            msg: msg.to_string(),
            file: fields.file.clone(),
            accession: fields.accession.clone(),
            source: fields.source.clone(),
            debug_category: debug_category.map(String::from),
            error: error.map(String::from),
        };

        {
            let mut writer = self.log_writer.lock().expect("log writer mutex poisoned");
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
            writer.flush()?;
        }
        {
            let conn = self.store.lock().expect("log store mutex poisoned");
            conn.execute(
                "INSERT INTO log_events (run_id, run_name, ts, level, msg, file, accession, source, debug_category, error)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.run_id,
                    record.run_name,
                    record.ts.naive_utc(),
                    record.level,
                    record.msg,
                    record.file,
                    record.accession,
                    record.source,
                    record.debug_category,
                    record.error,
                ],
            )?;
        }
        *self.counts.lock().expect("counts mutex poisoned").entry(level.as_str()).or_insert(0) += 1;

        match level {
            Level::Critical => tracing::error!(run_id = %self.run_id, %msg, "CRITICAL"),
            Level::Error => tracing::error!(run_id = %self.run_id, %msg),
            Level::Warning => tracing::warn!(run_id = %self.run_id, %msg),
            Level::Info => tracing::info!(run_id = %self.run_id, %msg),
            Level::Debug => tracing::debug!(run_id = %self.run_id, %msg),
        }
        Ok(())
    }

    pub fn info(&self, msg: &str) -> Result<(), Error> {
        self.write_record(Level::Info, msg, LogFields::default(), None, None)
    }

    pub fn warning(&self, msg: &str, fields: LogFields) -> Result<(), Error> {
        self.write_record(Level::Warning, msg, fields, None, None)
    }

    /// ERROR requires `error=…` (spec.md §6 "Run log").
    pub fn error(&self, msg: &str, error: &str, fields: LogFields) -> Result<(), Error> {
        self.write_record(Level::Error, msg, fields, None, Some(error))
    }

    /// DEBUG requires `debug_category=…` (spec.md §6 "Run log").
    pub fn debug(&self, msg: &str, debug_category: &str, fields: LogFields) -> Result<(), Error> {
        self.write_record(Level::Debug, msg, fields, Some(debug_category), None)
    }

    /// Raises cancellation and records a CRITICAL event. Does not itself
    /// abort the step; callers propagate `Error::Critical` upward.
    pub fn critical(&self, msg: &str) -> Result<(), Error> {
        self.cancelled.store(true, Ordering::SeqCst);
        self.write_record(Level::Critical, msg, LogFields::default(), None, None)
    }

    /// Writes the `end` record. Idempotent: a second call is a no-op, so
    /// `finish` can be called explicitly and the `Drop` guard remains safe.
    pub fn finish(&self, status: RunStatus) -> Result<(), Error> {
        let mut finished = self.finished.lock().expect("finished mutex poisoned");
        if *finished {
            return Ok(());
        }
        *finished = true;

        let end = Utc::now();
        {
            let conn = self.store.lock().expect("log store mutex poisoned");
            conn.execute(
                "UPDATE runs SET end_ts = ?, status = ? WHERE run_id = ?",
                params![end.naive_utc(), status.as_str(), self.run_id],
            )?;
        }
        self.write_record(Level::Info, &format!("run finished: {}", status.as_str()), LogFields::default(), None, None)
    }
}

impl Drop for RunCoordinator {
    fn drop(&mut self) {
        let already_finished = *self.finished.lock().expect("finished mutex poisoned");
        if !already_finished {
            // mirrors the teacher's termination-handler guarantee: any path that
            // drops the coordinator without an explicit `finish` (a panic, an
            // early `?` return) is recorded as FAILED, never left IN_PROGRESS.
            let _ = self.finish(RunStatus::Failed);
        }
    }
}

/// `show_log` (spec.md §6 CLI surface): prints every event for `run_id` in
/// timestamp order.
pub fn show_log(result_dir: &Path, run_id: &str) -> Result<Vec<LogRecord>, Error> {
    let conn = Connection::open(result_dir.join("log.duckdb"))?;
    let mut stmt = conn.prepare(
        "SELECT ts, level, run_id, run_name, msg, file, accession, source, debug_category, error
         FROM log_events WHERE run_id = ? ORDER BY ts ASC",
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        Ok(LogRecord {
            ts: DateTime::from_naive_utc_and_offset(row.get(0)?, Utc),
            level: row.get(1)?,
            run_id: row.get(2)?,
            run_name: row.get(3)?,
            msg: row.get(4)?,
            file: row.get(5)?,
            accession: row.get(6)?,
            source: row.get(7)?,
            debug_category: row.get(8)?,
            error: row.get(9)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
}

/// `(status, per-level counts, per-debug-category counts, duration)` for one
/// run (spec.md §7 "Propagation" — `show_log_summary`).
#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub run_id: String,
    pub status: String,
    pub duration_seconds: Option<i64>,
    pub by_level: std::collections::BTreeMap<String, usize>,
    pub by_debug_category: std::collections::BTreeMap<String, usize>,
}

pub fn show_log_summary(result_dir: &Path, run_id: &str) -> Result<LogSummary, Error> {
    let conn = Connection::open(result_dir.join("log.duckdb"))?;

    let (status, start_ts, end_ts): (String, chrono::NaiveDateTime, Option<chrono::NaiveDateTime>) = conn
        .query_row("SELECT status, start_ts, end_ts FROM runs WHERE run_id = ?", params![run_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| match e {
            duckdb::Error::QueryReturnedNoRows => Error::Lookup(crate::errors::LookupError::Source(run_id.to_string())),
            other => Error::Store(other),
        })?;

    let duration_seconds = end_ts.map(|end| (end - start_ts).num_seconds());

    let mut by_level = std::collections::BTreeMap::new();
    let mut stmt = conn.prepare("SELECT level, count(*) FROM log_events WHERE run_id = ? GROUP BY level")?;
    let rows = stmt.query_map(params![run_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (level, count) = row?;
        by_level.insert(level, count as usize);
    }

    let mut by_debug_category = std::collections::BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT debug_category, count(*) FROM log_events
         WHERE run_id = ? AND debug_category IS NOT NULL GROUP BY debug_category",
    )?;
    let rows = stmt.query_map(params![run_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (category, count) = row?;
        by_debug_category.insert(category, count as usize);
    }

    Ok(LogSummary { run_id: run_id.to_string(), status, duration_seconds, by_level, by_debug_category })
}

/// Named output path helper shared by CLI handlers that need to resolve a
/// run's log file directly (outside the duckdb store), e.g. for archival.
pub fn log_path(result_dir: &Path, run_id: &str) -> PathBuf {
    result_dir.join("logs").join(format!("{run_id}.log.jsonl"))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn start_and_finish_round_trips_through_summary() {
        let dir = tempdir().unwrap();
        let coordinator = RunCoordinator::start("test_run", dir.path()).unwrap();
        coordinator.info("doing work").unwrap();
        coordinator.debug("skipped a record", "INVALID_ACCESSION_ID", LogFields::default()).unwrap();
        coordinator.error("shard failed", "disk full", LogFields { file: Some("shard_1.xml".into()), ..Default::default() })
            .unwrap();
        let run_id = coordinator.run_id.clone();
        coordinator.finish(RunStatus::Success).unwrap();
        drop(coordinator);

        let summary = show_log_summary(dir.path(), &run_id).unwrap();
        assert_eq!(summary.status, "SUCCESS");
        assert!(summary.duration_seconds.is_some());
        assert_eq!(summary.by_debug_category.get("INVALID_ACCESSION_ID"), Some(&1));
        assert_eq!(summary.by_level.get("ERROR"), Some(&1));

        let records = show_log(dir.path(), &run_id).unwrap();
        assert!(records.iter().any(|r| r.msg == "shard failed" && r.error.as_deref() == Some("disk full")));
    }

    #[test]
    fn drop_without_finish_records_failed() {
        let dir = tempdir().unwrap();
        let run_id = {
            let coordinator = RunCoordinator::start("crashy_run", dir.path()).unwrap();
            coordinator.run_id.clone()
        };
        let summary = show_log_summary(dir.path(), &run_id).unwrap();
        assert_eq!(summary.status, "FAILED");
    }
}
