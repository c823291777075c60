//! `last_run.json` bookkeeping (spec.md §3 "`last_run.json`", §4.7
//! "`last_run.json` discipline", §9 "update ordering").

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

const FAMILIES: [&str; 4] = ["bioproject", "biosample", "sra", "jga"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastRun(HashMap<String, Option<DateTime<Utc>>>);

impl LastRun {
    /// Loads `last_run.json`, defaulting every family to `null` if the file
    /// does not exist yet (first run).
    pub fn load(path: &Path) -> Result<LastRun, Error> {
        if !path.exists() {
            return Ok(LastRun::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// The family's last successful run start, or `None` if never run (in
    /// which case incremental mode should behave as full mode).
    pub fn get(&self, family: &str) -> Option<DateTime<Utc>> {
        self.0.get(family).copied().flatten()
    }

    /// `last_run[family] - margin_days`, the incremental cutoff (spec.md
    /// GLOSSARY "Incremental cutoff"). `None` means "no prior run" — callers
    /// should treat this as full mode.
    pub fn cutoff(&self, family: &str, margin_days: i64) -> Option<DateTime<Utc>> {
        self.get(family).map(|ts| ts - chrono::Duration::days(margin_days))
    }

    /// Records `family`'s new high-water mark. Must only be called after the
    /// family's JSONL emission *and* sink ingest have both succeeded (spec.md
    /// §9): updating earlier risks silent data loss on a mid-run failure.
    pub fn record_success(&mut self, family: &str, run_start: DateTime<Utc>) {
        self.0.insert(family.to_string(), Some(run_start));
    }

    /// Atomically persists the file, creating any missing families as `null`
    /// so the on-disk shape is always the full four-key object.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let mut complete = self.0.clone();
        for family in FAMILIES {
            complete.entry(family.to_string()).or_insert(None);
        }
        let json = serde_json::to_string_pretty(&complete)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_defaults_to_no_prior_run() {
        let dir = tempdir().unwrap();
        let last_run = LastRun::load(&dir.path().join("last_run.json")).unwrap();
        assert_eq!(last_run.get("bioproject"), None);
        assert_eq!(last_run.cutoff("bioproject", 30), None);
    }

    #[test]
    fn round_trips_and_applies_margin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_run.json");

        let mut last_run = LastRun::default();
        let run_start = DateTime::parse_from_rfc3339("2026-01-30T00:00:00Z").unwrap().with_timezone(&Utc);
        last_run.record_success("bioproject", run_start);
        last_run.save(&path).unwrap();

        let reloaded = LastRun::load(&path).unwrap();
        assert_eq!(reloaded.get("bioproject"), Some(run_start));
        assert_eq!(reloaded.get("biosample"), None);

        let cutoff = reloaded.cutoff("bioproject", 30).unwrap();
        assert_eq!(cutoff, run_start - chrono::Duration::days(30));
    }

    #[test]
    fn save_is_byte_stable_when_nothing_recorded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_run.json");
        LastRun::default().save(&path).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        LastRun::load(&path).unwrap().save(&path).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }
}
