//! JGA JSONL emitter (spec.md §4.7 (c)): per-type XML shards joined with a
//! per-type `date.csv` (JGA has no external date-cache prerequisite — dates
//! come straight from the archive's own CSV, per spec.md §4.7's incremental
//! table: "JGA | Always null -> always full").

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::accession::{classify, AccessionType};
use crate::errors::Error;
use crate::jsonl::{cancelled, shard_output_path, write_doc, EmitterContext, ShardStats};
use crate::records::jga::{self, JgaRecord};

/// One row of a per-type `date.csv`: `id,date_created,date_modified,date_published`.
#[derive(Debug, Clone, Default)]
pub struct JgaDates {
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub published: Option<NaiveDateTime>,
}

pub type JgaDateTable = HashMap<String, JgaDates>;

fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| raw.parse::<chrono::NaiveDate>().map(|d| d.and_hms_opt(0, 0, 0).unwrap()))
        .ok()
}

/// Loads one type's `date.csv` (spec.md §4.7 "per-type `date.csv`").
pub fn load_dates(path: &Path) -> Result<JgaDateTable, Error> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (iid, ic, im, ip) = (col("id"), col("date_created"), col("date_modified"), col("date_published"));

    let mut table = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let Some(id) = iid.and_then(|i| record.get(i)) else { continue };
        let get = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(parse_ts);
        table.insert(id.to_string(), JgaDates { created: get(ic), modified: get(im), published: get(ip) });
    }
    Ok(table)
}

fn naive_to_json(value: Option<NaiveDateTime>) -> Value {
    value
        .map(|dt| chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339())
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn build_doc(ctx: &EmitterContext, record: &JgaRecord, kind: AccessionType, dates: &JgaDateTable) -> Result<Option<Value>, Error> {
    let Ok(accession) = classify(&record.id) else {
        tracing::debug!(debug_category = "INVALID_ACCESSION_ID", raw = %record.id, "skipping jga record");
        return Ok(None);
    };
    if accession.kind != kind {
        return Ok(None);
    }
    if ctx.blacklist.contains(&accession) {
        return Ok(None);
    }

    let mut doc = Map::new();
    doc.insert("accession".to_string(), Value::String(accession.value.clone()));
    doc.insert("dbXrefs".to_string(), Value::Array(ctx.xrefs(&accession)?));

    let entry = dates.get(&accession.value).cloned().unwrap_or_default();
    doc.insert("dateCreated".to_string(), naive_to_json(entry.created));
    doc.insert("dateModified".to_string(), naive_to_json(entry.modified));
    doc.insert("datePublished".to_string(), naive_to_json(entry.published));

    Ok(Some(Value::Object(doc)))
}

/// Processes one shard of one JGA record type (`Study`/`Dataset`/`Dac`/`Policy`).
pub fn process_shard(
    ctx: &EmitterContext,
    shard: &Path,
    jsonl_dir: &Path,
    record_tag: &str,
    kind: AccessionType,
    dates: &JgaDateTable,
    shard_index: usize,
) -> Result<ShardStats, Error> {
    let records = jga::parse_shard(shard, record_tag)?;
    let out_path = shard_output_path(jsonl_dir, "jga", kind.as_str(), shard_index);
    let mut writer = BufWriter::new(File::create(&out_path)?);

    let mut stats = ShardStats::default();
    for record in &records {
        if cancelled(ctx) {
            break;
        }
        match build_doc(ctx, record, kind, dates)? {
            Some(doc) => {
                write_doc(&mut writer, &doc)?;
                stats.emitted += 1;
            }
            None => stats.skipped += 1,
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::tempdir;

    use super::*;
    use crate::blacklist::Blacklist;
    use crate::dblink::{DbLink, DbLinkBuilder};

    #[test]
    fn loads_date_csv_and_applies_to_doc() {
        let dir = tempdir().unwrap();
        let date_csv = dir.path().join("date.csv");
        std::fs::write(&date_csv, "id,date_created,date_modified,date_published\nJGAS000001,2026-01-01T00:00:00Z,2026-02-01T00:00:00Z,\n")
            .unwrap();
        let dates = load_dates(&date_csv).unwrap();
        assert!(dates.contains_key("JGAS000001"));

        let xml = r#"<JGAStudySet><Study id="JGAS000001"/></JGAStudySet>"#;
        let shard = dir.path().join("split_000000.xml");
        File::create(&shard).unwrap().write_all(xml.as_bytes()).unwrap();

        let store_path = dir.path().join("dblink.store");
        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder.finalize(&store_path, &Blacklist::default()).unwrap();
        let context = EmitterContext {
            dblink: DbLink::open(&store_path).unwrap(),
            date_cache: None,
            blacklist: Blacklist::default(),
            cutoff: None,
            cancelled: Default::default(),
        };

        let jsonl_dir = dir.path().join("jsonl");
        crate::jsonl::ensure_dir(&jsonl_dir).unwrap();
        let stats = process_shard(&context, &shard, &jsonl_dir, "Study", AccessionType::JgaStudy, &dates, 0).unwrap();
        assert_eq!(stats.emitted, 1);

        let out = shard_output_path(&jsonl_dir, "jga", "jga-study", 0);
        let contents = std::fs::read_to_string(out).unwrap();
        let doc: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(doc["accession"], "JGAS000001");
        assert!(doc["dateModified"].as_str().unwrap().starts_with("2026-02-01"));
    }
}
