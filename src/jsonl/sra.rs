//! SRA/DRA JSONL emitter (spec.md §4.7 (b)): one submission expands to
//! documents across six indices (submission/study/experiment/run/sample/
//! analysis), fanned out atomically per submission and batched 5,000
//! submissions per shard file (spec.md §9 "Batching for SRA").
//!
//! Random access into the per-submission tar archives (`NCBI_SRA.tar`,
//! `DRA.tar`) goes through a cached offset index (`*.tar.index`, DuckDB-backed
//! like every other embedded store in this crate) built once by
//! `sync_ncbi_tar`/`sync_dra_tar` from `Entry::raw_file_position()` and entry
//! size, so a later lookup seeks straight to the submission's bytes instead of
//! re-walking the archive.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::accession::{classify, Accession, AccessionType};
use crate::accessions_store::AccessionsStore;
use crate::errors::Error;
use crate::jsonl::{shard_output_path, write_doc, EmitterContext, ShardStats};

const SCHEMA: &str = "CREATE TABLE tar_index (
    submission TEXT NOT NULL PRIMARY KEY,
    offset BIGINT NOT NULL,
    size BIGINT NOT NULL
);";

/// One submission's byte range within its tar archive.
#[derive(Debug, Clone, Copy)]
pub struct TarEntry {
    pub offset: u64,
    pub size: u64,
}

/// Cached offset index over a per-submission tar archive (spec.md §4.7 (b)
/// "shard tar archives of per-submission XML (with an index cached per tar
/// for random access)").
pub struct TarIndex {
    conn: Connection,
}

impl TarIndex {
    /// Walks `tar_path` once, recording each entry's raw file position and
    /// size keyed by the submission accession found in its path, and writes
    /// the result to `index_path` (a fresh DuckDB file, replacing any prior
    /// index for this tar).
    pub fn build(tar_path: &Path, index_path: &Path) -> Result<usize, Error> {
        let file = File::open(tar_path)?;
        let mut archive = tar::Archive::new(file);

        if index_path.exists() {
            std::fs::remove_file(index_path)?;
        }
        let conn = Connection::open(index_path)?;
        conn.execute_batch(SCHEMA)?;

        let mut count = 0usize;
        {
            let mut appender = conn.appender("tar_index")?;
            for entry in archive.entries_with_seek()? {
                let entry = entry?;
                let path = entry.path()?.to_string_lossy().to_string();
                let Some(submission) = submission_from_entry_path(&path) else { continue };
                let offset = entry.raw_file_position();
                let size = entry.size();
                appender.append_row(params![submission, offset as i64, size as i64])?;
                count += 1;
            }
            appender.flush()?;
        }
        Ok(count)
    }

    pub fn open(index_path: &Path) -> Result<TarIndex, Error> {
        Ok(TarIndex { conn: Connection::open(index_path)? })
    }

    pub fn lookup(&self, submission: &str) -> Result<Option<TarEntry>, Error> {
        self.conn
            .query_row("SELECT offset, size FROM tar_index WHERE submission = ?", params![submission], |row| {
                Ok(TarEntry { offset: row.get::<_, i64>(0)? as u64, size: row.get::<_, i64>(1)? as u64 })
            })
            .map(Some)
            .or_else(|e| match e {
                duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(Error::from(other)),
            })
    }

    pub fn submissions(&self) -> Result<Vec<String>, Error> {
        let mut stmt = self.conn.prepare("SELECT submission FROM tar_index")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
    }
}

/// Per-submission entry paths look like `DRA000001/DRA000001.submission.xml`
/// or bare `DRA000001.xml`; either way the submission accession is the first
/// path segment's leading classifiable token.
fn submission_from_entry_path(path: &str) -> Option<String> {
    let first = path.split(['/', '\\']).next()?;
    let token = first.split('.').next()?;
    if classify(token).is_ok() {
        Some(token.to_string())
    }
    else {
        None
    }
}

/// Reads exactly one submission's archived XML bytes via the cached offset.
pub fn read_submission_xml(tar_path: &Path, entry: TarEntry) -> Result<Vec<u8>, Error> {
    let mut file = File::open(tar_path)?;
    file.seek(SeekFrom::Start(entry.offset))?;
    let mut buf = vec![0u8; entry.size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Best-effort `accession -> TITLE text` map scraped out of a submission's
/// archived XML, used only to enrich documents when present; absence is not
/// an error, since the accessions store alone is sufficient to build the
/// fan-out (spec.md §4.3 is the authoritative source of submission structure).
fn scrape_titles(xml: &[u8]) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current_accession: Option<String> = None;
    let mut in_title = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if let Ok(Some(acc)) = crate::xml_util::parse_attribute_opt(&reader, &e, "accession") {
                    current_accession = Some(acc);
                }
                in_title = e.name().as_ref() == b"TITLE";
            }
            Ok(Event::Text(e)) if in_title => {
                if let (Some(acc), Ok(text)) = (&current_accession, e.unescape()) {
                    titles.entry(acc.clone()).or_insert_with(|| text.trim().to_string());
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"TITLE" {
                    in_title = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    titles
}

fn naive_to_json(value: Option<NaiveDateTime>) -> Value {
    match value {
        Some(dt) => Value::String(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()),
        None => Value::Null,
    }
}

fn build_entity_doc(
    ctx: &EmitterContext,
    store: &AccessionsStore,
    accession: &Accession,
    titles: &HashMap<String, String>,
) -> Result<Value, Error> {
    let mut doc = Map::new();
    doc.insert("accession".to_string(), Value::String(accession.value.clone()));
    if let Some(title) = titles.get(&accession.value) {
        doc.insert("title".to_string(), Value::String(title.clone()));
    }
    doc.insert("dbXrefs".to_string(), Value::Array(ctx.xrefs(accession)?));

    let (updated, published) = store.dates(&accession.value)?;
    doc.insert("dateCreated".to_string(), Value::Null);
    doc.insert("dateModified".to_string(), naive_to_json(updated));
    doc.insert("datePublished".to_string(), naive_to_json(published));
    Ok(Value::Object(doc))
}

/// Builds every document one submission fans out to: the submission itself
/// plus every downstream study/experiment/run/sample/analysis (spec.md §9
/// scenario 5). Returns `(AccessionType, Value)` pairs so the caller can
/// route each to its index's shard file; an empty return means the
/// submission was filtered (invalid, blacklisted, or before cutoff).
pub fn build_submission_docs(
    ctx: &EmitterContext,
    store: &AccessionsStore,
    submission: &str,
    titles: &HashMap<String, String>,
) -> Result<Vec<(AccessionType, Value)>, Error> {
    let Ok(accession) = classify(submission) else {
        tracing::debug!(debug_category = "INVALID_ACCESSION_ID", raw = submission, "skipping sra submission");
        return Ok(Vec::new());
    };
    if ctx.blacklist.contains(&accession) {
        return Ok(Vec::new());
    }
    if let Some(cutoff) = ctx.cutoff {
        let (updated, _) = store.dates(submission)?;
        let include = updated.is_some_and(|ts| DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc) >= cutoff);
        if !include {
            return Ok(Vec::new());
        }
    }

    let mut docs = Vec::new();
    docs.push((AccessionType::SraSubmission, build_entity_doc(ctx, store, &accession, titles)?));
    for (kind, value) in store.downstream(submission)? {
        let Ok(child) = classify(&value) else { continue };
        if ctx.blacklist.contains(&child) {
            continue;
        }
        docs.push((kind, build_entity_doc(ctx, store, &child, titles)?));
    }
    Ok(docs)
}

/// Default submission batch size per output shard (spec.md §9 "Batch size is
/// 5,000 submissions per shard file").
pub const BATCH_SIZE: usize = 5_000;

/// Processes one batch of submissions, writing every resulting document to
/// the matching one of the six per-type shard files for `shard_index`. Each
/// submission is fanned out in full before any of its documents are written,
/// so a submission never appears partially across the six files (spec.md §9
/// "One submission is emitted atomically across all six output files").
pub fn process_submission_batch(
    ctx: &EmitterContext,
    store: &AccessionsStore,
    tar_index: Option<&TarIndex>,
    tar_path: Option<&Path>,
    submissions: &[String],
    jsonl_dir: &Path,
    shard_index: usize,
) -> Result<ShardStats, Error> {
    let kinds = [
        AccessionType::SraSubmission,
        AccessionType::SraStudy,
        AccessionType::SraExperiment,
        AccessionType::SraRun,
        AccessionType::SraSample,
        AccessionType::SraAnalysis,
    ];
    let mut writers: HashMap<AccessionType, BufWriter<File>> = HashMap::new();
    for kind in kinds {
        let path = shard_output_path(jsonl_dir, "sra", kind.as_str(), shard_index);
        writers.insert(kind, BufWriter::new(File::create(path)?));
    }

    let mut stats = ShardStats::default();
    for submission in submissions {
        if crate::jsonl::cancelled(ctx) {
            break;
        }

        let titles = match (tar_index, tar_path) {
            (Some(index), Some(path)) => match index.lookup(submission)? {
                Some(entry) => scrape_titles(&read_submission_xml(path, entry)?),
                None => HashMap::new(),
            },
            _ => HashMap::new(),
        };

        let docs = build_submission_docs(ctx, store, submission, &titles)?;
        if docs.is_empty() {
            stats.skipped += 1;
            continue;
        }
        for (kind, doc) in &docs {
            let writer = writers.get_mut(kind).expect("every sra AccessionType has a writer");
            write_doc(writer, doc)?;
        }
        stats.emitted += 1;
    }

    for writer in writers.values_mut() {
        writer.flush()?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::tempdir;

    use super::*;
    use crate::blacklist::Blacklist;
    use crate::dblink::{DbLink, DbLinkBuilder, Edge};

    fn ctx(dir: &Path) -> EmitterContext {
        let store_path = dir.join("dblink.store");
        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder
            .sender()
            .send(vec![Edge::new(classify("DRA000001").unwrap(), classify("DRP000001").unwrap())])
            .unwrap();
        builder.finalize(&store_path, &Blacklist::default()).unwrap();
        EmitterContext {
            dblink: DbLink::open(&store_path).unwrap(),
            date_cache: None,
            blacklist: Blacklist::default(),
            cutoff: None,
            cancelled: Default::default(),
        }
    }

    fn seed_store(dir: &Path) -> AccessionsStore {
        let tab = dir.join("sra.tab");
        std::fs::write(
            &tab,
            "Accession\tSubmission\tStudy\tExperiment\tSample\tAnalysis\tRun\tType\tUpdated\tPublished\n\
             DRA000001\tDRA000001\tDRP000001\t-\t-\t-\t-\tSUBMISSION\t2026-01-01T00:00:00Z\t-\n\
             DRP000001\tDRA000001\t-\t-\t-\t-\t-\tSTUDY\t2026-01-01T00:00:00Z\t-\n",
        )
        .unwrap();
        let store_path = dir.join("sra_accessions.store");
        crate::accessions_store::build(&[tab], &store_path).unwrap();
        AccessionsStore::open(&store_path).unwrap()
    }

    #[test]
    fn fans_out_submission_across_indices() {
        let dir = tempdir().unwrap();
        let context = ctx(dir.path());
        let store = seed_store(dir.path());
        let jsonl_dir = dir.path().join("jsonl");
        crate::jsonl::ensure_dir(&jsonl_dir).unwrap();

        let stats =
            process_submission_batch(&context, &store, None, None, &["DRA000001".to_string()], &jsonl_dir, 0).unwrap();
        assert_eq!(stats.emitted, 1);

        let submission_out = shard_output_path(&jsonl_dir, "sra", "sra-submission", 0);
        let study_out = shard_output_path(&jsonl_dir, "sra", "sra-study", 0);
        let submission_doc: Value =
            serde_json::from_str(std::fs::read_to_string(submission_out).unwrap().lines().next().unwrap()).unwrap();
        let study_doc: Value =
            serde_json::from_str(std::fs::read_to_string(study_out).unwrap().lines().next().unwrap()).unwrap();
        assert_eq!(submission_doc["accession"], "DRA000001");
        assert_eq!(submission_doc["dbXrefs"][0]["accession"], "DRP000001");
        assert_eq!(study_doc["accession"], "DRP000001");
    }

    #[test]
    fn tar_index_round_trips_offsets() {
        let dir = tempdir().unwrap();
        let tar_path = dir.path().join("NCBI_SRA.tar");
        {
            let file = File::create(&tar_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let data = b"<SUBMISSION_SET><SUBMISSION accession=\"DRA000001\"/></SUBMISSION_SET>";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, "DRA000001/DRA000001.xml", &data[..]).unwrap();
            builder.finish().unwrap();
        }

        let index_path = dir.path().join("NCBI_SRA.tar.index");
        let count = TarIndex::build(&tar_path, &index_path).unwrap();
        assert_eq!(count, 1);

        let index = TarIndex::open(&index_path).unwrap();
        let entry = index.lookup("DRA000001").unwrap().unwrap();
        let bytes = read_submission_xml(&tar_path, entry).unwrap();
        assert!(bytes.starts_with(b"<SUBMISSION_SET>"));
    }
}
