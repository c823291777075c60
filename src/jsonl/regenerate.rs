//! `regenerate_jsonl`: the hotfix operation (spec.md §4.7 "`last_run.json`
//! discipline", scenario 6). Materializes exactly a caller-supplied set of
//! accessions into a dedicated `run.jsonl` under `regenerate/{YYYYMMDD}/`,
//! overwriting any existing file. Never reads or writes `last_run.json` and
//! never applies the incremental cutoff — every supplied accession that
//! classifies and is not blacklisted is emitted, full stop.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use serde_json::{Map, Value};

use crate::accession::classify;
use crate::accessions_store::AccessionsStore;
use crate::errors::Error;
use crate::jsonl::{write_doc, EmitterContext, ShardStats};

/// Reads one accession per non-blank, non-`#`-prefixed line.
pub fn read_accession_file(path: &Path) -> Result<Vec<String>, Error> {
    let file = File::open(path)?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        out.push(trimmed.to_string());
    }
    Ok(out)
}

fn build_doc(ctx: &EmitterContext, store: Option<&AccessionsStore>, raw: &str) -> Result<Option<Value>, Error> {
    let Ok(accession) = classify(raw) else {
        tracing::debug!(debug_category = "INVALID_ACCESSION_ID", raw, "skipping regenerate accession");
        return Ok(None);
    };
    if ctx.blacklist.contains(&accession) {
        return Ok(None);
    }

    let mut doc = Map::new();
    doc.insert("accession".to_string(), Value::String(accession.value.clone()));
    doc.insert("dbXrefs".to_string(), Value::Array(ctx.xrefs(&accession)?));

    match (accession.kind.family(), store) {
        (Some("sra"), Some(store)) => {
            let (updated, published) = store.dates(&accession.value)?;
            doc.insert("dateCreated".to_string(), Value::Null);
            doc.insert(
                "dateModified".to_string(),
                updated
                    .map(|dt| chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339())
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            doc.insert(
                "datePublished".to_string(),
                published
                    .map(|dt| chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339())
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
        }
        _ => ctx.apply_dates(&mut doc, &accession.value, None)?,
    }

    Ok(Some(Value::Object(doc)))
}

/// Writes `{output_dir}/run.jsonl` containing one document per accession in
/// `accessions` that classifies and is not blacklisted (spec.md §9 scenario 6:
/// "produces `run.jsonl` containing exactly one document whose accession is
/// `DRR000001`").
pub fn regenerate(
    ctx: &EmitterContext,
    store: Option<&AccessionsStore>,
    accessions: &[String],
    output_dir: &Path,
) -> Result<ShardStats, Error> {
    crate::jsonl::ensure_dir(output_dir)?;
    let out_path = output_dir.join("run.jsonl");
    let mut writer = BufWriter::new(File::create(&out_path)?);

    let mut stats = ShardStats::default();
    for raw in accessions {
        match build_doc(ctx, store, raw)? {
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
    use tempfile::tempdir;

    use super::*;
    use crate::blacklist::Blacklist;
    use crate::dblink::{DbLink, DbLinkBuilder, Edge};

    #[test]
    fn regenerates_exactly_requested_accessions() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("dblink.store");
        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder
            .sender()
            .send(vec![Edge::new(classify("DRA000001").unwrap(), classify("DRR000001").unwrap())])
            .unwrap();
        builder.finalize(&store_path, &Blacklist::default()).unwrap();

        let ctx = EmitterContext {
            dblink: DbLink::open(&store_path).unwrap(),
            date_cache: None,
            blacklist: Blacklist::default(),
            cutoff: None,
            cancelled: Default::default(),
        };

        let output_dir = dir.path().join("regenerate/20260728");
        let stats = regenerate(&ctx, None, &["DRR000001".to_string()], &output_dir).unwrap();
        assert_eq!(stats.emitted, 1);

        let contents = std::fs::read_to_string(output_dir.join("run.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let doc: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(doc["accession"], "DRR000001");
        assert_eq!(doc["dbXrefs"][0]["accession"], "DRA000001");
    }

    #[test]
    fn reads_accession_file_skipping_comments_and_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accessions.txt");
        std::fs::write(&path, "# comment\nDRR000001\n\nDRR000002\n").unwrap();
        let accessions = read_accession_file(&path).unwrap();
        assert_eq!(accessions, vec!["DRR000001".to_string(), "DRR000002".to_string()]);
    }
}
