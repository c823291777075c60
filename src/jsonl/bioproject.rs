//! BioProject JSONL emitter (spec.md §4.7 (a)).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::accession::{classify, AccessionType};
use crate::errors::Error;
use crate::jsonl::normalize::{self, CAT_GRANT_AGENCY, CAT_ORGANIZATION_NAME};
use crate::jsonl::{cancelled, shard_output_path, write_doc, EmitterContext, ShardStats};
use crate::records::bioproject::{self, BioProjectRecord};

fn modified_at(record: &BioProjectRecord) -> Option<DateTime<Utc>> {
    record.last_update.as_deref().and_then(parse_xml_timestamp)
}

fn parse_xml_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        })
        .or_else(|_| {
            raw.parse::<chrono::NaiveDate>()
                .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).unwrap(), Utc))
        })
        .ok()
}

fn build_doc(ctx: &EmitterContext, record: &BioProjectRecord) -> Result<Option<Value>, Error> {
    let Ok(accession) = classify(&record.accession) else {
        tracing::debug!(debug_category = "INVALID_BIOPROJECT_ID", raw = %record.accession, "skipping bioproject record");
        return Ok(None);
    };
    if accession.kind != AccessionType::Bioproject {
        return Ok(None);
    }
    if ctx.blacklist.contains(&accession) {
        return Ok(None);
    }
    if let Some(cutoff) = ctx.cutoff {
        let include = modified_at(record).is_some_and(|ts| ts >= cutoff);
        if !include {
            return Ok(None);
        }
    }

    let mut doc = Map::new();
    doc.insert("accession".to_string(), Value::String(accession.value.clone()));
    doc.insert("name".to_string(), record.name.clone().map(Value::String).unwrap_or(Value::Null));
    doc.insert("title".to_string(), record.title.clone().map(Value::String).unwrap_or(Value::Null));
    doc.insert("description".to_string(), record.description.clone().map(Value::String).unwrap_or(Value::Null));
    doc.insert("organismName".to_string(), record.organism_name.clone().map(Value::String).unwrap_or(Value::Null));
    doc.insert(
        "organizationName".to_string(),
        record.organization_name.as_deref().map(|v| normalize::normalize(v, CAT_ORGANIZATION_NAME)).map(Value::String).unwrap_or(Value::Null),
    );
    doc.insert(
        "grantAgency".to_string(),
        record.grant_agency.as_deref().map(|v| normalize::normalize(v, CAT_GRANT_AGENCY)).map(Value::String).unwrap_or(Value::Null),
    );
    doc.insert("dbXrefs".to_string(), Value::Array(ctx.xrefs(&accession)?));
    ctx.apply_dates(&mut doc, &accession.value, record.last_update.as_deref())?;

    Ok(Some(Value::Object(doc)))
}

/// Processes one BP shard, writing matching documents to
/// `{jsonl_dir}/bioproject_bioproject_{NNNN}.jsonl` (spec.md §4.7 step 8).
pub fn process_shard(ctx: &EmitterContext, shard: &Path, jsonl_dir: &Path, shard_index: usize) -> Result<ShardStats, Error> {
    let records = bioproject::parse_shard(shard)?;
    let out_path = shard_output_path(jsonl_dir, "bioproject", "bioproject", shard_index);
    let mut writer = BufWriter::new(File::create(&out_path)?);

    let mut stats = ShardStats::default();
    for record in &records {
        if cancelled(ctx) {
            break;
        }
        match build_doc(ctx, record)? {
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
    use crate::dblink::{DbLinkBuilder, Edge};

    fn ctx(dir: &Path, cutoff: Option<DateTime<Utc>>) -> EmitterContext {
        let store_path = dir.join("dblink.store");
        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder
            .sender()
            .send(vec![Edge::new(classify("PRJNA9616").unwrap(), classify("SAMN001").unwrap())])
            .unwrap();
        builder.finalize(&store_path, &Blacklist::default()).unwrap();

        EmitterContext {
            dblink: crate::dblink::DbLink::open(&store_path).unwrap(),
            date_cache: None,
            blacklist: Blacklist::default(),
            cutoff,
            cancelled: Default::default(),
        }
    }

    #[test]
    fn emits_one_doc_with_xrefs() {
        let dir = tempdir().unwrap();
        let xml = r#"<PackageSet>
<Package>
  <Project><Project>
    <ProjectID><ArchiveID accession="PRJNA9616"/></ProjectID>
    <ProjectDescr><Name>Test</Name><Title>A title</Title></ProjectDescr>
  </Project></Project>
  <Submission last_update="2026-02-01T00:00:00Z"/>
</Package>
</PackageSet>"#;
        let shard = dir.path().join("split_000000.xml");
        File::create(&shard).unwrap().write_all(xml.as_bytes()).unwrap();

        let context = ctx(dir.path(), None);
        let jsonl_dir = dir.path().join("jsonl");
        crate::jsonl::ensure_dir(&jsonl_dir).unwrap();
        let stats = process_shard(&context, &shard, &jsonl_dir, 0).unwrap();
        assert_eq!(stats.emitted, 1);

        let out = shard_output_path(&jsonl_dir, "bioproject", "bioproject", 0);
        let contents = std::fs::read_to_string(out).unwrap();
        let doc: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(doc["accession"], "PRJNA9616");
        assert_eq!(doc["dbXrefs"][0]["accession"], "SAMN001");
    }

    #[test]
    fn incremental_cutoff_excludes_older_records() {
        let dir = tempdir().unwrap();
        let xml = r#"<PackageSet>
<Package>
  <Project><Project>
    <ProjectID><ArchiveID accession="PRJNA9616"/></ProjectID>
  </Project></Project>
  <Submission last_update="2025-12-01T00:00:00Z"/>
</Package>
</PackageSet>"#;
        let shard = dir.path().join("split_000000.xml");
        File::create(&shard).unwrap().write_all(xml.as_bytes()).unwrap();

        let cutoff = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let context = ctx(dir.path(), Some(cutoff));
        let jsonl_dir = dir.path().join("jsonl");
        crate::jsonl::ensure_dir(&jsonl_dir).unwrap();
        let stats = process_shard(&context, &shard, &jsonl_dir, 0).unwrap();
        assert_eq!(stats.emitted, 0);
        assert_eq!(stats.skipped, 1);
    }
}
