//! BioSample JSONL emitter (spec.md §4.7 (a)).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::accession::{classify, AccessionType};
use crate::errors::Error;
use crate::jsonl::normalize::{self, CAT_BIOSAMPLE_SET_ID, CAT_LOCAL_ID, CAT_MODEL, CAT_OWNER_NAME};
use crate::jsonl::{cancelled, shard_output_path, write_doc, EmitterContext, ShardStats};
use crate::records::biosample::{self, BioSampleRecord};

fn modified_at(record: &BioSampleRecord) -> Option<DateTime<Utc>> {
    let raw = record.last_update.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            raw.parse::<chrono::NaiveDate>()
                .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).unwrap(), Utc))
        })
        .ok()
}

fn build_doc(ctx: &EmitterContext, record: &BioSampleRecord) -> Result<Option<Value>, Error> {
    let Ok(accession) = classify(&record.accession) else {
        tracing::debug!(debug_category = "INVALID_BIOSAMPLE_ID", raw = %record.accession, "skipping biosample record");
        return Ok(None);
    };
    if accession.kind != AccessionType::Biosample {
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
    doc.insert("organismName".to_string(), record.organism_name.clone().map(Value::String).unwrap_or(Value::Null));
    doc.insert(
        "ownerName".to_string(),
        record.owner_name.as_deref().map(|v| normalize::normalize(v, CAT_OWNER_NAME)).map(Value::String).unwrap_or(Value::Null),
    );
    let models: Vec<Value> = record.models.iter().map(|m| Value::String(normalize::normalize(m, CAT_MODEL))).collect();
    doc.insert("models".to_string(), Value::Array(models));
    doc.insert(
        "locusTagPrefix".to_string(),
        record.locus_tag_prefix.as_deref().map(normalize::normalize_locus_tag_prefix).map(Value::String).unwrap_or(Value::Null),
    );
    doc.insert(
        "biosampleSetId".to_string(),
        record
            .biosample_set_id
            .as_deref()
            .map(|v| normalize::normalize(v, CAT_BIOSAMPLE_SET_ID))
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    doc.insert(
        "localId".to_string(),
        record.local_id.as_deref().map(|v| normalize::normalize(v, CAT_LOCAL_ID)).map(Value::String).unwrap_or(Value::Null),
    );
    doc.insert("dbXrefs".to_string(), Value::Array(ctx.xrefs(&accession)?));
    ctx.apply_dates(&mut doc, &accession.value, record.last_update.as_deref())?;

    Ok(Some(Value::Object(doc)))
}

/// Processes one BS shard, writing matching documents to
/// `{jsonl_dir}/biosample_biosample_{NNNN}.jsonl`.
pub fn process_shard(ctx: &EmitterContext, shard: &Path, jsonl_dir: &Path, shard_index: usize) -> Result<ShardStats, Error> {
    let records = biosample::parse_shard(shard)?;
    let out_path = shard_output_path(jsonl_dir, "biosample", "biosample", shard_index);
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
    use crate::dblink::{DbLink, DbLinkBuilder, Edge};

    fn ctx(dir: &Path) -> EmitterContext {
        let store_path = dir.join("dblink.store");
        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder
            .sender()
            .send(vec![Edge::new(classify("PRJNA001").unwrap(), classify("SAMN00000001").unwrap())])
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

    #[test]
    fn emits_doc_with_bioproject_xref() {
        let dir = tempdir().unwrap();
        let xml = r#"<BioSampleSet>
<BioSample accession="SAMN00000001" last_update="2026-01-01" biosample_set_id="Generic.1.0">
  <Ids><Id db_label="Sample name">MyLocalSample1</Id></Ids>
  <Owner><Name>Some Lab</Name></Owner>
  <Description><Organism><OrganismName>Homo sapiens</OrganismName></Organism></Description>
  <Attributes><Attribute attribute_name="Locus Tag Prefix">abcde</Attribute></Attributes>
  <Links><Link target="bioproject">PRJNA001</Link></Links>
</BioSample>
</BioSampleSet>"#;
        let shard = dir.path().join("split_000000.xml");
        File::create(&shard).unwrap().write_all(xml.as_bytes()).unwrap();

        let context = ctx(dir.path());
        let jsonl_dir = dir.path().join("jsonl");
        crate::jsonl::ensure_dir(&jsonl_dir).unwrap();
        let stats = process_shard(&context, &shard, &jsonl_dir, 0).unwrap();
        assert_eq!(stats.emitted, 1);

        let out = shard_output_path(&jsonl_dir, "biosample", "biosample", 0);
        let contents = std::fs::read_to_string(out).unwrap();
        let doc: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(doc["accession"], "SAMN00000001");
        assert_eq!(doc["dbXrefs"][0]["accession"], "PRJNA001");
        assert_eq!(doc["ownerName"], "Some Lab");
        assert_eq!(doc["locusTagPrefix"], "ABCDE");
        assert_eq!(doc["biosampleSetId"], "Generic.1.0");
        assert_eq!(doc["localId"], "MyLocalSample1");
    }

    #[test]
    fn blacklisted_accession_is_skipped() {
        let dir = tempdir().unwrap();
        let xml = r#"<BioSampleSet><BioSample accession="SAMN00000001"/></BioSampleSet>"#;
        let shard = dir.path().join("split_000000.xml");
        File::create(&shard).unwrap().write_all(xml.as_bytes()).unwrap();

        let mut context = ctx(dir.path());
        let mut blacklist_dir = dir.path().to_path_buf();
        blacklist_dir.push("blacklist");
        std::fs::create_dir_all(&blacklist_dir).unwrap();
        std::fs::write(blacklist_dir.join("biosample.txt"), "SAMN00000001\n").unwrap();
        context.blacklist = Blacklist::load(dir.path()).unwrap();

        let jsonl_dir = dir.path().join("jsonl");
        crate::jsonl::ensure_dir(&jsonl_dir).unwrap();
        let stats = process_shard(&context, &shard, &jsonl_dir, 0).unwrap();
        assert_eq!(stats.emitted, 0);
        assert_eq!(stats.skipped, 1);
    }
}
