//! BioSample (`BioSampleSet`/`BioSample`) record parsing.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::{Error, XmlError};
use crate::records::PathStack;
use crate::xml_util::{name_eq, parse_attribute_opt, start_eq};

#[derive(Debug, Clone, Default)]
pub struct BioSampleRecord {
    pub accession: String,
    /// Raw `@last_update`, the incremental modification field for this family.
    pub last_update: Option<String>,
    pub owner_name: Option<String>,
    pub organism_name: Option<String>,
    pub models: Vec<String>,
    /// `bioproject` accessions referenced from `Links/Link[@target=bioproject]`.
    pub bioproject_links: Vec<String>,
    /// `@biosample_set_id` on the `BioSample` element, the package this
    /// record was submitted under (spec.md §4.7 step 7 normalize target).
    pub biosample_set_id: Option<String>,
    /// `Attributes/Attribute[@attribute_name="Locus Tag Prefix"]`.
    pub locus_tag_prefix: Option<String>,
    /// `Ids/Id[@db_label="Sample name"]`, the submitter's own identifier for
    /// this sample (as opposed to the assigned `accession`).
    pub local_id: Option<String>,
}

pub fn parse_shard(path: &Path) -> Result<Vec<BioSampleRecord>, Error> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(XmlError::from)? {
            Event::Start(e) if start_eq(&e, "BioSample") => {
                records.push(parse_biosample(reader, &e)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn parse_biosample<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    start: &quick_xml::events::BytesStart,
) -> Result<BioSampleRecord, Error> {
    let mut record = BioSampleRecord::default();
    if let Some(accession) = parse_attribute_opt(reader, start, "accession")? {
        record.accession = accession;
    }
    if let Some(update) = parse_attribute_opt(reader, start, "last_update")? {
        record.last_update = Some(update);
    }
    if let Some(set_id) = parse_attribute_opt(reader, start, "biosample_set_id")? {
        record.biosample_set_id = Some(set_id);
    }

    let mut stack = PathStack::default();
    let mut buf = Vec::new();
    let mut in_link = false;
    let mut link_target: Option<String> = None;
    let mut link_text: Option<String> = None;
    let mut attribute_name: Option<String> = None;
    let mut id_db_label: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(XmlError::from)?;
        match &event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                stack.push(&name);

                if name == "Link" {
                    in_link = true;
                    link_target = parse_attribute_opt(reader, e, "target")?;
                    link_text = None;
                }
                else if name == "Attribute" {
                    attribute_name = parse_attribute_opt(reader, e, "attribute_name")?;
                }
                else if name == "Id" && stack.ends_with2("Ids", "Id") {
                    id_db_label = parse_attribute_opt(reader, e, "db_label")?;
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(XmlError::from)?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match stack.last() {
                    Some("Name") if stack.ends_with2("Owner", "Name") => record.owner_name = Some(text),
                    Some("OrganismName") => record.organism_name = Some(text),
                    Some("Model") => record.models.push(text),
                    Some("Attribute") if attribute_name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case("Locus Tag Prefix")) => {
                        record.locus_tag_prefix = Some(text)
                    }
                    Some("Id") if stack.ends_with2("Ids", "Id") => {
                        if id_db_label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case("Sample name")) {
                            record.local_id = Some(text);
                        }
                    }
                    _ => {
                        if in_link {
                            link_text = Some(text);
                        }
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Link" {
                    in_link = false;
                    if link_target.as_deref() == Some("bioproject") {
                        if let Some(text) = link_text.take() {
                            record.bioproject_links.push(text);
                        }
                    }
                }
                else if name == "Attribute" {
                    attribute_name = None;
                }
                else if name == "Id" {
                    id_db_label = None;
                }
                if name_eq(e.name(), "BioSample") {
                    return Ok(record);
                }
                stack.pop();
            }
            Event::Eof => {
                return Err(Error::Split(crate::errors::SplitError::UnmatchedEndTag("BioSample".to_string())))
            }
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn parses_bioproject_link_and_owner() {
        let xml = r#"<BioSampleSet>
<BioSample accession="SAMN00000001" last_update="2026-02-01" biosample_set_id="Generic.1.0">
  <Ids><Id db_label="Sample name">MyLocalSample1</Id></Ids>
  <Owner><Name>Some Lab</Name></Owner>
  <Models><Model>Generic</Model></Models>
  <Description><Organism><OrganismName>Homo sapiens</OrganismName></Organism></Description>
  <Attributes><Attribute attribute_name="Locus Tag Prefix">ABCDE</Attribute></Attributes>
  <Links><Link target="bioproject" label="primary project">PRJNA001</Link></Links>
</BioSample>
</BioSampleSet>"#;

        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.xml");
        File::create(&path).unwrap().write_all(xml.as_bytes()).unwrap();

        let records = parse_shard(&path).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.accession, "SAMN00000001");
        assert_eq!(record.owner_name.as_deref(), Some("Some Lab"));
        assert_eq!(record.bioproject_links, vec!["PRJNA001".to_string()]);
        assert_eq!(record.biosample_set_id.as_deref(), Some("Generic.1.0"));
        assert_eq!(record.locus_tag_prefix.as_deref(), Some("ABCDE"));
        assert_eq!(record.local_id.as_deref(), Some("MyLocalSample1"));
    }
}
