//! JGA (`JGAStudy`/`JGADataset`/`JGADac`/`JGAPolicy`) record parsing.
//!
//! JGA's four entity types share one loose shape: a root element carrying an
//! `id`/`accession` attribute with the entity's own JGA accession, and zero
//! or more nested references (to datasets, policies, dacs, hum-ids, or
//! pubmed ids) captured either as attributes or as element text.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::{Error, XmlError};
use crate::xml_util::{name_eq, parse_attribute_opt};

#[derive(Debug, Clone, Default)]
pub struct JgaRecord {
    pub id: String,
    pub related_ids: Vec<String>,
}

/// Parses every `record_tag` element (e.g. `Study`, `Dataset`, `Dac`, `Policy`)
/// out of one JGA shard file.
pub fn parse_shard(path: &Path, record_tag: &str) -> Result<Vec<JgaRecord>, Error> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(XmlError::from)? {
            Event::Start(e) if crate::xml_util::start_eq(&e, record_tag) => {
                records.push(parse_record(&mut reader, &e, record_tag)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn parse_record<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    start: &quick_xml::events::BytesStart,
    record_tag: &str,
) -> Result<JgaRecord, Error> {
    let mut record = JgaRecord::default();
    record.id = parse_attribute_opt(reader, start, "id")?
        .or(parse_attribute_opt(reader, start, "accession")?)
        .unwrap_or_default();

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).map_err(XmlError::from)?;
        match &event {
            Event::Start(e) => {
                for attr_name in ["id", "accession", "ref"] {
                    if let Ok(Some(value)) = parse_attribute_opt(reader, e, attr_name) {
                        if !value.is_empty() {
                            record.related_ids.push(value);
                        }
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(XmlError::from)?.trim().to_string();
                if !text.is_empty() && crate::accession::is_valid(&text) {
                    record.related_ids.push(text);
                }
            }
            Event::End(e) if name_eq(e.name(), record_tag) => return Ok(record),
            Event::Eof => return Err(Error::Split(crate::errors::SplitError::UnmatchedEndTag(record_tag.to_string()))),
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
    fn parses_related_ids() {
        let xml = r#"<JGAStudySet>
<Study id="JGAS000001">
  <RelatedDataset id="JGAD000001"/>
  <RelatedPublication>12345678</RelatedPublication>
  <RelatedHumId>hum0001</RelatedHumId>
</Study>
</JGAStudySet>"#;

        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.xml");
        File::create(&path).unwrap().write_all(xml.as_bytes()).unwrap();

        let records = parse_shard(&path, "Study").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "JGAS000001");
        assert!(records[0].related_ids.contains(&"JGAD000001".to_string()));
        assert!(records[0].related_ids.contains(&"hum0001".to_string()));
    }
}
