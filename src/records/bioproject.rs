//! BioProject (`PackageSet`/`Package`) record parsing.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::accession::classify;
use crate::errors::{Error, XmlError};
use crate::records::PathStack;
use crate::xml_util::{name_eq, start_eq};

#[derive(Debug, Clone, Default)]
pub struct BioProjectRecord {
    pub accession: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub organism_name: Option<String>,
    pub organization_name: Option<String>,
    pub grant_agency: Option<String>,
    /// Raw `@last_update` (or `date_modified`) used as the incremental
    /// modification field (spec.md §4.7 "Incremental cutoff per family").
    pub last_update: Option<String>,
    /// `(child_accession, parent_accession)` pairs found on
    /// `Hierarchical[type=TopAdmin]` links (spec.md §4.4 "Umbrella links").
    pub hierarchical_links: Vec<(String, String)>,
    /// Accessions the preserved/bp_bs extractor may also see directly linked
    /// from this record (rare; most bp-bs links come from the BioSample side).
    pub biosample_links: Vec<String>,
    pub hum_id_refs: Vec<String>,
}

/// Parses every `Package` record out of one BP shard file.
pub fn parse_shard(path: &Path) -> Result<Vec<BioProjectRecord>, Error> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(XmlError::from)? {
            Event::Start(e) if start_eq(&e, "Package") => {
                records.push(parse_package(&mut reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn parse_package<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<BioProjectRecord, Error> {
    let mut record = BioProjectRecord::default();
    let mut stack = PathStack::default();
    let mut buf = Vec::new();

    // State for the Link block currently being scanned, if any.
    let mut in_link = false;
    let mut link_project_ref: Option<String> = None;
    let mut link_is_top_admin = false;
    let mut link_member_id: Option<String> = None;
    let mut link_text_tokens: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(XmlError::from)?;
        match &event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                stack.push(&name);

                match name.as_str() {
                    "ArchiveID" if stack.ends_with2("ProjectID", "ArchiveID") => {
                        if let Ok(Some(accession)) =
                            crate::xml_util::parse_attribute_opt(reader, e, "accession")
                        {
                            record.accession = accession;
                        }
                    }
                    "Submission" => {
                        if let Ok(Some(update)) = crate::xml_util::parse_attribute_opt(reader, e, "last_update") {
                            record.last_update = Some(update);
                        }
                        else if let Ok(Some(update)) =
                            crate::xml_util::parse_attribute_opt(reader, e, "date_modified")
                        {
                            record.last_update = Some(update);
                        }
                    }
                    "Link" => {
                        in_link = true;
                        link_project_ref = None;
                        link_is_top_admin = false;
                        link_member_id = None;
                        link_text_tokens.clear();
                    }
                    "ProjectIDRef" if in_link => {
                        if let Ok(Some(accession)) =
                            crate::xml_util::parse_attribute_opt(reader, e, "accession")
                        {
                            link_project_ref = Some(accession);
                        }
                    }
                    "Hierarchical" if in_link => {
                        if let Ok(Some(kind)) = crate::xml_util::parse_attribute_opt(reader, e, "type") {
                            link_is_top_admin = kind == "TopAdmin";
                        }
                    }
                    "MemberID" if in_link => {
                        if let Ok(Some(accession)) =
                            crate::xml_util::parse_attribute_opt(reader, e, "accession")
                        {
                            link_member_id = Some(accession);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(XmlError::from)?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match stack.last() {
                    Some("Name") if stack.ends_with2("ProjectDescr", "Name") => record.name = Some(text),
                    Some("Title") if stack.ends_with2("ProjectDescr", "Title") => record.title = Some(text),
                    Some("Description") if stack.ends_with2("ProjectDescr", "Description") => {
                        record.description = Some(text)
                    }
                    Some("OrganismName") => record.organism_name = Some(text),
                    Some("Name") if stack.contains("Organization") => record.organization_name = Some(text),
                    Some("Agency") if stack.contains("Grant") => record.grant_agency = Some(text),
                    _ => {
                        if in_link {
                            link_text_tokens.push(text);
                        }
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Link" {
                    in_link = false;
                    if link_is_top_admin {
                        if let (Some(child), Some(parent)) = (&link_project_ref, &link_member_id) {
                            record.hierarchical_links.push((child.clone(), parent.clone()));
                        }
                    }
                    for token in &link_text_tokens {
                        if classify(token).map(|a| a.kind == crate::accession::AccessionType::HumId).unwrap_or(false)
                        {
                            record.hum_id_refs.push(token.clone());
                        }
                        if classify(token).map(|a| a.kind == crate::accession::AccessionType::Biosample).unwrap_or(false)
                        {
                            record.biosample_links.push(token.clone());
                        }
                    }
                }
                if name_eq(e.name(), "Package") {
                    return Ok(record);
                }
                stack.pop();
            }
            Event::Eof => {
                return Err(Error::Split(crate::errors::SplitError::UnmatchedEndTag("Package".to_string())))
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
    fn parses_accession_and_umbrella_link() {
        let xml = r#"<PackageSet>
<Package>
  <Project>
    <Project>
      <ProjectID><ArchiveID accession="PRJNA9616"/></ProjectID>
      <ProjectDescr><Name>Test</Name><Title>A title</Title></ProjectDescr>
    </Project>
  </Project>
  <Submission last_update="2026-01-15">
    <Description><Organization><Name>Some Org</Name></Organization></Description>
  </Submission>
  <LinkSet>
    <Link>
      <ProjectIDRef accession="PRJNA9616"/>
      <Hierarchical type="TopAdmin"><MemberID accession="PRJNA46297"/></Hierarchical>
    </Link>
  </LinkSet>
</Package>
</PackageSet>"#;

        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.xml");
        File::create(&path).unwrap().write_all(xml.as_bytes()).unwrap();

        let records = parse_shard(&path).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.accession, "PRJNA9616");
        assert_eq!(record.last_update.as_deref(), Some("2026-01-15"));
        assert_eq!(record.organization_name.as_deref(), Some("Some Org"));
        assert_eq!(record.hierarchical_links, vec![("PRJNA9616".to_string(), "PRJNA46297".to_string())]);
    }
}
