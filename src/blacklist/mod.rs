//! Blacklist & preserved-edge loaders (spec.md §4.6).
//!
//! Blacklists are plain accession lists, one per family, consulted by DBLink
//! finalize (edge filtering), the JSONL emitters (document filtering), and —
//! out of this core's scope — the document-sink adapter's post-ingest delete
//! pass. Preserved edges are curated `(from_id, to_id)` pairs appended to
//! DBLink regardless of what the source extractors found.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::accession::{classify, Accession};
use crate::errors::Error;

/// Four per-source sets, keyed by family (`bioproject`, `biosample`, `sra`, `jga`).
#[derive(Debug, Default, Clone)]
pub struct Blacklist {
    bioproject: HashSet<String>,
    biosample: HashSet<String>,
    sra: HashSet<String>,
    jga: HashSet<String>,
}

fn load_lines(path: &Path) -> Result<HashSet<String>, Error> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

impl Blacklist {
    /// Loads the four per-source files from `const_dir/blacklist/{bioproject,biosample,sra,jga}.txt`.
    pub fn load(const_dir: &Path) -> Result<Blacklist, Error> {
        let dir = const_dir.join("blacklist");
        Ok(Blacklist {
            bioproject: load_lines(&dir.join("bioproject.txt"))?,
            biosample: load_lines(&dir.join("biosample.txt"))?,
            sra: load_lines(&dir.join("sra.txt"))?,
            jga: load_lines(&dir.join("jga.txt"))?,
        })
    }

    fn set_for(&self, family: &str) -> Option<&HashSet<String>> {
        match family {
            "bioproject" => Some(&self.bioproject),
            "biosample" => Some(&self.biosample),
            "sra" => Some(&self.sra),
            "jga" => Some(&self.jga),
            _ => None,
        }
    }

    /// Case-sensitive membership test against the raw accession (spec.md §4.6).
    pub fn contains_raw(&self, family: &str, raw: &str) -> bool {
        self.set_for(family).is_some_and(|set| set.contains(raw))
    }

    /// Whether `accession` lies in its family's blacklist. Accession types
    /// with no family (gea, metabobank, insdc-*, hum-id, pubmed-id, geo,
    /// taxonomy) are never blacklisted.
    pub fn contains(&self, accession: &Accession) -> bool {
        match accession.kind.family() {
            Some(family) => self.contains_raw(family, &accession.value),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bioproject.is_empty() && self.biosample.is_empty() && self.sra.is_empty() && self.jga.is_empty()
    }

    /// Every raw accession blacklisted under `family`, used by the post-ingest
    /// `es_delete` step (spec.md §4.9 "dedicated post-ingest step").
    pub fn accessions_for(&self, family: &str) -> Vec<String> {
        self.set_for(family).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }
}

/// A human-curated `(from, to)` pair appended to DBLink regardless of the
/// source extractor's output (spec.md §3 "Preserved edges").
#[derive(Debug, Clone)]
pub struct PreservedEdge {
    pub from: Accession,
    pub to: Accession,
}

/// Loads a header-bearing TSV of `(from_id, to_id)` pairs, classifying both
/// sides. Pairs where either side fails classification are skipped with
/// DEBUG (spec.md §4.6 "Preserved").
pub fn load_preserved(path: &Path) -> Result<Vec<PreservedEdge>, Error> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        let (Some(from_raw), Some(to_raw)) = (record.get(0), record.get(1)) else {
            continue;
        };

        let from = match classify(from_raw) {
            Ok(acc) => acc,
            Err(err) => {
                tracing::debug!(debug_category = "PRESERVED_INVALID_FROM", from = from_raw, error = %err, "skipping preserved edge");
                continue;
            }
        };
        let to = match classify(to_raw) {
            Ok(acc) => acc,
            Err(err) => {
                tracing::debug!(debug_category = "PRESERVED_INVALID_TO", to = to_raw, error = %err, "skipping preserved edge");
                continue;
            }
        };
        out.push(PreservedEdge { from, to });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::accession::AccessionType;

    #[test]
    fn comments_and_blanks_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist").join("bioproject.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "# comment\n\nPRJDB1\n  PRJDB2  \n").unwrap();

        let blacklist = Blacklist::load(dir.path()).unwrap();
        assert!(blacklist.contains_raw("bioproject", "PRJDB1"));
        assert!(!blacklist.contains_raw("bioproject", "PRJDB2  "));
        assert!(!blacklist.contains_raw("bioproject", "# comment"));
    }

    #[test]
    fn non_family_types_are_never_blacklisted() {
        let blacklist = Blacklist::default();
        let acc = Accession::new(AccessionType::Gea, "E-GEAD-1");
        assert!(!blacklist.contains(&acc));
    }

    #[test]
    fn preserved_skips_invalid_pairs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preserved.tsv");
        std::fs::write(&path, "from_id\tto_id\nPRJNA1\tSAMN1\nnot-valid\tSAMN2\n").unwrap();

        let preserved = load_preserved(&path).unwrap();
        assert_eq!(preserved.len(), 1);
        assert_eq!(preserved[0].from.value, "PRJNA1");
    }
}
