//! The ID classifier and the closed set of 21 [`AccessionType`] tags.
//!
//! Every other component builds on `classify`: the DBLink extractors use it to
//! validate edge endpoints (invariant I1), the JSONL emitters use it to validate
//! the primary accession of each record (invariant I4), and the preserved-edge
//! loader uses it to validate both sides of a curated pair.

use std::cmp::Ordering;

use crate::errors::ClassifyError;

/// The closed set of accession kinds. Declaration order is the fixed total order
/// used to canonicalize DBLink edges (spec §3, "Canonical form"): ordinal first,
/// then accession lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessionType {
    Bioproject,
    UmbrellaBioproject,
    Biosample,
    SraSubmission,
    SraStudy,
    SraExperiment,
    SraRun,
    SraSample,
    SraAnalysis,
    JgaStudy,
    JgaDataset,
    JgaDac,
    JgaPolicy,
    Gea,
    Metabobank,
    InsdcAssembly,
    InsdcMaster,
    HumId,
    PubmedId,
    Geo,
    Taxonomy,
}

impl AccessionType {
    pub fn as_str(&self) -> &'static str {
        use AccessionType::*;
        match self {
            Bioproject => "bioproject",
            UmbrellaBioproject => "umbrella-bioproject",
            Biosample => "biosample",
            SraSubmission => "sra-submission",
            SraStudy => "sra-study",
            SraExperiment => "sra-experiment",
            SraRun => "sra-run",
            SraSample => "sra-sample",
            SraAnalysis => "sra-analysis",
            JgaStudy => "jga-study",
            JgaDataset => "jga-dataset",
            JgaDac => "jga-dac",
            JgaPolicy => "jga-policy",
            Gea => "gea",
            Metabobank => "metabobank",
            InsdcAssembly => "insdc-assembly",
            InsdcMaster => "insdc-master",
            HumId => "hum-id",
            PubmedId => "pubmed-id",
            Geo => "geo",
            Taxonomy => "taxonomy",
        }
    }
}

impl std::fmt::Display for AccessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AccessionType {
    /// Inverse of [`AccessionType::as_str`]; used when reloading a type tag
    /// that was persisted as text (DBLink store columns, TSV dumps).
    pub fn from_str(raw: &str) -> Option<AccessionType> {
        use AccessionType::*;
        Some(match raw {
            "bioproject" => Bioproject,
            "umbrella-bioproject" => UmbrellaBioproject,
            "biosample" => Biosample,
            "sra-submission" => SraSubmission,
            "sra-study" => SraStudy,
            "sra-experiment" => SraExperiment,
            "sra-run" => SraRun,
            "sra-sample" => SraSample,
            "sra-analysis" => SraAnalysis,
            "jga-study" => JgaStudy,
            "jga-dataset" => JgaDataset,
            "jga-dac" => JgaDac,
            "jga-policy" => JgaPolicy,
            "gea" => Gea,
            "metabobank" => Metabobank,
            "insdc-assembly" => InsdcAssembly,
            "insdc-master" => InsdcMaster,
            "hum-id" => HumId,
            "pubmed-id" => PubmedId,
            "geo" => Geo,
            "taxonomy" => Taxonomy,
            _ => return None,
        })
    }

    /// The blacklist/incremental-bookkeeping family this type belongs to, if
    /// any (spec.md §3 "Blacklist", §4.6). Types outside `{bioproject,
    /// biosample, sra, jga}` have no per-source blacklist or `last_run.json`
    /// entry.
    pub fn family(&self) -> Option<&'static str> {
        use AccessionType::*;
        match self {
            Bioproject | UmbrellaBioproject => Some("bioproject"),
            Biosample => Some("biosample"),
            SraSubmission | SraStudy | SraExperiment | SraRun | SraSample | SraAnalysis => Some("sra"),
            JgaStudy | JgaDataset | JgaDac | JgaPolicy => Some("jga"),
            _ => None,
        }
    }
}

/// One endpoint of a relation edge: a classified, normalized accession.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accession {
    pub kind: AccessionType,
    pub value: String,
}

impl Accession {
    pub fn new(kind: AccessionType, value: impl Into<String>) -> Self {
        Accession { kind, value: value.into() }
    }
}

impl PartialOrd for Accession {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Accession {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.kind, &self.value).cmp(&(other.kind, &other.value))
    }
}

/// A matcher rule: a shape predicate, the type it assigns, and a normalizer.
struct Rule {
    kind: AccessionType,
    matches: fn(&str) -> bool,
    normalize: fn(&str) -> String,
    invalid_category: fn(String) -> ClassifyError,
}

fn identity(raw: &str) -> String {
    raw.to_string()
}

/// Strips a trailing `.N` version suffix, used only for insdc-master accessions.
fn strip_version(raw: &str) -> String {
    match raw.rfind('.') {
        Some(idx) if raw[idx + 1..].chars().all(|c| c.is_ascii_digit()) && idx + 1 < raw.len() => {
            raw[..idx].to_string()
        }
        _ => raw.to_string(),
    }
}

fn is_bioproject(raw: &str) -> bool {
    raw.starts_with("PRJ") && raw.len() > 3
}

fn is_biosample(raw: &str) -> bool {
    raw.starts_with("SAM") && raw.len() > 3
}

fn is_sra_like(raw: &str) -> bool {
    sra_subtype(raw).is_some()
}

/// `[DES]R[APXRZS]` — submission/study/experiment/run/sample/analysis, shared by
/// NCBI SRA (`SRA`/`SRP`/...), EBI ENA (`ERA`/`ERP`/...), and DDBJ DRA (`DRA`/`DRP`/...).
/// Per the Open Question in spec §9, all three source prefixes map to the same
/// AccessionType by their second letter; the originating archive is not tracked
/// as a distinct dimension.
fn sra_subtype(raw: &str) -> Option<AccessionType> {
    let bytes = raw.as_bytes();
    if bytes.len() < 3 {
        return None;
    }
    if !matches!(bytes[0], b'D' | b'E' | b'S') || bytes[1] != b'R' {
        return None;
    }
    if !bytes[3..].iter().all(u8::is_ascii_digit) || bytes.len() < 4 {
        return None;
    }
    match bytes[2] {
        b'A' => Some(AccessionType::SraSubmission),
        b'P' => Some(AccessionType::SraStudy),
        b'X' => Some(AccessionType::SraExperiment),
        b'R' => Some(AccessionType::SraRun),
        b'S' => Some(AccessionType::SraSample),
        b'Z' => Some(AccessionType::SraAnalysis),
        _ => None,
    }
}

fn is_jga(raw: &str, prefix: &str) -> bool {
    raw.starts_with(prefix) && raw[prefix.len()..].chars().all(|c| c.is_ascii_digit()) && raw.len() > prefix.len()
}

fn is_gea(raw: &str) -> bool {
    raw.starts_with("E-GEAD-")
}

fn is_metabobank(raw: &str) -> bool {
    raw.starts_with("MTBKS")
}

fn is_insdc_assembly(raw: &str) -> bool {
    raw.starts_with("GCA_")
}

/// Heuristic shape for WGS/master records: a short alphabetic prefix followed by
/// a run of zero-padded digits, optionally versioned (version is stripped by
/// `strip_version`, never by this predicate).
fn is_insdc_master(raw: &str) -> bool {
    let prefix_len = raw.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if !(4..=6).contains(&prefix_len) {
        return false;
    }
    let rest = &raw[prefix_len..];
    rest.len() >= 8 && rest.chars().all(|c| c.is_ascii_digit()) && rest.starts_with("00")
}

fn is_hum_id(raw: &str) -> bool {
    raw.to_ascii_lowercase().starts_with("hum")
}

fn is_geo(raw: &str) -> bool {
    raw.starts_with("GSE") && raw[3..].chars().all(|c| c.is_ascii_digit()) && raw.len() > 3
}

fn is_pubmed_id(raw: &str) -> bool {
    raw.chars().all(|c| c.is_ascii_digit()) && matches!(raw.len(), 7..=8)
}

/// Numeric accessions of exactly 7 digits are ambiguous between pubmed-id and
/// taxonomy per spec; the pubmed-id rule is checked first (see `rules()`), so
/// this predicate only needs to claim the unambiguous 1-6 digit range.
fn is_taxonomy(raw: &str) -> bool {
    raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() && raw.len() <= 6
}

fn rules() -> &'static [Rule] {
    use AccessionType::*;
    // Order matters only where shapes could otherwise overlap (none do here,
    // but keeping a fixed order keeps the table legible and future-proof).
    &[
        Rule {
            kind: Bioproject,
            matches: is_bioproject,
            normalize: identity,
            invalid_category: ClassifyError::InvalidBioprojectId,
        },
        Rule {
            kind: Biosample,
            matches: is_biosample,
            normalize: identity,
            invalid_category: ClassifyError::InvalidBiosampleId,
        },
        Rule {
            kind: Gea,
            matches: is_gea,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: Metabobank,
            matches: is_metabobank,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: InsdcAssembly,
            matches: is_insdc_assembly,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: InsdcMaster,
            matches: is_insdc_master,
            normalize: strip_version,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: HumId,
            matches: is_hum_id,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: Geo,
            matches: is_geo,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: PubmedId,
            matches: is_pubmed_id,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
        Rule {
            kind: Taxonomy,
            matches: is_taxonomy,
            normalize: identity,
            invalid_category: ClassifyError::InvalidAccessionId,
        },
    ]
}

fn jga_prefixes() -> [(&'static str, AccessionType); 4] {
    use AccessionType::*;
    [("JGAS", JgaStudy), ("JGAD", JgaDataset), ("JGAC", JgaDac), ("JGAP", JgaPolicy)]
}

/// Classifies a raw accession string into its [`AccessionType`] and normalized
/// form, or an error naming the invalid category. Deterministic and
/// dependency-free: never touches the filesystem, network, or a database.
pub fn classify(raw: &str) -> Result<Accession, ClassifyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassifyError::InvalidAccessionId(raw.to_string()));
    }

    if let Some(kind) = sra_subtype(trimmed) {
        return Ok(Accession::new(kind, trimmed));
    }

    for (prefix, kind) in jga_prefixes() {
        if trimmed.starts_with(prefix) && trimmed[prefix.len()..].chars().all(|c| c.is_ascii_digit()) {
            return Ok(Accession::new(kind, trimmed));
        }
    }

    for rule in rules() {
        if (rule.matches)(trimmed) {
            return Ok(Accession::new(rule.kind, (rule.normalize)(trimmed)));
        }
    }

    Err(ClassifyError::InvalidAccessionId(raw.to_string()))
}

/// Convenience predicate for callers that only need a yes/no and don't care
/// about the specific debug category (e.g. preserved-edge validation).
pub fn is_valid(raw: &str) -> bool {
    classify(raw).is_ok()
}

/// True when `raw` would be classified as exactly `kind`.
pub fn classifies_as(raw: &str, kind: AccessionType) -> bool {
    matches!(classify(raw), Ok(acc) if acc.kind == kind)
}

#[allow(dead_code)]
pub(crate) fn is_sra(raw: &str) -> bool {
    is_sra_like(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccessionType::*;

    #[test]
    fn classifies_each_family() {
        assert_eq!(classify("PRJNA9616").unwrap().kind, Bioproject);
        assert_eq!(classify("SAMN00000001").unwrap().kind, Biosample);
        assert_eq!(classify("DRA000001").unwrap().kind, SraSubmission);
        assert_eq!(classify("SRP000001").unwrap().kind, SraStudy);
        assert_eq!(classify("ERX000001").unwrap().kind, SraExperiment);
        assert_eq!(classify("DRR000001").unwrap().kind, SraRun);
        assert_eq!(classify("SRS000001").unwrap().kind, SraSample);
        assert_eq!(classify("ERZ000001").unwrap().kind, SraAnalysis);
        assert_eq!(classify("JGAS000001").unwrap().kind, JgaStudy);
        assert_eq!(classify("JGAD000001").unwrap().kind, JgaDataset);
        assert_eq!(classify("JGAC000001").unwrap().kind, JgaDac);
        assert_eq!(classify("JGAP000001").unwrap().kind, JgaPolicy);
        assert_eq!(classify("E-GEAD-123").unwrap().kind, Gea);
        assert_eq!(classify("MTBKS123").unwrap().kind, Metabobank);
        assert_eq!(classify("GCA_000001405.1").unwrap().kind, InsdcAssembly);
        assert_eq!(classify("hum0001").unwrap().kind, HumId);
        assert_eq!(classify("GSE12345").unwrap().kind, Geo);
        assert_eq!(classify("12345678").unwrap().kind, PubmedId);
        assert_eq!(classify("9606").unwrap().kind, Taxonomy);
    }

    #[test]
    fn insdc_assembly_keeps_version_master_strips_it() {
        let assembly = classify("GCA_000001405.29").unwrap();
        assert_eq!(assembly.value, "GCA_000001405.29");

        let master = classify("ABCD0000000000.1").unwrap();
        assert_eq!(master.kind, InsdcMaster);
        assert_eq!(master.value, "ABCD0000000000");
    }

    #[test]
    fn invalid_accession_is_rejected() {
        assert!(classify("not-an-accession!!").is_err());
        assert!(classify("").is_err());
    }

    #[test]
    fn invalid_categories_are_distinct_for_biosample_and_bioproject() {
        match classify("PRJ") {
            Err(ClassifyError::InvalidBioprojectId(_)) => {}
            other => panic!("expected InvalidBioprojectId, got {other:?}"),
        }
        match classify("SAM") {
            Err(ClassifyError::InvalidBiosampleId(_)) => {}
            other => panic!("expected InvalidBiosampleId, got {other:?}"),
        }
    }

    #[test]
    fn canonical_ordering_is_by_ordinal_then_accession() {
        let a = Accession::new(Bioproject, "PRJNA002");
        let b = Accession::new(Biosample, "SAMN001");
        assert!(a < b, "bioproject sorts before biosample by ordinal");

        let c = Accession::new(Bioproject, "PRJNA001");
        let d = Accession::new(Bioproject, "PRJNA002");
        assert!(c < d, "same type falls back to lexicographic accession order");
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(classify("  PRJNA1  ").unwrap().value, "PRJNA1");
    }
}
