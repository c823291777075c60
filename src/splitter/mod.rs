//! Constant-memory batch splitters (spec.md §4.2).
//!
//! Turns a multi-GB `BioSampleSet`/`PackageSet` XML document, or a tab-separated
//! accessions table, into fixed-size shard files under a target directory.
//! Memory use is O(largest record): records are streamed through `quick-xml`'s
//! buffered reader and written straight to the current shard writer, never
//! buffered as a whole document.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, SplitError};

/// Written alongside the shard directory once splitting finishes; lets the
/// JSONL emitter validate completeness before an incremental run starts
/// (SPEC_FULL.md §4.2 — generalized from the teacher's network resume marker
/// to a shard-manifest completeness check).
#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub shard_count: usize,
    pub record_count: usize,
    pub root_element: String,
    pub record_element: String,
}

impl Manifest {
    pub fn path(shard_dir: &Path) -> PathBuf {
        shard_dir.join("_manifest.json")
    }

    pub fn write(&self, shard_dir: &Path) -> Result<(), Error> {
        let path = Self::path(shard_dir);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn read(shard_dir: &Path) -> Result<Manifest, Error> {
        let bytes = fs::read(Self::path(shard_dir))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = File::open(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    }
    else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Splits `input` (an XML document wrapped by a single `root_element`, each
/// record delimited by `record_element`) into shards of `records_per_shard`
/// records under `shard_dir`. Shards are written to a `.tmp` sibling directory
/// and renamed into place only once the whole input has been consumed
/// successfully — a corrupt record aborts before anything is renamed, leaving
/// the previous shard set (if any) untouched.
pub fn split_xml(
    input: &Path,
    shard_dir: &Path,
    root_element: &str,
    record_element: &str,
    records_per_shard: usize,
) -> Result<Manifest, Error> {
    let tmp_dir = shard_dir.with_extension("tmp");
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir_all(&tmp_dir)?;

    let result = split_xml_into(input, &tmp_dir, root_element, record_element, records_per_shard);
    match result {
        Ok(manifest) => {
            if shard_dir.exists() {
                fs::remove_dir_all(shard_dir)?;
            }
            fs::rename(&tmp_dir, shard_dir)?;
            manifest.write(shard_dir)?;
            Ok(manifest)
        }
        Err(err) => {
            let _ = fs::remove_dir_all(&tmp_dir);
            Err(err)
        }
    }
}

fn shard_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("split_{index:06}.xml"))
}

struct ShardWriter {
    dir: PathBuf,
    root_element: String,
    index: usize,
    per_shard: usize,
    in_shard: usize,
    writer: Option<BufWriter<File>>,
}

impl ShardWriter {
    fn new(dir: PathBuf, root_element: String, per_shard: usize) -> ShardWriter {
        ShardWriter { dir, root_element, index: 0, per_shard, in_shard: 0, writer: None }
    }

    fn ensure_open(&mut self) -> Result<(), Error> {
        if self.writer.is_none() {
            let file = File::create(shard_path(&self.dir, self.index))?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "<{}>", self.root_element)?;
            self.writer = Some(writer);
            self.in_shard = 0;
        }
        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), Error> {
        self.ensure_open()?;
        let writer = self.writer.as_mut().expect("shard writer opened above");
        writer.write_all(record)?;
        writer.write_all(b"\n")?;
        self.in_shard += 1;

        if self.in_shard >= self.per_shard {
            self.close_current()?;
        }
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), Error> {
        if let Some(mut writer) = self.writer.take() {
            writeln!(writer, "</{}>", self.root_element)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            self.index += 1;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<usize, Error> {
        self.close_current()?;
        Ok(self.index)
    }
}

fn split_xml_into(
    input: &Path,
    shard_dir: &Path,
    root_element: &str,
    record_element: &str,
    records_per_shard: usize,
) -> Result<Manifest, Error> {
    let source = open_input(input)?;
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(false);

    let mut shard_writer = ShardWriter::new(shard_dir.to_path_buf(), root_element.to_string(), records_per_shard);
    let mut buf = Vec::new();
    let mut record_buf: Vec<u8> = Vec::new();
    let mut depth = 0usize;
    let mut in_record = false;
    let mut record_count = 0usize;
    let mut saw_root = false;

    loop {
        let start = buf.len();
        let event = reader.read_event_into(&mut buf).map_err(crate::errors::XmlError::from)?;

        if in_record {
            record_buf.extend_from_slice(&buf[start..]);
        }

        match &event {
            Event::Start(e) => {
                let name = e.name();
                if !saw_root && crate::xml_util::name_eq(name, root_element) {
                    saw_root = true;
                    record_buf.clear();
                    in_record = false;
                    continue;
                }
                if !in_record && crate::xml_util::name_eq(name, record_element) {
                    in_record = true;
                    depth = 1;
                    record_buf.clear();
                    record_buf.extend_from_slice(&buf[start..]);
                }
                else if in_record && crate::xml_util::name_eq(name, record_element) {
                    depth += 1;
                }
            }
            Event::End(e) => {
                let name = e.name();
                if crate::xml_util::name_eq(name, root_element) && !in_record {
                    continue;
                }
                if in_record && crate::xml_util::name_eq(name, record_element) {
                    depth -= 1;
                    if depth == 0 {
                        shard_writer.write_record(&record_buf)?;
                        record_count += 1;
                        in_record = false;
                        record_buf.clear();
                    }
                }
            }
            Event::Eof => {
                if in_record {
                    return Err(Error::Split(SplitError::UnmatchedEndTag(record_element.to_string())));
                }
                if !saw_root {
                    return Err(Error::Split(SplitError::MissingRoot(root_element.to_string())));
                }
                break;
            }
            _ => {}
        }

        buf.clear();
    }

    let shard_count = shard_writer.finish()?;
    Ok(Manifest {
        shard_count,
        record_count,
        root_element: root_element.to_string(),
        record_element: record_element.to_string(),
    })
}

/// Splits a tab-separated accessions table (`SRA_Accessions.tab`) into shards
/// of `records_per_shard` lines, preserving the header line at the top of
/// every shard so each can be loaded independently.
pub fn split_tsv(input: &Path, shard_dir: &Path, records_per_shard: usize) -> Result<Manifest, Error> {
    let tmp_dir = shard_dir.with_extension("tmp");
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir_all(&tmp_dir)?;

    let result = split_tsv_into(input, &tmp_dir, records_per_shard);
    match result {
        Ok(manifest) => {
            if shard_dir.exists() {
                fs::remove_dir_all(shard_dir)?;
            }
            fs::rename(&tmp_dir, shard_dir)?;
            manifest.write(shard_dir)?;
            Ok(manifest)
        }
        Err(err) => {
            let _ = fs::remove_dir_all(&tmp_dir);
            Err(err)
        }
    }
}

fn split_tsv_into(input: &Path, shard_dir: &Path, records_per_shard: usize) -> Result<Manifest, Error> {
    let source = open_input(input)?;
    let mut lines = source.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(Error::Split(SplitError::MissingRoot("header".to_string()))),
    };

    let mut index = 0usize;
    let mut in_shard = 0usize;
    let mut record_count = 0usize;
    let mut writer: Option<BufWriter<File>> = None;

    macro_rules! open_shard {
        () => {{
            let mut w = BufWriter::new(File::create(shard_path(shard_dir, index))?);
            writeln!(w, "{header}")?;
            w
        }};
    }

    for line in lines {
        let line = line?;
        if writer.is_none() {
            writer = Some(open_shard!());
            in_shard = 0;
        }
        let w = writer.as_mut().expect("shard writer opened above");
        writeln!(w, "{line}")?;
        in_shard += 1;
        record_count += 1;

        if in_shard >= records_per_shard {
            let mut w = writer.take().expect("writer present");
            w.flush()?;
            w.get_ref().sync_all()?;
            index += 1;
        }
    }
    if let Some(mut w) = writer {
        w.flush()?;
        w.get_ref().sync_all()?;
        index += 1;
    }

    Ok(Manifest { shard_count: index, record_count, root_element: String::new(), record_element: "row".to_string() })
}

/// Lists shard files in lexicographic name order, the only cross-shard order
/// the spec guarantees (spec.md §5 "Ordering").
pub fn list_shards(shard_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut paths: Vec<PathBuf> = fs::read_dir(shard_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::tempdir;

    use super::*;

    fn write_input(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn splits_into_shards_of_n_records() {
        let dir = tempdir().unwrap();
        let xml = "<BioSampleSet>\
            <BioSample accession=\"SAMN1\"></BioSample>\
            <BioSample accession=\"SAMN2\"></BioSample>\
            <BioSample accession=\"SAMN3\"></BioSample>\
            </BioSampleSet>";
        let input = write_input(dir.path(), "in.xml", xml);
        let shard_dir = dir.path().join("shards");

        let manifest = split_xml(&input, &shard_dir, "BioSampleSet", "BioSample", 2).unwrap();
        assert_eq!(manifest.record_count, 3);
        assert_eq!(manifest.shard_count, 2);

        let shards = list_shards(&shard_dir).unwrap();
        assert_eq!(shards.len(), 2);

        let first = fs::read_to_string(&shards[0]).unwrap();
        assert_eq!(first.matches("<BioSample").count(), 2);
        let second = fs::read_to_string(&shards[1]).unwrap();
        assert_eq!(second.matches("<BioSample").count(), 1);
    }

    #[test]
    fn round_trip_preserves_record_multiset() {
        let dir = tempdir().unwrap();
        let xml = "<PackageSet><Package id=\"1\"/><Package id=\"2\"/><Package id=\"3\"/><Package id=\"4\"/></PackageSet>";
        let input = write_input(dir.path(), "in.xml", xml);
        let shard_dir = dir.path().join("shards");

        split_xml(&input, &shard_dir, "PackageSet", "Package", 3).unwrap();
        let shards = list_shards(&shard_dir).unwrap();

        let mut ids = Vec::new();
        for shard in shards {
            let content = fs::read_to_string(&shard).unwrap();
            for line in content.lines() {
                if let Some(start) = line.find("id=\"") {
                    let rest = &line[start + 4..];
                    if let Some(end) = rest.find('"') {
                        ids.push(rest[..end].to_string());
                    }
                }
            }
        }
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn unmatched_end_tag_aborts_without_partial_shards() {
        let dir = tempdir().unwrap();
        let xml = "<BioSampleSet><BioSample accession=\"SAMN1\">";
        let input = write_input(dir.path(), "in.xml", xml);
        let shard_dir = dir.path().join("shards");

        let result = split_xml(&input, &shard_dir, "BioSampleSet", "BioSample", 2);
        assert!(result.is_err());
        assert!(!shard_dir.exists());
    }

    #[test]
    fn tsv_shards_preserve_header() {
        let dir = tempdir().unwrap();
        let tsv = "Accession\tSubmission\nSRR1\tSRA1\nSRR2\tSRA1\nSRR3\tSRA2\n";
        let input = write_input(dir.path(), "in.tab", tsv);
        let shard_dir = dir.path().join("shards");

        let manifest = split_tsv(&input, &shard_dir, 2).unwrap();
        assert_eq!(manifest.record_count, 3);
        assert_eq!(manifest.shard_count, 2);
    }
}
