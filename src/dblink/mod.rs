//! DBLink builder & store (spec.md §4.4): a single embedded analytical DB
//! accumulating the undirected relation graph, built by a fixed sequence of
//! extractors feeding a bounded channel drained by one serializer, then
//! finalized (canonicalize, blacklist, dedup, index) and dumped to TSV.

pub mod extractors;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{bounded, Sender};
use duckdb::{params, Connection};

use crate::accession::{Accession, AccessionType};
use crate::blacklist::{Blacklist, PreservedEdge};
use crate::errors::{DbLinkError, Error};

const SCHEMA: &str = "CREATE TABLE relation (
    src_type TEXT NOT NULL,
    src_accession TEXT NOT NULL,
    dst_type TEXT NOT NULL,
    dst_accession TEXT NOT NULL
);";

/// One relation edge between two classified accessions. Edges are undirected:
/// `Edge::new(a, b)` and `Edge::new(b, a)` denote the same relation (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub src: Accession,
    pub dst: Accession,
}

impl Edge {
    pub fn new(src: Accession, dst: Accession) -> Edge {
        Edge { src, dst }
    }

    /// Canonical form: `(src_type, src_accession) <= (dst_type, dst_accession)`
    /// under the fixed total order (ordinal, then lexicographic). Idempotent (P1)
    /// and independent of input orientation (P2).
    pub fn canonicalize(self) -> Edge {
        if self.src <= self.dst {
            self
        }
        else {
            Edge { src: self.dst, dst: self.src }
        }
    }
}

impl From<PreservedEdge> for Edge {
    fn from(value: PreservedEdge) -> Edge {
        Edge::new(value.from, value.to)
    }
}

/// Owns the `.tmp` DBLink store and a dedicated serializer thread draining a
/// bounded channel into transactions of 10,000-100,000 edges (spec.md §4.4
/// "Single-writer discipline"). Extractors run sequentially against this one
/// builder; each may spawn its own parallel parse workers that send batches
/// through `sender()`.
pub struct DbLinkBuilder {
    tmp_path: PathBuf,
    tx: Option<Sender<Vec<Edge>>>,
    serializer: Option<thread::JoinHandle<Result<usize, Error>>>,
}

const TRANSACTION_BATCH: usize = 50_000;

impl DbLinkBuilder {
    /// Creates a fresh `.tmp` store file (spec.md §3 "Built in a `.tmp` file
    /// and renamed on successful finalize") and starts the serializer thread.
    /// Used by `init_dblink_db`, the one step that wants a clean slate.
    pub fn init(store_path: &Path) -> Result<DbLinkBuilder, Error> {
        let tmp_path = store_path.with_extension("tmp");
        if let Some(parent) = tmp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let conn = Connection::open(&tmp_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::spawn_serializer(tmp_path, conn))
    }

    /// Reopens the `.tmp` store file `init_dblink_db` already created, for the
    /// extractor steps that each run as a separate process invocation against
    /// the same in-progress store (spec.md §4.4 "Extractors run sequentially
    /// against this one builder"). Unlike `init`, never truncates: each
    /// extractor's edges accumulate on top of the ones before it.
    pub fn resume(store_path: &Path) -> Result<DbLinkBuilder, Error> {
        let tmp_path = store_path.with_extension("tmp");
        let conn = Connection::open(&tmp_path)?;
        conn.execute_batch(&format!("CREATE TABLE IF NOT EXISTS {}", SCHEMA.trim_start_matches("CREATE TABLE ")))?;
        Ok(Self::spawn_serializer(tmp_path, conn))
    }

    fn spawn_serializer(tmp_path: PathBuf, conn: Connection) -> DbLinkBuilder {
        let (tx, rx) = bounded::<Vec<Edge>>(64);
        let serializer = thread::spawn(move || -> Result<usize, Error> {
            let mut total = 0usize;
            let mut pending = 0usize;
            let mut appender = conn.appender("relation")?;
            for batch in rx {
                for edge in &batch {
                    appender.append_row(params![
                        edge.src.kind.as_str(),
                        edge.src.value,
                        edge.dst.kind.as_str(),
                        edge.dst.value,
                    ])?;
                    pending += 1;
                }
                total += batch.len();
                if pending >= TRANSACTION_BATCH {
                    appender.flush()?;
                    pending = 0;
                }
            }
            appender.flush()?;
            Ok(total)
        });

        DbLinkBuilder { tmp_path, tx: Some(tx), serializer: Some(serializer) }
    }

    pub fn sender(&self) -> Sender<Vec<Edge>> {
        self.tx.as_ref().expect("builder not yet finalized").clone()
    }

    /// Runs one extractor against this builder. Extractors run in a fixed
    /// sequential order (the coordinator enforces this); each is free to
    /// parallelize its own input parsing internally.
    pub fn run_extractor<E: extractors::RelationExtractor>(&self, extractor: &E) -> Result<(), Error> {
        extractor.extract(self.sender())
    }

    /// Appends curated preserved edges directly, bypassing any extractor.
    pub fn append_preserved(&self, preserved: Vec<PreservedEdge>) -> Result<(), Error> {
        let edges: Vec<Edge> = preserved.into_iter().map(Edge::from).collect();
        if !edges.is_empty() {
            self.sender().send(edges).map_err(|_| Error::Critical("dblink serializer closed early".to_string()))?;
        }
        Ok(())
    }

    /// Drains the channel and joins the serializer without renaming the
    /// store into place, leaving the `.tmp` file ready for the next `resume`.
    /// Used by every extractor step except the last, since each runs as its
    /// own process invocation and `finalize` is the one that owns the rename.
    pub fn close(mut self) -> Result<usize, Error> {
        self.tx.take();
        self.serializer.take().expect("serializer present").join().expect("serializer thread panicked")
    }

    /// Drains the channel, joins the serializer, then runs finalize: (1)
    /// canonicalize, (2) apply blacklists, (3) dedup on canonical form, (4)
    /// build secondary indices, (5) rename tmp -> final (spec.md §4.4
    /// "Finalization").
    pub fn finalize(mut self, store_path: &Path, blacklist: &Blacklist) -> Result<FinalizeStats, Error> {
        self.tx.take();
        let total_written =
            self.serializer.take().expect("serializer present").join().expect("serializer thread panicked")?;

        let conn = Connection::open(&self.tmp_path)?;
        let mut edges: HashSet<Edge> = HashSet::with_capacity(total_written);
        let mut blacklisted = 0usize;

        {
            let mut stmt = conn.prepare("SELECT src_type, src_accession, dst_type, dst_accession FROM relation")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            for row in rows {
                let (src_type, src_accession, dst_type, dst_accession) = row?;
                let (Some(src_kind), Some(dst_kind)) =
                    (AccessionType::from_str(&src_type), AccessionType::from_str(&dst_type))
                else {
                    continue;
                };
                let edge = Edge::new(Accession::new(src_kind, src_accession), Accession::new(dst_kind, dst_accession))
                    .canonicalize();

                if blacklist.contains(&edge.src) || blacklist.contains(&edge.dst) {
                    blacklisted += 1;
                    continue;
                }
                edges.insert(edge);
            }
        }

        conn.execute_batch("DROP TABLE relation;")?;
        conn.execute_batch(SCHEMA)?;
        {
            let mut appender = conn.appender("relation")?;
            for edge in &edges {
                appender.append_row(params![
                    edge.src.kind.as_str(),
                    edge.src.value,
                    edge.dst.kind.as_str(),
                    edge.dst.value,
                ])?;
            }
            appender.flush()?;
        }
        conn.execute_batch(
            "CREATE UNIQUE INDEX idx_relation_canonical ON relation(src_type, src_accession, dst_type, dst_accession);
             CREATE INDEX idx_relation_src ON relation(src_type, src_accession);
             CREATE INDEX idx_relation_dst ON relation(dst_type, dst_accession);",
        )?;
        drop(conn);

        if store_path.exists() {
            fs::remove_file(store_path)?;
        }
        fs::rename(&self.tmp_path, store_path)?;

        Ok(FinalizeStats { written: total_written, blacklisted, unique_edges: edges.len() })
    }
}

#[derive(Debug)]
pub struct FinalizeStats {
    pub written: usize,
    pub blacklisted: usize,
    pub unique_edges: usize,
}

/// Read-only handle to a finalized DBLink store, opened after it has been
/// renamed into place (spec.md §5 "Shared-resource policy").
pub struct DbLink {
    conn: Connection,
}

impl DbLink {
    pub fn open(store_path: &Path) -> Result<DbLink, Error> {
        if !store_path.exists() {
            return Err(Error::DbLink(DbLinkError::NotFinalized));
        }
        let conn = Connection::open(store_path)?;
        Ok(DbLink { conn })
    }

    /// Cross-references for `accession`, regardless of which side of the
    /// canonical edge it was stored on (spec.md §4.7 step 5).
    pub fn cross_references(&self, accession: &Accession) -> Result<Vec<Accession>, Error> {
        let mut out = Vec::new();

        let mut as_src = self
            .conn
            .prepare("SELECT dst_type, dst_accession FROM relation WHERE src_type = ? AND src_accession = ?")?;
        let rows = as_src.query_map(params![accession.kind.as_str(), accession.value], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (kind, value) = row?;
            if let Some(kind) = AccessionType::from_str(&kind) {
                out.push(Accession::new(kind, value));
            }
        }

        let mut as_dst = self
            .conn
            .prepare("SELECT src_type, src_accession FROM relation WHERE dst_type = ? AND dst_accession = ?")?;
        let rows = as_dst.query_map(params![accession.kind.as_str(), accession.value], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (kind, value) = row?;
            if let Some(kind) = AccessionType::from_str(&kind) {
                out.push(Accession::new(kind, value));
            }
        }

        Ok(out)
    }

    pub fn count(&self) -> Result<i64, Error> {
        self.conn.query_row("SELECT count(*) FROM relation", [], |row| row.get(0)).map_err(Error::from)
    }

    /// Edge count grouped by `(src_type, dst_type)`, used by `show_dblink_counts`.
    pub fn counts_by_pair(&self) -> Result<Vec<(AccessionType, AccessionType, i64)>, Error> {
        let mut stmt =
            self.conn.prepare("SELECT src_type, dst_type, count(*) FROM relation GROUP BY src_type, dst_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (src, dst, count) = row?;
            if let (Some(src), Some(dst)) = (AccessionType::from_str(&src), AccessionType::from_str(&dst)) {
                out.push((src, dst, count));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(out)
    }
}

/// The dump orientation table: each entry names the output column-1 type for
/// one TSV file. Enumerating spec.md §4.4's extractor table yields 17
/// non-SRA cross-family pairs — one more than the "16" the prose names; the
/// SRA-internal relations are not separately dumped (already served directly
/// off the accessions store), and we implement all 17 non-SRA pairs rather
/// than arbitrarily drop one (see DESIGN.md).
pub fn dump_pairs() -> Vec<(AccessionType, AccessionType)> {
    use AccessionType::*;
    vec![
        (Bioproject, Biosample),
        (Bioproject, UmbrellaBioproject),
        (Bioproject, HumId),
        (InsdcAssembly, Bioproject),
        (InsdcAssembly, Biosample),
        (InsdcAssembly, InsdcMaster),
        (InsdcMaster, Bioproject),
        (InsdcMaster, Biosample),
        (Gea, Bioproject),
        (Gea, Biosample),
        (Metabobank, Bioproject),
        (Metabobank, Biosample),
        (JgaStudy, JgaDataset),
        (JgaStudy, PubmedId),
        (JgaStudy, HumId),
        (JgaDataset, JgaPolicy),
        (JgaPolicy, JgaDac),
    ]
}

/// Dumps each configured pair to a two-column TSV, sorted ascending by column
/// 1, written under `dblink_path/{src_type}_{dst_type}.tsv` (spec.md §4.4
/// "TSV dump", §6 "Relations TSV").
pub fn dump(store_path: &Path, dblink_path: &Path) -> Result<Vec<(PathBuf, usize)>, Error> {
    let dblink = DbLink::open(store_path)?;
    fs::create_dir_all(dblink_path)?;

    let mut outputs = Vec::new();
    for (src_kind, dst_kind) in dump_pairs() {
        let mut rows: Vec<(String, String)> = Vec::new();

        let mut forward = dblink
            .conn
            .prepare("SELECT src_accession, dst_accession FROM relation WHERE src_type = ? AND dst_type = ?")?;
        let fwd_rows = forward.query_map(params![src_kind.as_str(), dst_kind.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in fwd_rows {
            rows.push(row?);
        }

        if src_kind != dst_kind {
            let mut reverse = dblink
                .conn
                .prepare("SELECT dst_accession, src_accession FROM relation WHERE dst_type = ? AND src_type = ?")?;
            let rev_rows = reverse.query_map(params![src_kind.as_str(), dst_kind.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rev_rows {
                rows.push(row?);
            }
        }

        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let filename = format!("{}_{}.tsv", src_kind.as_str(), dst_kind.as_str());
        let path = dblink_path.join(filename);
        let mut out = String::new();
        for (a, b) in &rows {
            out.push_str(a);
            out.push('\t');
            out.push_str(b);
            out.push('\n');
        }
        let tmp = path.with_extension("tsv.tmp");
        fs::write(&tmp, out)?;
        fs::rename(&tmp, &path)?;
        outputs.push((path, rows.len()));
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::accession::classify;

    fn acc(raw: &str) -> Accession {
        classify(raw).unwrap()
    }

    #[test]
    fn canonicalize_swaps_by_ordinal_then_lexicographic() {
        let edge = Edge::new(acc("SAMN001"), acc("PRJNA001")).canonicalize();
        assert_eq!(edge.src.kind, AccessionType::Bioproject);
        assert_eq!(edge.dst.kind, AccessionType::Biosample);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = Edge::new(acc("SAMN001"), acc("PRJNA001")).canonicalize();
        let twice = once.clone().canonicalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn same_endpoints_canonicalize_identically_regardless_of_orientation() {
        let a = Edge::new(acc("PRJNA001"), acc("SAMN001")).canonicalize();
        let b = Edge::new(acc("SAMN001"), acc("PRJNA001")).canonicalize();
        assert_eq!(a, b);
    }

    #[test]
    fn finalize_dedups_canonicalizes_and_applies_blacklist() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("dblink.store");

        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder
            .sender()
            .send(vec![
                Edge::new(acc("PRJDB1"), acc("SAMD1")),
                Edge::new(acc("SAMD1"), acc("PRJDB1")), // duplicate, reverse orientation
                Edge::new(acc("PRJDB2"), acc("SAMD1")),
            ])
            .unwrap();

        let blacklist_dir = dir.path().join("blacklist");
        fs::create_dir_all(&blacklist_dir).unwrap();
        fs::write(blacklist_dir.join("bioproject.txt"), "PRJDB1\n").unwrap();
        let blacklist = Blacklist::load(dir.path()).unwrap();

        let stats = builder.finalize(&store_path, &blacklist).unwrap();
        assert_eq!(stats.blacklisted, 2);
        assert_eq!(stats.unique_edges, 1);

        let dblink = DbLink::open(&store_path).unwrap();
        assert_eq!(dblink.count().unwrap(), 1);
        let xrefs = dblink.cross_references(&acc("SAMD1")).unwrap();
        assert_eq!(xrefs, vec![acc("PRJDB2")]);
    }

    #[test]
    fn dump_sorts_by_first_column_and_covers_orientation() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("dblink.store");

        let builder = DbLinkBuilder::init(&store_path).unwrap();
        builder
            .sender()
            .send(vec![Edge::new(acc("PRJNA002"), acc("SAMN001")), Edge::new(acc("PRJNA001"), acc("SAMN002"))])
            .unwrap();
        let stats = builder.finalize(&store_path, &Blacklist::default()).unwrap();
        assert_eq!(stats.unique_edges, 2);

        let dump_dir = dir.path().join("dump");
        let outputs = dump(&store_path, &dump_dir).unwrap();
        let (bp_bs_path, count) = outputs.iter().find(|(p, _)| p.ends_with("bioproject_biosample.tsv")).unwrap();
        assert_eq!(*count, 2);

        let contents = fs::read_to_string(bp_bs_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["PRJNA001\tSAMN002", "PRJNA002\tSAMN001"]);
    }
}
