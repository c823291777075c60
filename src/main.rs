mod accession;
mod accessions_store;
mod blacklist;
mod config;
mod date_cache;
mod dblink;
mod errors;
mod jsonl;
mod last_run;
mod log;
mod records;
mod sink;
mod splitter;
mod utils;
mod xml_util;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use config::Config;
use errors::Error;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::accession::AccessionType;
use crate::accessions_store::AccessionsStore;
use crate::blacklist::Blacklist;
use crate::date_cache::DateCache;
use crate::dblink::extractors::{
    AssemblyMasterExtractor, BpBsExtractor, BpInternalExtractor, GeaExtractor, JgaExtractor, MetabobankExtractor,
    SraInternalExtractor,
};
use crate::dblink::{DbLink, DbLinkBuilder};
use crate::jsonl::EmitterContext;
use crate::log::{LogFields, RunCoordinator, RunStatus};
use crate::sink::HttpDocumentSink;

/// Daily batch pipeline turning BioProject/BioSample/SRA/DRA/JGA/GEA/
/// MetaboBank/assembly/TRAD inputs into a cross-reference graph and a set of
/// per-entity search documents.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verifies the external resources every other step depends on are reachable
    CheckExternalResources,

    /// Splits the BioProject PackageSet XML into fixed-size shards
    PrepareBioprojectXml { input: PathBuf },

    /// Splits the BioSample BioSampleSet XML into fixed-size shards
    PrepareBiosampleXml { input: PathBuf },

    /// Loads the daily NCBI SRA / DDBJ DRA accessions tabs into the accessions store
    BuildSraAndDraAccessionsDb { sra_tab: PathBuf, dra_tab: PathBuf },

    /// Creates a fresh DBLink `.tmp` store ready to receive extractor output
    InitDblinkDb,

    /// bioproject <-> biosample (BP shard links + curated preserved pairs)
    CreateDblinkBpBsRelations,

    /// bioproject <-> umbrella-bioproject / hum-id (BP shard internals)
    CreateDblinkBpInternalRelations,

    /// insdc-assembly/insdc-master <-> bioproject/biosample
    CreateDblinkAssemblyMasterRelations { assembly_summary: PathBuf, #[arg(long = "trad")] trad_organism: Vec<PathBuf> },

    /// gea <-> bioproject/biosample
    CreateDblinkGeaRelations { #[arg(long = "sdrf")] sdrf: Vec<PathBuf> },

    /// metabobank <-> bioproject/biosample
    CreateDblinkMetabobankRelations { #[arg(long = "sdrf")] sdrf: Vec<PathBuf> },

    /// jga-study/dataset/policy/dac internal cross-links
    CreateDblinkJgaRelations,

    /// sra-submission <-> sra-study/experiment/run/sample/analysis
    CreateDblinkSraInternalRelations,

    /// Canonicalizes, dedups, blacklists, indexes, and renames the DBLink store into place
    FinalizeDblinkDb,

    /// Dumps every configured relation pair to a sorted two-column TSV
    DumpDblinkFiles,

    /// Rebuilds the BP/BS date cache from the external date source
    BuildBpBsDateCache,

    /// Builds/refreshes the cached offset index over `sra/NCBI_SRA.tar`
    SyncNcbiTar,

    /// Builds/refreshes the cached offset index over `sra/DRA.tar`
    SyncDraTar,

    /// Emits BioProject JSONL documents
    GenerateBpJsonl(GenerateArgs),

    /// Emits BioSample JSONL documents
    GenerateBsJsonl(GenerateArgs),

    /// Emits SRA/DRA JSONL documents across the six indices
    GenerateSraJsonl(GenerateArgs),

    /// Emits JGA JSONL documents
    GenerateJgaJsonl(GenerateArgs),

    /// Hotfix: materializes exactly the given accessions into `regenerate/{YYYYMMDD}/run.jsonl`
    RegenerateJsonl {
        #[arg(long = "type")]
        family: String,
        #[arg(long)]
        accessions: Vec<String>,
        #[arg(long)]
        accession_file: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Bulk-indexes one family's JSONL shards into the search backend
    EsIngest { family: String, index: String },

    /// Deletes every blacklisted accession for one family from the search backend
    EsDelete { family: String, index: String },

    /// Prints every log record for a run, in timestamp order
    ShowLog { run_id: String },

    /// Prints a run's status, duration, and per-level/per-category counts
    ShowLogSummary { run_id: String },

    /// Prints the DBLink edge count for every `(src_type, dst_type)` pair
    ShowDblinkCounts,
}

/// Shared flags for the four `generate_*_jsonl` steps (spec.md §6 CLI surface).
#[derive(clap::Args)]
struct GenerateArgs {
    /// Ignore last_run.json and emit every non-blacklisted record
    #[arg(long)]
    full: bool,
    /// Overrides Config::parallel_num for this step only
    #[arg(long)]
    parallel_num: Option<usize>,
    /// Validates the input shard manifest before emitting, failing fast on a partial split
    #[arg(long)]
    resume: bool,
}

fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::fmt().with_span_events(FmtSpan::CLOSE).with_target(false).with_level(false).init();

    let cli = Cli::parse();
    let config = cli.config;
    let run_name = run_name_for(&cli.command);
    let coordinator = RunCoordinator::start(run_name, &config.result_dir)?;

    let result = dispatch(&cli.command, &config, &coordinator);
    match &result {
        Ok(()) => coordinator.finish(RunStatus::Success)?,
        Err(err) => {
            coordinator.error("step failed", &err.to_string(), LogFields::default())?;
            coordinator.finish(RunStatus::Failed)?;
        }
    }
    result
}

fn run_name_for(command: &Commands) -> &'static str {
    match command {
        Commands::CheckExternalResources => "check_external_resources",
        Commands::PrepareBioprojectXml { .. } => "prepare_bioproject_xml",
        Commands::PrepareBiosampleXml { .. } => "prepare_biosample_xml",
        Commands::BuildSraAndDraAccessionsDb { .. } => "build_sra_and_dra_accessions_db",
        Commands::InitDblinkDb => "init_dblink_db",
        Commands::CreateDblinkBpBsRelations => "create_dblink_bp_bs_relations",
        Commands::CreateDblinkBpInternalRelations => "create_dblink_bp_internal_relations",
        Commands::CreateDblinkAssemblyMasterRelations { .. } => "create_dblink_assembly_master_relations",
        Commands::CreateDblinkGeaRelations { .. } => "create_dblink_gea_relations",
        Commands::CreateDblinkMetabobankRelations { .. } => "create_dblink_metabobank_relations",
        Commands::CreateDblinkJgaRelations => "create_dblink_jga_relations",
        Commands::CreateDblinkSraInternalRelations => "create_dblink_sra_internal_relations",
        Commands::FinalizeDblinkDb => "finalize_dblink_db",
        Commands::DumpDblinkFiles => "dump_dblink_files",
        Commands::BuildBpBsDateCache => "build_bp_bs_date_cache",
        Commands::SyncNcbiTar => "sync_ncbi_tar",
        Commands::SyncDraTar => "sync_dra_tar",
        Commands::GenerateBpJsonl(_) => "generate_bp_jsonl",
        Commands::GenerateBsJsonl(_) => "generate_bs_jsonl",
        Commands::GenerateSraJsonl(_) => "generate_sra_jsonl",
        Commands::GenerateJgaJsonl(_) => "generate_jga_jsonl",
        Commands::RegenerateJsonl { .. } => "regenerate_jsonl",
        Commands::EsIngest { .. } => "es_ingest",
        Commands::EsDelete { .. } => "es_delete",
        Commands::ShowLog { .. } => "show_log",
        Commands::ShowLogSummary { .. } => "show_log_summary",
        Commands::ShowDblinkCounts => "show_dblink_counts",
    }
}

fn dispatch(command: &Commands, config: &Config, coordinator: &RunCoordinator) -> Result<(), Error> {
    match command {
        Commands::CheckExternalResources => check_external_resources(config, coordinator),
        Commands::PrepareBioprojectXml { input } => {
            let shard_dir = config.tmp_xml_dir("bp");
            let manifest = splitter::split_xml(input, &shard_dir, "PackageSet", "Package", config.shard_size)?;
            coordinator.info(&format!("split bioproject xml into {} shards", manifest.shard_count))
        }
        Commands::PrepareBiosampleXml { input } => {
            let shard_dir = config.tmp_xml_dir("bs");
            let manifest = splitter::split_xml(input, &shard_dir, "BioSampleSet", "BioSample", config.shard_size)?;
            coordinator.info(&format!("split biosample xml into {} shards", manifest.shard_count))
        }
        Commands::BuildSraAndDraAccessionsDb { sra_tab, dra_tab } => {
            let store_path = sra_accessions_store_path(config);
            let count = crate::accessions_store::build(&[sra_tab.clone(), dra_tab.clone()], &store_path)?;
            coordinator.info(&format!("loaded {count} accession rows"))
        }
        Commands::InitDblinkDb => {
            DbLinkBuilder::init(&config.dblink_store_path())?.close()?;
            coordinator.info("initialized dblink tmp store")
        }
        Commands::CreateDblinkBpBsRelations => run_extractor(
            config,
            coordinator,
            &BpBsExtractor { bp_shard_dir: config.tmp_xml_dir("bp"), preserved_path: preserved_path(config, "bp_bs") },
        ),
        Commands::CreateDblinkBpInternalRelations => {
            run_extractor(config, coordinator, &BpInternalExtractor { bp_shard_dir: config.tmp_xml_dir("bp") })
        }
        Commands::CreateDblinkAssemblyMasterRelations { assembly_summary, trad_organism } => run_extractor(
            config,
            coordinator,
            &AssemblyMasterExtractor {
                assembly_summary_path: assembly_summary.clone(),
                trad_organism_paths: trad_organism.clone(),
            },
        ),
        Commands::CreateDblinkGeaRelations { sdrf } => {
            run_extractor(config, coordinator, &GeaExtractor { sdrf_paths: sdrf.clone() })
        }
        Commands::CreateDblinkMetabobankRelations { sdrf } => run_extractor(
            config,
            coordinator,
            &MetabobankExtractor { sdrf_paths: sdrf.clone(), preserved_path: preserved_path(config, "metabobank") },
        ),
        Commands::CreateDblinkJgaRelations => run_extractor(
            config,
            coordinator,
            &JgaExtractor {
                study_shard_dir: jga_shard_dir(config, "study"),
                dataset_shard_dir: jga_shard_dir(config, "dataset"),
                policy_shard_dir: jga_shard_dir(config, "policy"),
            },
        ),
        Commands::CreateDblinkSraInternalRelations => run_extractor(
            config,
            coordinator,
            &SraInternalExtractor { accessions_store_path: sra_accessions_store_path(config) },
        ),
        Commands::FinalizeDblinkDb => {
            let blacklist = Blacklist::load(&config.const_dir)?;
            let builder = DbLinkBuilder::resume(&config.dblink_store_path())?;
            let stats = builder.finalize(&config.dblink_store_path(), &blacklist)?;
            coordinator.info(&format!(
                "finalized dblink store: {} written, {} blacklisted, {} unique edges",
                stats.written, stats.blacklisted, stats.unique_edges
            ))
        }
        Commands::DumpDblinkFiles => {
            let outputs = dblink::dump(&config.dblink_store_path(), &config.dblink_path)?;
            coordinator.info(&format!("dumped {} relation files", outputs.len()))
        }
        Commands::BuildBpBsDateCache => {
            let count = crate::date_cache::build(
                &config.postgres_url,
                &[crate::date_cache::BIOPROJECT_QUERY, crate::date_cache::BIOSAMPLE_QUERY],
                &config.date_cache_store_path(),
            )?;
            coordinator.info(&format!("cached {count} date rows"))
        }
        Commands::SyncNcbiTar => {
            let tar_path = config.accessions_store_dir().join("NCBI_SRA.tar");
            let count = jsonl::sra::TarIndex::build(&tar_path, &tar_index_path(&tar_path))?;
            coordinator.info(&format!("indexed {count} submissions in NCBI_SRA.tar"))
        }
        Commands::SyncDraTar => {
            let tar_path = config.accessions_store_dir().join("DRA.tar");
            let count = jsonl::sra::TarIndex::build(&tar_path, &tar_index_path(&tar_path))?;
            coordinator.info(&format!("indexed {count} submissions in DRA.tar"))
        }
        Commands::GenerateBpJsonl(args) => generate_bp_or_bs(config, coordinator, args, "bioproject"),
        Commands::GenerateBsJsonl(args) => generate_bp_or_bs(config, coordinator, args, "biosample"),
        Commands::GenerateSraJsonl(args) => generate_sra(config, coordinator, args),
        Commands::GenerateJgaJsonl(args) => generate_jga(config, coordinator, args),
        Commands::RegenerateJsonl { family, accessions, accession_file, output_dir } => {
            regenerate(config, coordinator, family, accessions, accession_file.as_deref(), output_dir.as_deref())
        }
        Commands::EsIngest { family, index } => es_ingest(config, coordinator, family, index),
        Commands::EsDelete { family, index } => es_delete(config, coordinator, family, index),
        Commands::ShowLog { run_id } => {
            for record in log::show_log(&config.result_dir, run_id)? {
                println!("{}", serde_json::to_string(&record)?);
            }
            Ok(())
        }
        Commands::ShowLogSummary { run_id } => {
            let summary = log::show_log_summary(&config.result_dir, run_id)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::ShowDblinkCounts => {
            let dblink = DbLink::open(&config.dblink_store_path())?;
            for (src, dst, count) in dblink.counts_by_pair()? {
                println!("{}\t{}\t{count}", src.as_str(), dst.as_str());
            }
            Ok(())
        }
    }
}

fn check_external_resources(config: &Config, coordinator: &RunCoordinator) -> Result<(), Error> {
    if config.postgres_url.trim().is_empty() {
        return Err(Error::Critical("POSTGRES_URL is not configured".to_string()));
    }
    if config.es_url.trim().is_empty() {
        return Err(Error::Critical("ES_URL is not configured".to_string()));
    }
    std::fs::create_dir_all(&config.result_dir)?;
    if !config.const_dir.exists() {
        return Err(Error::Critical(format!("const dir does not exist: {}", config.const_dir.display())));
    }
    coordinator.info("external resources look reachable")
}

fn preserved_path(config: &Config, name: &str) -> PathBuf {
    config.const_dir.join("preserved").join(format!("{name}.tsv"))
}

fn jga_shard_dir(config: &Config, kind: &str) -> PathBuf {
    config.tmp_xml_dir(&format!("jga_{kind}"))
}

fn sra_accessions_store_path(config: &Config) -> PathBuf {
    config.accessions_store_dir().join("accessions.store")
}

fn tar_index_path(tar_path: &Path) -> PathBuf {
    tar_path.with_extension("tar.index")
}

/// Extractor steps all write through the same `.tmp` DBLink file; each runs
/// as its own process invocation, so this reopens a builder bound to that
/// `.tmp` path, runs the extractor, then closes the serializer without
/// renaming anything into place. `finalize_dblink_db` is the step that joins
/// the last writer and renames the store.
fn run_extractor<E: dblink::extractors::RelationExtractor>(
    config: &Config,
    coordinator: &RunCoordinator,
    extractor: &E,
) -> Result<(), Error> {
    let builder = DbLinkBuilder::resume(&config.dblink_store_path())?;
    builder.run_extractor(extractor)?;
    let written = builder.close()?;
    coordinator.info(&format!("extractor step wrote {written} edges"))
}

fn shard_index_of(path: &Path) -> usize {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0)
}

fn emitter_context(
    config: &Config,
    coordinator: &RunCoordinator,
    family: &str,
    full: bool,
    needs_date_cache: bool,
) -> Result<EmitterContext, Error> {
    let last_run = last_run::LastRun::load(&config.last_run_path())?;
    let cutoff = if full { None } else { last_run.cutoff(family, config.margin_days) };
    let date_cache = if needs_date_cache {
        let store_path = config.date_cache_store_path();
        let modified: chrono::DateTime<chrono::Utc> = std::fs::metadata(&store_path)
            .map_err(|_| Error::Lookup(crate::errors::LookupError::StaleDateCache))?
            .modified()?
            .into();
        if modified < coordinator.start {
            return Err(Error::Lookup(crate::errors::LookupError::StaleDateCache));
        }
        Some(DateCache::open(&store_path)?)
    }
    else {
        None
    };
    Ok(EmitterContext {
        dblink: DbLink::open(&config.dblink_store_path())?,
        date_cache,
        blacklist: Blacklist::load(&config.const_dir)?,
        cutoff,
        cancelled: coordinator.cancel_flag(),
    })
}

fn generate_bp_or_bs(config: &Config, coordinator: &RunCoordinator, args: &GenerateArgs, family: &str) -> Result<(), Error> {
    let source = if family == "bioproject" { "bp" } else { "bs" };
    let shard_dir = config.tmp_xml_dir(source);
    if args.resume {
        splitter::Manifest::read(&shard_dir)?;
    }
    let shards = splitter::list_shards(&shard_dir)?;
    let parallel_num = args.parallel_num.unwrap_or(config.parallel_num);
    let jsonl_dir = config.jsonl_dir(family);
    jsonl::ensure_dir(&jsonl_dir)?;

    let ctx = emitter_context(config, coordinator, family, args.full, true)?;
    let (stats, all_ok) = jsonl::run_worker_pool(&shards, parallel_num, coordinator, |shard| {
        let index = shard_index_of(shard);
        if family == "bioproject" {
            jsonl::bioproject::process_shard(&ctx, shard, &jsonl_dir, index)
        }
        else {
            jsonl::biosample::process_shard(&ctx, shard, &jsonl_dir, index)
        }
    })?;

    coordinator.info(&format!("{family}: emitted {} skipped {}", stats.emitted, stats.skipped))?;
    if !all_ok {
        return Err(Error::Critical(format!("{family} jsonl generation had shard failures")));
    }
    if !args.full {
        let mut last_run = last_run::LastRun::load(&config.last_run_path())?;
        last_run.record_success(family, coordinator.start);
        last_run.save(&config.last_run_path())?;
    }
    Ok(())
}

fn generate_sra(config: &Config, coordinator: &RunCoordinator, args: &GenerateArgs) -> Result<(), Error> {
    let store_path = sra_accessions_store_path(config);
    let store = AccessionsStore::open(&store_path)?;
    let ctx = emitter_context(config, coordinator, "sra", args.full, false)?;

    let last_run = last_run::LastRun::load(&config.last_run_path())?;
    let cutoff = if args.full { None } else { last_run.cutoff("sra", config.margin_days) };
    let submissions = match cutoff {
        Some(cutoff) => store.updated_since(cutoff)?,
        None => store.all_submissions()?,
    };

    let jsonl_dir = config.jsonl_dir("sra");
    jsonl::ensure_dir(&jsonl_dir)?;

    let ncbi_tar = config.accessions_store_dir().join("NCBI_SRA.tar");
    let ncbi_index_path = tar_index_path(&ncbi_tar);
    let tar_index = if ncbi_index_path.exists() { Some(jsonl::sra::TarIndex::open(&ncbi_index_path)?) } else { None };

    let batches: Vec<&[String]> = submissions.chunks(jsonl::sra::BATCH_SIZE).collect();
    let parallel_num = args.parallel_num.unwrap_or(config.parallel_num);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallel_num.max(1))
        .build()
        .map_err(|e| Error::Critical(format!("could not build worker pool: {e}")))?;

    let results: Vec<Result<jsonl::ShardStats, Error>> = pool.install(|| {
        use rayon::prelude::*;
        batches
            .par_iter()
            .enumerate()
            .map(|(shard_index, batch)| {
                jsonl::sra::process_submission_batch(
                    &ctx,
                    &store,
                    tar_index.as_ref(),
                    if tar_index.is_some() { Some(ncbi_tar.as_path()) } else { None },
                    batch,
                    &jsonl_dir,
                    shard_index,
                )
            })
            .collect()
    });

    let mut total = jsonl::ShardStats::default();
    let mut all_ok = true;
    for result in results {
        match result {
            Ok(stats) => {
                total.emitted += stats.emitted;
                total.skipped += stats.skipped;
            }
            Err(err) => {
                all_ok = false;
                coordinator.error("sra batch failed", &err.to_string(), LogFields::default())?;
            }
        }
    }

    coordinator.info(&format!("sra: emitted {} skipped {}", total.emitted, total.skipped))?;
    if !all_ok {
        return Err(Error::Critical("sra jsonl generation had batch failures".to_string()));
    }
    if !args.full {
        let mut last_run = last_run::LastRun::load(&config.last_run_path())?;
        last_run.record_success("sra", coordinator.start);
        last_run.save(&config.last_run_path())?;
    }
    Ok(())
}

fn generate_jga(config: &Config, coordinator: &RunCoordinator, args: &GenerateArgs) -> Result<(), Error> {
    let ctx = emitter_context(config, coordinator, "jga", true, false)?;
    let jsonl_dir = config.jsonl_dir("jga");
    jsonl::ensure_dir(&jsonl_dir)?;
    let parallel_num = args.parallel_num.unwrap_or(config.parallel_num);

    let types: [(&str, &str, AccessionType); 4] = [
        ("study", "Study", AccessionType::JgaStudy),
        ("dataset", "Dataset", AccessionType::JgaDataset),
        ("dac", "Dac", AccessionType::JgaDac),
        ("policy", "Policy", AccessionType::JgaPolicy),
    ];

    let mut total = jsonl::ShardStats::default();
    let mut all_ok = true;
    for (dir_name, record_tag, kind) in types {
        let shard_dir = jga_shard_dir(config, dir_name);
        if !shard_dir.exists() {
            continue;
        }
        let shards = splitter::list_shards(&shard_dir)?;
        let dates = jsonl::jga::load_dates(&shard_dir.join("date.csv"))?;
        let (stats, ok) = jsonl::run_worker_pool(&shards, parallel_num, coordinator, |shard| {
            let index = shard_index_of(shard);
            jsonl::jga::process_shard(&ctx, shard, &jsonl_dir, record_tag, kind, &dates, index)
        })?;
        total.emitted += stats.emitted;
        total.skipped += stats.skipped;
        all_ok &= ok;
    }

    coordinator.info(&format!("jga: emitted {} skipped {}", total.emitted, total.skipped))?;
    if !all_ok {
        return Err(Error::Critical("jga jsonl generation had shard failures".to_string()));
    }
    let mut last_run = last_run::LastRun::load(&config.last_run_path())?;
    last_run.record_success("jga", coordinator.start);
    last_run.save(&config.last_run_path())?;
    Ok(())
}

fn regenerate(
    config: &Config,
    coordinator: &RunCoordinator,
    family: &str,
    accessions: &[String],
    accession_file: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<(), Error> {
    let mut all_accessions = accessions.to_vec();
    if let Some(path) = accession_file {
        all_accessions.extend(jsonl::regenerate::read_accession_file(path)?);
    }
    if all_accessions.is_empty() {
        return Err(Error::Critical("regenerate_jsonl requires --accessions or --accession-file".to_string()));
    }

    let needs_store = family == "sra";
    let ctx = emitter_context(config, coordinator, family, true, family != "sra")?;
    let store = if needs_store { Some(AccessionsStore::open(&sra_accessions_store_path(config))?) } else { None };

    let output_dir = output_dir.map(Path::to_path_buf).unwrap_or_else(|| config.regenerate_dir());
    let stats = jsonl::regenerate::regenerate(&ctx, store.as_ref(), &all_accessions, &output_dir)?;
    coordinator.info(&format!("regenerate: emitted {} skipped {}", stats.emitted, stats.skipped))
}

fn es_ingest(config: &Config, coordinator: &RunCoordinator, family: &str, index: &str) -> Result<(), Error> {
    let sink = HttpDocumentSink::new(config.es_url.clone());
    let jsonl_dir = config.jsonl_dir(family);
    let stats = sink::ingest_shards(&sink, &jsonl_dir, family, index, Some(coordinator))?;
    coordinator.info(&format!("es_ingest[{family}]: indexed {}", stats.indexed))
}

fn es_delete(config: &Config, coordinator: &RunCoordinator, family: &str, index: &str) -> Result<(), Error> {
    let sink = HttpDocumentSink::new(config.es_url.clone());
    let blacklist = Blacklist::load(&config.const_dir)?;
    let accessions = blacklist.accessions_for(family);
    let stats = sink::delete_blacklisted(&sink, index, accessions)?;
    coordinator.info(&format!("es_delete[{family}]: deleted {} not_found {}", stats.deleted, stats.not_found))
}
