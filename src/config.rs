use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;

/// Environment/CLI-bound configuration shared by every step.
///
/// Every field mirrors an environment variable named in the system's external
/// interface and is also exposed as an overridable global flag so that individual
/// steps can be invoked in isolation (tests, `regenerate_jsonl`, manual reruns).
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Root directory for pipeline outputs: logs, tmp_xml, jsonl, regenerate, last_run.json
    #[arg(long, env = "RESULT_DIR")]
    pub result_dir: PathBuf,

    /// Root directory for blacklists, preserved edges, and the const stores
    #[arg(long, env = "CONST_DIR")]
    pub const_dir: PathBuf,

    /// Connection string for the external relational DB backing the date cache
    #[arg(long, env = "POSTGRES_URL")]
    pub postgres_url: String,

    /// Base URL of the document-sink (search backend) HTTP endpoint
    #[arg(long, env = "ES_URL")]
    pub es_url: String,

    /// Overrides "today" for reproducible runs, format YYYYMMDD
    #[arg(long, env = "DATE")]
    pub date_override: Option<String>,

    /// Root directory the DBLink TSV dump is written under
    #[arg(long, env = "DBLINK_PATH")]
    pub dblink_path: PathBuf,

    /// Records per shard for the XML/TSV splitters
    #[arg(long, env = "SHARD_SIZE", default_value_t = 30_000)]
    pub shard_size: usize,

    /// Days subtracted from last_run[family] to compute the incremental cutoff
    #[arg(long, env = "MARGIN_DAYS", default_value_t = 30)]
    pub margin_days: i64,

    /// Size of the bounded worker pool used by the JSONL emitters and DBLink extractors
    #[arg(long, env = "PARALLEL_NUM", default_value_t = 4)]
    pub parallel_num: usize,
}

impl Config {
    /// Resolves the effective "today" for this run, honoring the `DATE` override.
    pub fn today(&self) -> NaiveDate {
        match &self.date_override {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y%m%d").unwrap_or_else(|_| chrono::Utc::now().date_naive()),
            None => chrono::Utc::now().date_naive(),
        }
    }

    pub fn today_stamp(&self) -> String {
        self.today().format("%Y%m%d").to_string()
    }

    pub fn accessions_store_dir(&self) -> PathBuf {
        self.const_dir.join("sra")
    }

    pub fn dblink_store_path(&self) -> PathBuf {
        self.const_dir.join("dblink").join("dblink.store")
    }

    pub fn date_cache_store_path(&self) -> PathBuf {
        self.const_dir.join("bp_bs_date.store")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.result_dir.join("logs")
    }

    pub fn last_run_path(&self) -> PathBuf {
        self.result_dir.join("last_run.json")
    }

    pub fn jsonl_dir(&self, family: &str) -> PathBuf {
        self.result_dir.join(family).join("jsonl").join(self.today_stamp())
    }

    pub fn tmp_xml_dir(&self, family: &str) -> PathBuf {
        self.result_dir.join("tmp_xml").join(family)
    }

    pub fn regenerate_dir(&self) -> PathBuf {
        self.result_dir.join("regenerate").join(self.today_stamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_honors_date_override() {
        let cfg = Config {
            result_dir: PathBuf::from("/tmp/result"),
            const_dir: PathBuf::from("/tmp/const"),
            postgres_url: String::new(),
            es_url: String::new(),
            date_override: Some("20260115".to_string()),
            dblink_path: PathBuf::from("/tmp/dblink"),
            shard_size: 30_000,
            margin_days: 30,
            parallel_num: 4,
        };
        assert_eq!(cfg.today_stamp(), "20260115");
    }
}
