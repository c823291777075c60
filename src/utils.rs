//! Progress/operator UX helpers, reused as-is from the teacher's `utils.rs`
//! (`indicatif` bar/spinner templates) and pressed into service for shard
//! splitting, DBLink extraction, and JSONL emission progress.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub static PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {human_pos:>7}/{human_len:7} {msg}";
pub static SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:2.cyan/blue} {msg}";
pub static SPINNER_TOTALS_TEMPLATE: &str = "{spinner:2.cyan/blue} {msg}: {human_pos}";

pub fn new_spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(SPINNER_TEMPLATE).expect("invalid spinner template");
    ProgressBar::new_spinner().with_message(message.to_string()).with_style(style)
}

pub fn new_progress_bar(total: usize, message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE).expect("invalid progress bar template");
    ProgressBar::new(total as u64).with_message(message.to_string()).with_style(style)
}

pub fn new_spinner_totals(message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(SPINNER_TOTALS_TEMPLATE).expect("invalid spinner template");
    ProgressBar::new_spinner().with_message(message.to_string()).with_style(style)
}

/// Aggregate progress across a fixed-size worker pool: one bar per shard plus
/// a running total, matching the teacher's `FrameImportBars`/`UpdateBars`
/// pattern of a `MultiProgress` holding several steady-ticking bars.
#[derive(Clone)]
pub struct WorkerBars {
    _bars: MultiProgress,
    pub shards: ProgressBar,
    pub records: ProgressBar,
    pub skipped: ProgressBar,
}

impl WorkerBars {
    pub fn new(total_shards: usize, message: &str) -> WorkerBars {
        let bars = MultiProgress::new();
        let shards = new_progress_bar(total_shards, message);
        let records = new_spinner_totals("Records emitted");
        let skipped = new_spinner_totals("Records skipped");
        bars.add(shards.clone());
        bars.add(records.clone());
        bars.add(skipped.clone());

        shards.enable_steady_tick(Duration::from_millis(200));
        records.enable_steady_tick(Duration::from_millis(200));
        skipped.enable_steady_tick(Duration::from_millis(200));

        WorkerBars { _bars: bars, shards, records, skipped }
    }

    pub fn finish(&self) {
        self.shards.finish();
        self.records.finish();
        self.skipped.finish();
    }
}
