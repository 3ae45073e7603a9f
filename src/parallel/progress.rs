//! Outcomes, progress snapshots and the reporter interface

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::ConvertError;
use crate::parallel::control::RunState;

/// Terminal status of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Stopped,
}

/// Result of one file's attempt sequence
#[derive(Debug)]
pub struct FileOutcome {
    pub source_path: PathBuf,
    pub resolved_output_path: PathBuf,
    pub status: OutcomeStatus,
    pub attempts_used: u32,
    /// Human-readable lines, in the order they happened
    pub log_lines: Vec<String>,
    /// Error of the last attempt, set only when Failed
    pub final_error: Option<ConvertError>,
    /// Size of the written output, set only on Success
    pub bytes_written: Option<u64>,
}

impl FileOutcome {
    /// Error kind and message for anything but a success
    pub fn error_detail(&self) -> Option<(&'static str, String)> {
        match (&self.final_error, self.status) {
            (Some(e), _) => Some((e.kind(), e.user_message())),
            (None, OutcomeStatus::Stopped) => {
                let e = ConvertError::stopped(&self.source_path);
                Some((e.kind(), e.user_message()))
            }
            (None, _) => None,
        }
    }
}

/// Counters at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: usize,
    pub run_state: RunState,
}

impl ProgressSnapshot {
    /// Files with a terminal outcome
    pub fn resolved(&self) -> usize {
        self.completed + self.failed + self.stopped
    }

    pub fn status_text(&self) -> String {
        format!(
            "failed: {}  completed/total: {}/{}",
            self.failed, self.completed, self.total
        )
    }
}

/// Final counts of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.completed == self.total
    }

    /// The `succeeded/total` line
    pub fn summary_line(&self) -> String {
        format!("{}/{}", self.completed, self.total)
    }
}

/// Summary plus every outcome, in input order
#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub outcomes: Vec<FileOutcome>,
}

/// Receives batch events. Calls arrive from the batch's coordination
/// thread, outcomes strictly in input order.
pub trait ProgressReporter: Send + Sync {
    fn on_started(&self, _total: usize) {}

    /// One file resolved. The default forwards its log lines.
    fn on_outcome(&self, _index: usize, outcome: &FileOutcome) {
        for line in &outcome.log_lines {
            self.on_log_line(line);
        }
    }

    fn on_log_line(&self, line: &str);

    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    fn on_finished(&self, _summary: &BatchSummary) {}
}

/// Sends log lines to `tracing` only
#[derive(Debug, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn on_log_line(&self, line: &str) {
        info!("{}", line);
    }

    fn on_finished(&self, summary: &BatchSummary) {
        info!(
            "Batch finished: {} succeeded, {} failed, {} stopped of {} in {:.2}s",
            summary.completed,
            summary.failed,
            summary.stopped,
            summary.total,
            summary.elapsed.as_secs_f64()
        );
    }
}

/// Progress bar on stderr, log lines on stdout
pub struct ConsoleReporter {
    bar: ProgressBar,
    show_lines: bool,
}

impl ConsoleReporter {
    pub fn new(show_bar: bool, show_lines: bool) -> Self {
        let bar = if show_bar {
            let bar = ProgressBar::new(0);
            if let Ok(bar_style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(bar_style.progress_chars("#>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        Self { bar, show_lines }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn on_started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_log_line(&self, line: &str) {
        if !self.show_lines {
            return;
        }
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    fn on_outcome(&self, _index: usize, outcome: &FileOutcome) {
        let last = outcome.log_lines.len().saturating_sub(1);
        for (i, line) in outcome.log_lines.iter().enumerate() {
            if outcome.status == OutcomeStatus::Failed && i == last {
                self.on_log_line(&style(line).red().to_string());
            } else {
                self.on_log_line(line);
            }
        }
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.resolved() as u64);
        self.bar.set_message(snapshot.status_text());
    }

    fn on_finished(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

/// One JSON object per outcome on stdout, then one for the summary
pub struct JsonLinesReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, value: &serde_json::Value) {
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{value}").and_then(|()| out.flush()) {
            warn!("Failed to write JSON progress line: {}", e);
        }
    }
}

impl<W: Write + Send> ProgressReporter for JsonLinesReporter<W> {
    fn on_outcome(&self, index: usize, outcome: &FileOutcome) {
        self.emit(&json!({
            "index": index,
            "source": outcome.source_path,
            "output": outcome.resolved_output_path,
            "status": outcome.status,
            "attempts": outcome.attempts_used,
            "bytes": outcome.bytes_written,
            "log": outcome.log_lines,
            "error": outcome.error_detail().map(|(kind, message)| json!({
                "kind": kind,
                "message": message,
                "path": outcome.final_error.as_ref().and_then(ConvertError::file_path),
            })),
        }));
    }

    fn on_log_line(&self, _line: &str) {}

    fn on_finished(&self, summary: &BatchSummary) {
        self.emit(&json!({ "summary": summary }));
    }
}
