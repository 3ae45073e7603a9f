//! Bounded retry around one file's conversion

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::ConversionRequest;
use crate::error::ConvertError;
use crate::parallel::control::{BatchControl, GateDecision};
use crate::parallel::progress::{FileOutcome, OutcomeStatus};
use crate::processing::{ConversionEngine, ConvertedFile};

/// How often and how patiently a file is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Runs one file through the engine, retrying retryable failures and
/// honouring pause and stop between attempts.
#[derive(Clone)]
pub struct RetryingWorker {
    engine: ConversionEngine,
    policy: RetryPolicy,
    control: BatchControl,
}

impl RetryingWorker {
    pub fn new(engine: ConversionEngine, policy: RetryPolicy, control: BatchControl) -> Self {
        Self {
            engine,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            control,
        }
    }

    /// Convert `request`, which is file `index` of `total`.
    ///
    /// A panic inside the conversion is re-raised on this task.
    pub async fn run(&self, index: usize, total: usize, request: ConversionRequest) -> FileOutcome {
        let label = Label::new(index, total, &request.source_path);
        let destination = self.engine.destination(&request);
        let mut log_lines = Vec::new();
        let mut attempts = 0;

        let outcome = |status, attempts, log_lines, final_error| FileOutcome {
            source_path: request.source_path.clone(),
            resolved_output_path: destination.clone(),
            status,
            attempts_used: attempts,
            log_lines,
            final_error,
            bytes_written: None,
        };

        loop {
            if self.control.gate().await == GateDecision::Stop {
                log_lines.push(label.stopped());
                return outcome(OutcomeStatus::Stopped, attempts, log_lines, None);
            }

            attempts += 1;
            debug!("{} attempt {}/{}", label.name, attempts, self.policy.max_attempts);

            match self.attempt(&request).await {
                Ok(converted) => {
                    debug!(
                        "{} wrote {} bytes in {:.2?}",
                        label.name, converted.bytes_written, converted.processing_time
                    );
                    log_lines.push(label.converted(&converted, request.options.target_format));
                    return FileOutcome {
                        bytes_written: Some(converted.bytes_written),
                        ..outcome(OutcomeStatus::Success, attempts, log_lines, None)
                    };
                }
                Err(e) if e.is_retryable() && attempts < self.policy.max_attempts => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        label.name, attempts, self.policy.max_attempts, e
                    );
                    log_lines.push(label.retrying(attempts, self.policy.max_attempts, &e));

                    tokio::select! {
                        () = tokio::time::sleep(self.policy.delay) => {}
                        () = self.control.stopped() => {
                            log_lines.push(label.stopped());
                            return outcome(OutcomeStatus::Stopped, attempts, log_lines, None);
                        }
                    }
                }
                Err(e) => {
                    error!("{} failed after {} attempt(s): {}", label.name, attempts, e);
                    log_lines.push(label.failed(attempts, &e));
                    return outcome(OutcomeStatus::Failed, attempts, log_lines, Some(e));
                }
            }
        }
    }

    async fn attempt(&self, request: &ConversionRequest) -> Result<ConvertedFile, ConvertError> {
        let engine = self.engine.clone();
        let request = request.clone();

        match tokio::task::spawn_blocking(move || engine.convert(&request)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ConvertError::system(format!("Task join error: {e}"))),
        }
    }
}

struct Label {
    prefix: String,
    name: String,
}

impl Label {
    fn new(index: usize, total: usize, source: &Path) -> Self {
        let name = source
            .file_name()
            .map_or_else(|| source.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            prefix: format!("[{}/{}]", index + 1, total),
            name,
        }
    }

    fn converted(&self, converted: &ConvertedFile, format: crate::config::TargetFormat) -> String {
        let (ow, oh) = converted.original_size;
        let (nw, nh) = converted.output_size;
        if (ow, oh) == (nw, nh) {
            format!("{} {} converted to {}", self.prefix, self.name, format)
        } else {
            format!(
                "{} {} converted to {} ({}x{} -> {}x{})",
                self.prefix, self.name, format, ow, oh, nw, nh
            )
        }
    }

    fn retrying(&self, attempt: u32, max: u32, e: &ConvertError) -> String {
        format!(
            "{} {} attempt {}/{} failed: {}, retrying",
            self.prefix,
            self.name,
            attempt,
            max,
            e.user_message()
        )
    }

    fn failed(&self, attempts: u32, e: &ConvertError) -> String {
        format!(
            "{} {} failed after {} attempt(s): {}",
            self.prefix,
            self.name,
            attempts,
            e.user_message()
        )
    }

    fn stopped(&self) -> String {
        format!("{} {} stopped", self.prefix, self.name)
    }
}
