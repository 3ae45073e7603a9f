//! Batch scheduling: a bounded worker pool with in-order reporting

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{ConversionOptions, ConversionRequest};
use crate::error::{ConvertError, Result};
use crate::parallel::control::BatchControl;
use crate::parallel::progress::{
    BatchReport, BatchSummary, FileOutcome, LogReporter, OutcomeStatus, ProgressReporter,
    ProgressSnapshot,
};
use crate::parallel::worker::{RetryPolicy, RetryingWorker};
use crate::processing::ConversionEngine;

/// Holds out-of-order results until every earlier index has arrived
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<usize, T>,
    next: usize,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next: 0,
        }
    }

    /// Insert `item` and return everything that is now releasable, in order
    pub fn push(&mut self, index: usize, item: T) -> Vec<(usize, T)> {
        self.pending.insert(index, item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push((self.next, item));
            self.next += 1;
        }
        ready
    }

    /// Index of the next item to be released
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters written only by the batch's aggregator
#[derive(Debug)]
struct Counters {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicUsize,
}

impl Counters {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    fn record(&self, status: OutcomeStatus) {
        let counter = match status {
            OutcomeStatus::Success => &self.completed,
            OutcomeStatus::Failed => &self.failed,
            OutcomeStatus::Stopped => &self.stopped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self, control: &BatchControl) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            stopped: self.stopped.load(Ordering::SeqCst),
            run_state: control.state(),
        }
    }
}

/// Starts batches of conversions
pub struct BatchScheduler {
    engine: ConversionEngine,
    workers: usize,
    retry_policy: RetryPolicy,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchScheduler {
    pub fn new(engine: ConversionEngine) -> Self {
        Self {
            engine,
            workers: num_cpus::get(),
            retry_policy: RetryPolicy::default(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Pool size. Zero is treated as one.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Start converting `files` in the background and return immediately.
    ///
    /// Fails without starting anything when `files` is empty or `options`
    /// are invalid.
    pub fn start(&self, files: Vec<PathBuf>, options: ConversionOptions) -> Result<BatchHandle> {
        if files.is_empty() {
            return Err(ConvertError::InputsEmpty);
        }
        options.validate()?;

        let total = files.len();
        let workers = self.workers.min(total);
        let control = BatchControl::new();
        let counters = Arc::new(Counters::new(total));

        let batch = Batch {
            engine: self.engine.clone(),
            files: files.into(),
            options: Arc::new(options),
            workers,
            retry_policy: self.retry_policy,
            reporter: self.reporter.clone(),
            control: control.clone(),
            counters: counters.clone(),
        };

        // The runtime lives and dies on the batch thread, never on the caller's
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
        let (report_tx, report_rx) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name("fastconvert-batch".to_string())
            .spawn(move || {
                let runtime = match build_runtime(workers) {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let report = runtime.block_on(batch.run());
                let _ = report_tx.send(report);
            })
            .map_err(|e| ConvertError::system(format!("Failed to start batch thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => return Err(rejoin(thread)),
        }

        info!("Started batch of {} files with {} workers", total, workers);

        Ok(BatchHandle {
            control,
            counters,
            report_rx,
            thread,
        })
    }
}

fn build_runtime(workers: usize) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.min(num_cpus::get()).max(1))
        .max_blocking_threads(workers)
        .thread_name("fastconvert-worker")
        .enable_time()
        .build()
        .map_err(|e| ConvertError::system(format!("Failed to start worker pool: {e}")))
}

/// Everything one running batch needs
struct Batch {
    engine: ConversionEngine,
    files: Arc<[PathBuf]>,
    options: Arc<ConversionOptions>,
    workers: usize,
    retry_policy: RetryPolicy,
    reporter: Arc<dyn ProgressReporter>,
    control: BatchControl,
    counters: Arc<Counters>,
}

impl Batch {
    async fn run(self) -> BatchReport {
        let start_time = Instant::now();
        let total = self.files.len();
        self.reporter.on_started(total);

        let cursor = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<(usize, FileOutcome)>(self.workers);
        let worker = RetryingWorker::new(self.engine.clone(), self.retry_policy, self.control.clone());

        let handles: Vec<_> = (0..self.workers)
            .map(|worker_id| {
                let worker = worker.clone();
                let files = self.files.clone();
                let options = self.options.clone();
                let cursor = cursor.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    loop {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(path) = files.get(index) else {
                            break;
                        };
                        debug!("Worker {} picked file {}", worker_id, index);

                        let request = ConversionRequest::new(path.clone(), options.clone());
                        let outcome = worker.run(index, total, request).await;
                        if tx.send((index, outcome)).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(tx);

        let mut reorder = ReorderBuffer::new();
        let mut outcomes = Vec::with_capacity(total);

        while let Some((index, outcome)) = rx.recv().await {
            // Pause freezes the counters too; a stop lets everything drain.
            self.control.gate().await;

            self.counters.record(outcome.status);
            self.reporter
                .on_progress(&self.counters.snapshot(&self.control));

            for (index, outcome) in reorder.push(index, outcome) {
                self.reporter.on_outcome(index, &outcome);
                outcomes.push(outcome);
            }
        }

        if !reorder.is_empty() {
            warn!(
                "Batch ended with outcomes held back behind missing index {}",
                reorder.next_index()
            );
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        self.control.finish();

        let summary = BatchSummary {
            total,
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            stopped: self.counters.stopped.load(Ordering::SeqCst),
            elapsed: start_time.elapsed(),
        };
        info!(
            "Batch done: {}/{} succeeded, {} failed, {} stopped",
            summary.completed, summary.total, summary.failed, summary.stopped
        );
        self.reporter.on_finished(&summary);

        BatchReport { summary, outcomes }
    }
}

/// Handle to a running batch
pub struct BatchHandle {
    control: BatchControl,
    counters: Arc<Counters>,
    report_rx: oneshot::Receiver<BatchReport>,
    thread: JoinHandle<()>,
}

impl BatchHandle {
    /// Pause, resume and stop this batch
    pub fn control(&self) -> BatchControl {
        self.control.clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.counters.snapshot(&self.control)
    }

    /// Block until the batch is done. Must not be called from async code.
    ///
    /// A panic inside the batch is re-raised here.
    pub fn wait(self) -> Result<BatchReport> {
        match self.report_rx.blocking_recv() {
            Ok(report) => Ok(report),
            Err(_) => Err(rejoin(self.thread)),
        }
    }

    /// Async counterpart of [`BatchHandle::wait`]
    pub async fn finished(self) -> Result<BatchReport> {
        match self.report_rx.await {
            Ok(report) => Ok(report),
            Err(_) => {
                let thread = self.thread;
                let error = tokio::task::spawn_blocking(move || rejoin(thread))
                    .await
                    .unwrap_or_else(|e| ConvertError::system(format!("Task join error: {e}")));
                Err(error)
            }
        }
    }
}

/// The batch thread ended without a report: surface its panic
fn rejoin(thread: JoinHandle<()>) -> ConvertError {
    match thread.join() {
        Err(payload) => std::panic::resume_unwind(payload),
        Ok(()) => ConvertError::system("Batch ended without a report"),
    }
}
