//! Bounded, retrying file download pool
//!
//! Each task fetches one URL into one file, retrying up to the configured
//! attempt count with a fixed pause between failed attempts. A task that
//! exhausts its attempts reports one consecutive error; the pool sums
//! these per batch and stops scheduling batches once the sum exceeds the
//! configured maximum.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use biblink_core::{BibLinkError, DownloadSettings, Result};

// ============================================================================
// Fetcher
// ============================================================================

/// Fetches one URL into one file
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into `destination`, returning the number of bytes written
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Fetcher over HTTP(S)
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &DownloadSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.read_timeout_secs))
            .build()
            .map_err(|e| BibLinkError::Connection(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BibLinkError::Connection(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BibLinkError::Connection(format!(
                "Request to {url} returned {}",
                response.status()
            )));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BibLinkError::Other(e.into()))?;
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| BibLinkError::Other(e.into()))?;

        match write_body(response, &mut file, url).await {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);
                if let Err(remove) = tokio::fs::remove_file(destination).await {
                    warn!(error = %remove, path = %destination.display(), "Failed to remove partial download");
                }
                Err(e)
            }
        }
    }
}

async fn write_body(
    response: reqwest::Response,
    file: &mut tokio::fs::File,
    url: &str,
) -> Result<u64> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| BibLinkError::Connection(format!("Reading {url} failed: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| BibLinkError::Other(e.into()))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| BibLinkError::Other(e.into()))?;
    Ok(written)
}

// ============================================================================
// Tasks and Reports
// ============================================================================

/// One URL and the file it is saved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }
}

/// Result of one task after all of its attempts
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: DownloadTask,
    pub attempts: u32,
    /// 0 when an attempt succeeded, 1 when every attempt failed
    pub consecutive_errors: usize,
    pub bytes: u64,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.consecutive_errors == 0
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Sum of the tasks' consecutive-error counts
    pub fn consecutive_errors(&self) -> usize {
        self.outcomes.iter().map(|o| o.consecutive_errors).sum()
    }
}

/// Outcome of a multi-batch run
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub reports: Vec<DownloadReport>,
    /// Set when later batches were skipped because of errors
    pub halted: bool,
}

impl DownloadSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().map(DownloadReport::succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().map(DownloadReport::failed).sum()
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Runs download tasks with bounded concurrency
pub struct DownloadPool {
    fetcher: Arc<dyn Fetcher>,
    settings: DownloadSettings,
    semaphore: Arc<Semaphore>,
}

impl DownloadPool {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: DownloadSettings) -> Self {
        let concurrency = settings.concurrency.max(1);
        debug!(
            concurrency,
            attempts = settings.attempt_count,
            "Creating download pool"
        );

        Self {
            fetcher,
            settings,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Run one batch to completion
    pub async fn run(&self, tasks: Vec<DownloadTask>) -> DownloadReport {
        let (tx, mut rx) = mpsc::channel(tasks.len().max(1));
        let mut set = JoinSet::new();

        for task in tasks {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                warn!("Download pool closed, skipping remaining tasks");
                break;
            };

            let fetcher = Arc::clone(&self.fetcher);
            let tx = tx.clone();
            let attempts = self.settings.attempt_count.max(1);
            let delay = self.settings.delay_between_attempts();

            set.spawn(async move {
                let _permit = permit;
                let outcome = download_with_retry(fetcher.as_ref(), task, attempts, delay).await;
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Download task panicked");
            }
        }

        let mut report = DownloadReport::default();
        while let Some(outcome) = rx.recv().await {
            report.outcomes.push(outcome);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Download batch complete"
        );
        report
    }

    /// Run batches in order, halting when a batch's consecutive errors exceed the maximum
    pub async fn run_batches(&self, batches: Vec<Vec<DownloadTask>>) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        let total = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let report = self.run(batch).await;
            let errors = report.consecutive_errors();
            summary.reports.push(report);

            if errors > self.settings.max_allowed_consecutive_errors {
                warn!(
                    batch = index + 1,
                    errors,
                    max = self.settings.max_allowed_consecutive_errors,
                    skipped = total - index - 1,
                    "Too many download errors, halting"
                );
                summary.halted = index + 1 < total;
                break;
            }
        }

        summary
    }
}

async fn download_with_retry(
    fetcher: &dyn Fetcher,
    task: DownloadTask,
    attempts: u32,
    delay: Duration,
) -> TaskOutcome {
    let mut last_error = None;

    for attempt in 1..=attempts {
        match fetcher.fetch(&task.url, &task.destination).await {
            Ok(bytes) => {
                debug!(url = %task.url, attempt, bytes, "Downloaded");
                return TaskOutcome {
                    task,
                    attempts: attempt,
                    consecutive_errors: 0,
                    bytes,
                    error: None,
                };
            }
            Err(e) => {
                debug!(url = %task.url, attempt, error = %e, "Download attempt failed");
                last_error = Some(e.to_string());
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    warn!(url = %task.url, attempts, "Download failed after all attempts");
    TaskOutcome {
        task,
        attempts,
        consecutive_errors: 1,
        bytes: 0,
        error: last_error,
    }
}
