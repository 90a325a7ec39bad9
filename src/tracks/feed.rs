use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::engine::TrackEngine;
use super::error::TrackError;
use super::retry::RetryConfig;
use super::types::{HistoryPage, SourceKind};

/// Where the poll loop gets history pages from.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<HistoryPage, TrackError>;

    fn describe(&self) -> String;
}

/// Re-reads a history page JSON file on every poll.
pub struct FileHistorySource {
    path: PathBuf,
}

impl FileHistorySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl HistorySource for FileHistorySource {
    async fn fetch(&self) -> Result<HistoryPage, TrackError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| TrackError::transport(format!("{}: {}", self.path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// Every page is the authoritative history and replaces the previous
    /// page. Live samples are kept.
    #[default]
    Refresh,
    /// Pages are merged into the history already held.
    Accumulate,
}

impl PollMode {
    pub fn source_kind(self) -> SourceKind {
        match self {
            PollMode::Refresh => SourceKind::Reload,
            PollMode::Accumulate => SourceKind::History,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub mode: PollMode,
    pub retry: RetryConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            mode: PollMode::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Idle,
    Connected,
    /// The last fetch failed; the store still serves its last good contents.
    Stale,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FeedStatus {
    pub state: FeedState,
    pub epoch: u64,
    pub revision: u64,
    pub source: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl FeedStatus {
    fn idle() -> Self {
        Self {
            state: FeedState::Idle,
            epoch: 0,
            revision: 0,
            source: None,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            next_retry_at: None,
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Lifecycle of one faction feed: the engine plus an optional history
/// polling task.
pub struct FeedSession {
    engine: Arc<TrackEngine>,
    poll: PollConfig,
    shared: Arc<StdMutex<FeedStatus>>,
    worker: Option<WorkerHandle>,
}

impl FeedSession {
    pub fn new(engine: Arc<TrackEngine>, poll: PollConfig) -> Self {
        Self {
            engine,
            poll,
            shared: Arc::new(StdMutex::new(FeedStatus::idle())),
            worker: None,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> Arc<TrackEngine> {
        self.engine.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.join.is_finished())
    }

    pub fn status(&self) -> FeedStatus {
        let mut status = lock(&self.shared).clone();
        status.epoch = self.engine.epoch();
        status.revision = self.engine.revision();
        status
    }

    /// Starts polling `source` in the background. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self, source: Arc<dyn HistorySource>) -> Result<(), TrackError> {
        if self.is_running() {
            return Err(TrackError::AlreadyRunning);
        }

        let epoch = self.engine.epoch();
        let (stop_tx, stop_rx) = oneshot::channel();

        {
            let mut status = lock(&self.shared);
            *status = FeedStatus::idle();
            status.state = FeedState::Connected;
            status.source = Some(source.describe());
        }

        log::info!(
            "{} feed: polling {} every {:?} (epoch {})",
            self.engine.faction(),
            source.describe(),
            self.poll.interval,
            epoch
        );

        let join = tokio::spawn(run_poll_loop(
            self.engine.clone(),
            self.shared.clone(),
            source,
            self.poll.clone(),
            epoch,
            stop_rx,
        ));
        self.worker = Some(WorkerHandle { stop_tx, join });

        Ok(())
    }

    /// Stops polling and discards the store. Results of fetches still in
    /// flight are dropped because the epoch moves on before the task is
    /// signalled.
    pub async fn stop(&mut self) {
        let epoch = self.engine.reset();
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.await;
        }
        *lock(&self.shared) = FeedStatus::idle();
        log::info!("{} feed: stopped, now at epoch {}", self.engine.faction(), epoch);
    }
}

async fn run_poll_loop(
    engine: Arc<TrackEngine>,
    shared: Arc<StdMutex<FeedStatus>>,
    source: Arc<dyn HistorySource>,
    poll: PollConfig,
    epoch: u64,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let faction = engine.faction();
    let mut failures: u32 = 0;

    loop {
        let fetched = tokio::select! {
            result = tokio::time::timeout(poll.fetch_timeout, source.fetch()) => result,
            _ = &mut stop_rx => return,
        };

        let outcome = match fetched {
            Ok(Ok(page)) => engine.ingest_for_epoch(epoch, &page.data, poll.mode.source_kind()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TrackError::transport(format!(
                "fetch timed out after {:?}",
                poll.fetch_timeout
            ))),
        };

        let delay = match outcome {
            Ok(report) => {
                failures = 0;
                let mut status = lock(&shared);
                status.state = FeedState::Connected;
                status.last_success = Some(Utc::now());
                status.last_error = None;
                status.consecutive_failures = 0;
                status.next_retry_at = None;
                log::debug!(
                    "{} feed: history poll accepted {} dropped {}",
                    faction,
                    report.accepted,
                    report.dropped
                );
                poll.interval
            }
            Err(TrackError::StaleResult { got, current }) => {
                log::debug!(
                    "{} feed: discarding result of epoch {} (now {})",
                    faction,
                    got,
                    current
                );
                let mut status = lock(&shared);
                status.state = FeedState::Idle;
                status.next_retry_at = None;
                return;
            }
            Err(e) => {
                let delay = poll.retry.delay_for_attempt(failures);
                failures = failures.saturating_add(1);
                log::warn!(
                    "{} feed: history fetch failed ({}), retrying in {:?}",
                    faction,
                    e,
                    delay
                );
                let mut status = lock(&shared);
                status.state = FeedState::Stale;
                status.last_error = Some(e.to_string());
                status.consecutive_failures = failures;
                status.next_retry_at = chrono::Duration::from_std(delay)
                    .ok()
                    .map(|d| Utc::now() + d);
                delay
            }
        };

        tokio::select! {
            _ = sleep(delay) => {}
            _ = &mut stop_rx => return,
        }
    }
}

fn lock(shared: &StdMutex<FeedStatus>) -> std::sync::MutexGuard<'_, FeedStatus> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
