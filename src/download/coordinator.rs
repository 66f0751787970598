use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::Stream;
use log::{debug, error, info, warn};
use reqwest::{Client, Method};
use tokio::fs;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::download::chunk_range::ChunkRange;
use crate::download::chunk_worker::ChunkWorker;
use crate::download::config::DownloadOptions;
use crate::download::error::{DownloadEndCause, DownloadError, IncompleteRange, ProbeError};
use crate::download::persistence::{PersistedState, ProgressRecord};
use crate::download::request::DownloadRequest;
use crate::download::util::{clone_request, probe_content_length};

/// 失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnknownLength,
    BadStatus(u16),
    ResumeMismatch,
    CorruptState,
    Transport,
    Storage,
    ChunksFailed,
    Interrupted,
}

impl From<ProbeError> for FailureKind {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::UnknownLength => FailureKind::UnknownLength,
            ProbeError::BadStatus(code) => FailureKind::BadStatus(code),
        }
    }
}

impl From<&DownloadError> for FailureKind {
    fn from(err: &DownloadError) -> Self {
        match err {
            DownloadError::ProbeFailed(err) => (*err).into(),
            DownloadError::ResumeMismatch { .. } => FailureKind::ResumeMismatch,
            DownloadError::CorruptState { .. } => FailureKind::CorruptState,
            DownloadError::HttpRequestFailed(_) => FailureKind::Transport,
            DownloadError::IOError(_) => FailureKind::Storage,
            DownloadError::Interrupted(_) => FailureKind::Interrupted,
            DownloadError::InvalidRequest(_)
            | DownloadError::RangeNotSupported { .. }
            | DownloadError::ChunkStatus { .. }
            | DownloadError::ShortBody { .. }
            | DownloadError::Incomplete(_) => FailureKind::ChunksFailed,
        }
    }
}

/// 一次下载的运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fresh,
    Probing,
    Splitting,
    Resuming,
    Downloading,
    Complete,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub file_path: PathBuf,
    pub total_len: u64,
    pub chunk_count: usize,
    pub resumed: bool,
    pub elapsed: Duration,
}

/// 协调一次分块下载：探测或恢复、分块、启动 worker、保存断点、检测完成
pub struct DownloadCoordinator {
    client: Client,
    request: Arc<DownloadRequest>,
    options: Arc<DownloadOptions>,
    cancel_token: CancellationToken,
    state_sender: watch::Sender<RunState>,
    progress_sender: watch::Sender<DownloadProgress>,
}

impl DownloadCoordinator {
    pub fn new(request: DownloadRequest, options: DownloadOptions) -> Self {
        let (state_sender, _) = watch::channel(RunState::Fresh);
        let (progress_sender, _) = watch::channel(DownloadProgress::default());

        Self {
            client: Client::new(),
            request: Arc::new(request),
            options: Arc::new(options),
            cancel_token: CancellationToken::new(),
            state_sender,
            progress_sender,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state_sender.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state_sender.subscribe()
    }

    /// 取消后所有 worker 停止，断点信息会被保存
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn progress_stream(&self) -> impl Stream<Item = DownloadProgress> + 'static {
        let mut receiver = self.progress_sender.subscribe();

        async_stream::stream! {
            let progress = *receiver.borrow_and_update();
            yield progress;

            while receiver.changed().await.is_ok() {
                let progress = *receiver.borrow_and_update();
                yield progress;
            }
        }
    }

    fn set_state(&self, state: RunState) {
        info!("{}: {:?}", self.request.file_name(), state);
        self.state_sender.send_replace(state);
    }

    /// 运行到结束，返回时状态一定是 `Complete` 或 `Failed`
    pub async fn start(&self) -> Result<DownloadSummary, DownloadError> {
        let result = self.run().await;
        if let Err(err) = &result {
            self.set_state(RunState::Failed(FailureKind::from(err)));
        }

        result
    }

    async fn run(&self) -> Result<DownloadSummary, DownloadError> {
        let started_at = Instant::now();
        let file_path = self.request.file_path();
        let position_path = self.request.position_path();

        let (ranges, resumed) = match self.resume_ranges().await? {
            Some(ranges) => (ranges, true),
            None => {
                self.set_state(RunState::Probing);
                let content_length = self.probe().await.inspect_err(|err| {
                    error!("Probe {} failed: {}", self.request.url(), err);
                })?;

                self.set_state(RunState::Splitting);
                let ranges = ChunkRange::split(content_length, self.request.split_count());
                for range in &ranges {
                    info!("Chunk {}: {}..{}", range.index, range.start, range.end);
                }

                self.prepare_file(content_length).await?;
                (ranges, false)
            }
        };

        let total_len = ranges.last().map(|range| range.end).unwrap_or(0);
        let workers = self.create_workers(&ranges);
        self.set_state(RunState::Downloading);
        self.persist(&workers).await?;

        let mut join_set = JoinSet::new();
        for worker in workers.iter().filter(|worker| !worker.is_complete()) {
            let worker = worker.clone();
            let cancel_token = self.cancel_token.child_token();
            join_set.spawn(async move {
                let result = worker.run(cancel_token).await;
                (worker.index(), result)
            });
        }

        let mut interval = tokio::time::interval(self.options.persist_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            select! {
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((index, Ok(DownloadEndCause::Finished)))) => {
                        info!("Chunk {} completed", index);
                    }
                    Some(Ok((index, Ok(DownloadEndCause::Cancelled)))) => {
                        info!("Chunk {} cancelled", index);
                    }
                    Some(Ok((index, Err(err)))) => {
                        error!("Chunk {} stopped: {}", index, err);
                    }
                    Some(Err(err)) => {
                        error!("Chunk task aborted: {}", err);
                    }
                },
                _ = interval.tick() => {
                    if let Err(err) = self.persist(&workers).await {
                        warn!("Save positions to {} failed: {}", position_path.display(), err);
                    }
                }
            }
        }

        let incomplete: Vec<IncompleteRange> = workers
            .iter()
            .filter_map(|worker| worker.incomplete_range())
            .collect();

        if incomplete.is_empty() {
            self.publish_progress(&workers);
            if fs::try_exists(&position_path).await? {
                fs::remove_file(&position_path).await?;
            }
            self.set_state(RunState::Complete);
            info!("Download completed: {}", file_path.display());

            return Ok(DownloadSummary {
                file_path,
                total_len,
                chunk_count: workers.len(),
                resumed,
                elapsed: started_at.elapsed(),
            });
        }

        self.persist(&workers).await?;
        for worker in workers.iter().filter(|worker| !worker.is_complete()) {
            warn!(
                "Chunk {} unfinished at {}..{}: {:?}",
                worker.index(), worker.current(), worker.end(), worker.status()
            );
        }

        if self.cancel_token.is_cancelled() {
            Err(DownloadError::Interrupted(incomplete))
        } else {
            Err(DownloadError::Incomplete(incomplete))
        }
    }

    /// 存在断点文件时返回恢复的分块
    async fn resume_ranges(&self) -> Result<Option<Vec<ChunkRange>>, DownloadError> {
        let position_path = self.request.position_path();
        if !fs::try_exists(&position_path).await? {
            return Ok(None);
        }

        if !fs::try_exists(self.request.file_path()).await? {
            warn!(
                "{} exists without {}, starting over",
                position_path.display(),
                self.request.file_path().display()
            );
            fs::remove_file(&position_path).await?;
            return Ok(None);
        }

        self.set_state(RunState::Resuming);
        let state = PersistedState::load_from_file(&position_path).await?;
        let ranges = state.to_ranges();
        if ranges.is_empty() {
            return Err(DownloadError::CorruptState {
                path: position_path,
                reason: "no ranges recorded".to_string(),
            });
        }
        info!("Resuming {} with {} ranges", self.request.file_name(), ranges.len());

        if self.options.revalidate_on_resume {
            let persisted = ranges.last().map(|range| range.end).unwrap_or(0);
            let remote = self.probe().await?;
            if persisted != remote {
                return Err(DownloadError::ResumeMismatch { persisted, remote });
            }
        }

        Ok(Some(ranges))
    }

    async fn probe(&self) -> Result<u64, DownloadError> {
        let request = self.options.create_http_request(Method::HEAD, self.request.url());
        let content_length = probe_content_length(&self.client, request).await?;
        info!("{} is {} bytes", self.request.url(), content_length);

        Ok(content_length)
    }

    async fn prepare_file(&self, content_length: u64) -> Result<(), DownloadError> {
        fs::create_dir_all(self.request.directory()).await?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.request.file_path())
            .await?;

        // 旧文件比远程文件长时必须截断，否则尾部会残留旧数据
        let len = file.metadata().await?.len();
        if len > content_length || (self.options.set_len_in_advance && len < content_length) {
            file.set_len(content_length).await?;
        }

        Ok(())
    }

    fn create_workers(&self, ranges: &[ChunkRange]) -> Vec<Arc<ChunkWorker>> {
        let request = self.options.create_http_request(Method::GET, self.request.url());
        let file_path = self.request.file_path();

        ranges
            .iter()
            .map(|range| {
                Arc::new(ChunkWorker::new(
                    self.client.clone(),
                    clone_request(&request),
                    file_path.clone(),
                    *range,
                    self.options.clone(),
                ))
            })
            .collect()
    }

    fn publish_progress(&self, workers: &[Arc<ChunkWorker>]) {
        let total = workers.last().map(|worker| worker.end()).unwrap_or(0);
        let remaining: u64 = workers
            .iter()
            .map(|worker| worker.end().saturating_sub(worker.current()))
            .sum();

        self.progress_sender.send_replace(DownloadProgress {
            downloaded: total.saturating_sub(remaining),
            total,
        });
    }

    async fn persist(&self, workers: &[Arc<ChunkWorker>]) -> Result<(), DownloadError> {
        let records = workers
            .iter()
            .map(|worker| ProgressRecord { current: worker.current(), end: worker.end() })
            .collect();
        PersistedState::new(records).save_to_file(&self.request.position_path()).await?;
        self.publish_progress(workers);
        debug!("Saved positions of {} ranges", workers.len());

        Ok(())
    }
}
