use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use headers::HeaderMapExt;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use reqwest::{Client, Request, StatusCode};
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::download::chunk_range::ChunkRange;
use crate::download::chunk_writer::ChunkWriter;
use crate::download::config::DownloadOptions;
use crate::download::error::{DownloadEndCause, DownloadError, IncompleteRange};
use crate::download::util::clone_request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Downloading,
    Retrying(u32),
    Complete,
    Failed(String),
    Cancelled,
}

/// 负责下载一个分块并写入目标文件对应的位置
pub struct ChunkWorker {
    client: Client,
    // GET 请求模板，每次请求时再加上 Range 头
    request: Request,
    file_path: PathBuf,
    range: ChunkRange,
    current: AtomicU64,
    status: Mutex<ChunkStatus>,
    options: Arc<DownloadOptions>,
}

impl ChunkWorker {
    pub fn new(
        client: Client,
        request: Request,
        file_path: PathBuf,
        range: ChunkRange,
        options: Arc<DownloadOptions>,
    ) -> Self {
        let status = if range.is_empty() { ChunkStatus::Complete } else { ChunkStatus::Pending };

        Self {
            client,
            request,
            file_path,
            current: AtomicU64::new(range.start),
            status: Mutex::new(status),
            range,
            options,
        }
    }

    pub fn index(&self) -> usize {
        self.range.index
    }

    /// 已经写入文件的位置，也是下次请求的起点
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn end(&self) -> u64 {
        self.range.end
    }

    pub fn is_complete(&self) -> bool {
        self.current() >= self.range.end
    }

    pub fn status(&self) -> ChunkStatus {
        self.status.lock().clone()
    }

    pub fn incomplete_range(&self) -> Option<IncompleteRange> {
        if self.is_complete() {
            None
        } else {
            Some(IncompleteRange { index: self.range.index, current: self.current(), end: self.range.end })
        }
    }

    fn set_status(&self, status: ChunkStatus) {
        *self.status.lock() = status;
    }

    /// 下载直到分块完成、被取消或重试耗尽
    pub async fn run(&self, cancel_token: CancellationToken) -> Result<DownloadEndCause, DownloadError> {
        let mut attempt = 0u32;

        loop {
            if self.is_complete() {
                self.set_status(ChunkStatus::Complete);
                return Ok(DownloadEndCause::Finished);
            }

            self.set_status(if attempt == 0 {
                ChunkStatus::Downloading
            } else {
                ChunkStatus::Retrying(attempt)
            });

            let result = select! {
                result = self.fetch() => result,
                _ = cancel_token.cancelled() => {
                    self.set_status(ChunkStatus::Cancelled);
                    return Ok(DownloadEndCause::Cancelled);
                }
            };

            match result {
                Ok(()) => {
                    debug!("Chunk {} finished at {}", self.range.index, self.current());
                }
                Err(err) if err.is_retryable() && attempt < u32::from(self.options.retry_count) => {
                    attempt += 1;
                    let delay = self.options.backoff(attempt);
                    warn!(
                        "Chunk {} failed at {}, try again {}/{} in {:?}: {}",
                        self.range.index, self.current(), attempt, self.options.retry_count, delay, err
                    );

                    select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel_token.cancelled() => {
                            self.set_status(ChunkStatus::Cancelled);
                            return Ok(DownloadEndCause::Cancelled);
                        }
                    }
                }
                Err(err) => {
                    error!("Chunk {} failed at {}: {}", self.range.index, self.current(), err);
                    self.set_status(ChunkStatus::Failed(err.to_string()));
                    return Err(err);
                }
            }
        }
    }

    /// 从当前位置请求到分块结尾，一边接收一边写入
    async fn fetch(&self) -> Result<(), DownloadError> {
        let start = self.current();
        let end = self.range.end;
        let remaining = ChunkRange::new(self.range.index, start, end);

        let mut request = clone_request(&self.request);
        request.headers_mut().typed_insert(remaining.to_range_header()?);

        let response = self.client.execute(request).await?;
        match response.status() {
            // 206 的内容必须从请求的位置开始，否则写入位置会错开
            StatusCode::PARTIAL_CONTENT => {
                let content_start = response
                    .headers()
                    .typed_get::<headers::ContentRange>()
                    .and_then(|content_range| content_range.bytes_range())
                    .map(|(content_start, _)| content_start);

                if content_start != Some(start) {
                    warn!(
                        "Chunk {}: requested from {}, server answered {:?}",
                        self.range.index, start, content_start
                    );
                    return Err(DownloadError::RangeNotSupported { index: self.range.index });
                }
            }
            // 服务端忽略了 Range，只有从 0 开始时返回的内容才对得上
            StatusCode::OK if start == 0 => {
                info!("Chunk {}: server answered 200, reading the first {} bytes", self.range.index, end);
            }
            StatusCode::OK => return Err(DownloadError::RangeNotSupported { index: self.range.index }),
            status => return Err(DownloadError::ChunkStatus { index: self.range.index, status }),
        }

        let writer = ChunkWriter::open(&self.file_path, start, end).await?;
        let mut stream = response.bytes_stream();
        while let Some(bytes) = stream.next().await {
            let bytes = bytes?;
            let written = writer.write(&bytes).await?;
            self.current.fetch_add(written as u64, Ordering::AcqRel);

            if self.is_complete() {
                break;
            }
        }

        if self.is_complete() {
            Ok(())
        } else {
            Err(DownloadError::ShortBody { index: self.range.index, offset: self.current(), end })
        }
    }
}
