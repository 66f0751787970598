use std::fmt;
use std::path::PathBuf;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io;

/// 长度探测失败的原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("content length is unknown")]
    UnknownLength,

    #[error("server answered the probe with HTTP {0}")]
    BadStatus(u16),
}

/// 未完成的分块，用于在异常结束时报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteRange {
    pub index: usize,
    pub current: u64,
    pub end: u64,
}

impl fmt::Display for IncompleteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}..{}", self.index, self.current, self.end)
    }
}

/// 下载中发生的错误
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid download request: {0}")]
    InvalidRequest(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(#[from] ProbeError),

    #[error("Chunk {index}: server did not honour the range request")]
    RangeNotSupported { index: usize },

    #[error("Chunk {index}: unexpected HTTP {status}")]
    ChunkStatus { index: usize, status: StatusCode },

    #[error("Chunk {index}: body ended at {offset}, expected {end}")]
    ShortBody { index: usize, offset: u64, end: u64 },

    #[error("Corrupt resume file {}: {}", .path.display(), .reason)]
    CorruptState { path: PathBuf, reason: String },

    #[error("Resume file ends at {persisted} but the remote length is {remote}")]
    ResumeMismatch { persisted: u64, remote: u64 },

    #[error("Download incomplete, {} range(s) unfinished", .0.len())]
    Incomplete(Vec<IncompleteRange>),

    #[error("Download interrupted, {} range(s) unfinished", .0.len())]
    Interrupted(Vec<IncompleteRange>),

    #[error("Http request failed: {:?}", .0)]
    HttpRequestFailed(#[from] reqwest::Error),

    #[error("IOError: {:?}", .0)]
    IOError(#[from] io::Error),
}

impl DownloadError {
    /// 分块下载失败后是否值得重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpRequestFailed(_)
            | DownloadError::IOError(_)
            | DownloadError::ShortBody { .. } => true,
            DownloadError::ChunkStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// 异常结束时仍未完成的分块
    pub fn incomplete_ranges(&self) -> &[IncompleteRange] {
        match self {
            DownloadError::Incomplete(ranges) | DownloadError::Interrupted(ranges) => ranges,
            _ => &[],
        }
    }
}

/// 单个分块下载结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEndCause {
    Finished,
    Cancelled,
}
