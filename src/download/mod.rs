//!
//! # 分块下载模块
//! 将一个远程文件分成若干段并发下载，直接写入目标文件的对应位置，并保存断点信息
//!

pub mod chunk_range;
pub mod chunk_worker;
pub mod chunk_writer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logger;
pub mod persistence;
pub mod request;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::{Config, DownloadOptions};
pub use coordinator::{DownloadCoordinator, DownloadProgress, DownloadSummary, FailureKind, RunState};
pub use error::{DownloadError, IncompleteRange, ProbeError};
pub use request::DownloadRequest;
