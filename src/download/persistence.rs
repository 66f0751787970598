//!
//! # 持久化模块
//! 将每个分块当前写入的位置保存到硬盘，用于断点恢复
//!
//! 文件布局 (大端)：`i32` 分块数量，随后每个分块一对 `i64` (当前位置, 结束位置)
//!

use std::path::Path;
use bytes::{Buf, BufMut, BytesMut};
use tokio::fs;
use crate::download::chunk_range::ChunkRange;
use crate::download::error::DownloadError;

const COUNT_LEN: usize = 4;
const ENTRY_LEN: usize = 16;

/// 单个分块的进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRecord {
    pub current: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub records: Vec<ProgressRecord>,
}

impl PersistedState {
    pub fn new(records: Vec<ProgressRecord>) -> Self {
        Self { records }
    }

    /// 恢复出的分块从上次写到的位置开始，顺序与分块序号一致
    pub fn to_ranges(&self) -> Vec<ChunkRange> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| ChunkRange::new(index, record.current.min(record.end), record.end))
            .collect()
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(COUNT_LEN + self.records.len() * ENTRY_LEN);
        buf.put_i32(self.records.len() as i32);
        for record in &self.records {
            buf.put_i64(record.current as i64);
            buf.put_i64(record.end as i64);
        }

        buf
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, String> {
        if data.len() < COUNT_LEN {
            return Err(format!("expected at least {} bytes, found {}", COUNT_LEN, data.len()));
        }

        let count = data.get_i32();
        if count < 0 {
            return Err(format!("negative range count {}", count));
        }

        let count = count as usize;
        if data.len() != count * ENTRY_LEN {
            return Err(format!(
                "{} ranges need {} bytes, found {}", count, count * ENTRY_LEN, data.len()
            ));
        }

        let mut records = Vec::with_capacity(count);
        for index in 0..count {
            let current = data.get_i64();
            let end = data.get_i64();
            if current < 0 || end < 0 {
                return Err(format!("range {} has a negative offset ({}, {})", index, current, end));
            }

            records.push(ProgressRecord { current: current as u64, end: end as u64 });
        }

        Ok(Self { records })
    }

    pub async fn load_from_file(file_path: &Path) -> Result<Self, DownloadError> {
        let data = fs::read(file_path).await?;

        Self::decode(&data).map_err(|reason| DownloadError::CorruptState {
            path: file_path.to_path_buf(),
            reason,
        })
    }

    /// 先写入临时文件再重命名，避免进程中断时留下半个文件
    pub async fn save_to_file(&self, file_path: &Path) -> Result<(), DownloadError> {
        let mut tmp_path = file_path.as_os_str().to_owned();
        tmp_path.push(".tmp");

        fs::write(&tmp_path, self.encode()).await?;
        fs::rename(&tmp_path, file_path).await?;

        Ok(())
    }
}
