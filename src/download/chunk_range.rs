use std::collections::Bound;
use std::ops::RangeBounds;
use crate::download::error::DownloadError;

/// 文件中的一段半开区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self { index, start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 将 `[0, content_length)` 分成 `split_count` 段，最后一段吸收整除的余数
    pub fn split(content_length: u64, split_count: usize) -> Vec<ChunkRange> {
        let split_count = split_count.max(1);
        let size = content_length / split_count as u64;

        (0..split_count)
            .map(|index| {
                let start = index as u64 * size;
                let end = if index == split_count - 1 {
                    content_length
                } else {
                    (index as u64 + 1) * size
                };

                ChunkRange::new(index, start, end)
            })
            .collect()
    }

    /// `Range: bytes=start-(end-1)`，空区间没有对应的请求头
    pub fn to_range_header(&self) -> Result<headers::Range, DownloadError> {
        if self.is_empty() {
            return Err(DownloadError::InvalidRequest(format!(
                "chunk {} has an empty range {}..{}", self.index, self.start, self.end
            )));
        }

        headers::Range::bytes(self).map_err(|_| {
            DownloadError::InvalidRequest(format!(
                "chunk {} has an invalid range {}..{}", self.index, self.start, self.end
            ))
        })
    }
}

impl<'a> RangeBounds<u64> for &'a ChunkRange {
    fn start_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.start)
    }

    fn end_bound(&self) -> Bound<&u64> {
        Bound::Excluded(&self.end)
    }
}
