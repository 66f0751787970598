use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{self, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

struct WriterState {
    file: File,
    position: u64,
}

/// 在目标文件的固定位置开始顺序写入
///
/// 多个 writer 可以同时打开同一个文件，只要它们负责的区间互不重叠；
/// 同一个 writer 的并发写入由内部的锁串行化。
pub struct ChunkWriter {
    state: Mutex<WriterState>,
    limit: u64,
}

impl ChunkWriter {
    /// 以读写方式打开（不截断），定位到 `offset`，写入永远不会越过 `limit`
    pub async fn open(path: &Path, offset: u64, limit: u64) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;

        Ok(Self {
            state: Mutex::new(WriterState { file, position: offset }),
            limit,
        })
    }

    /// 在当前位置写入 `buf` 并前移位置，返回实际写入的字节数
    ///
    /// 超出上限的部分会被丢弃。
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().await;
        let room = usize::try_from(self.limit.saturating_sub(state.position)).unwrap_or(usize::MAX);
        let len = buf.len().min(room);

        if len == 0 {
            return Ok(0);
        }

        state.file.write_all(&buf[..len]).await?;
        // tokio 的 File 在后台线程写入，flush 等待写入真正落到文件
        state.file.flush().await?;
        state.position += len as u64;

        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;

    #[tokio::test]
    async fn should_write_at_offset_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, vec![b'.'; 10]).await.unwrap();

        let writer = ChunkWriter::open(&path, 4, 10).await.unwrap();
        writer.write(b"ab").await.unwrap();
        writer.write(b"c").await.unwrap();
        drop(writer);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"....abc...");
    }

    #[tokio::test]
    async fn should_keep_interleaved_writers_in_their_regions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");

        let first = ChunkWriter::open(&path, 0, 1000).await.unwrap();
        let second = ChunkWriter::open(&path, 1000, 2000).await.unwrap();

        for _ in 0..10 {
            assert_eq!(first.write(&[0xAA; 100]).await.unwrap(), 100);
            assert_eq!(second.write(&[0xBB; 100]).await.unwrap(), 100);
        }
        drop((first, second));

        let data = tokio::fs::read(&path).await.unwrap();
        assert_eq!(data.len(), 2000);
        assert!(data[..1000].iter().all(|b| *b == 0xAA));
        assert!(data[1000..].iter().all(|b| *b == 0xBB));
    }

    #[tokio::test]
    async fn should_not_write_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, vec![0u8; 8]).await.unwrap();

        let writer = ChunkWriter::open(&path, 2, 5).await.unwrap();
        assert_eq!(writer.write(b"xyzw").await.unwrap(), 3);
        assert_eq!(writer.write(b"q").await.unwrap(), 0);
        drop(writer);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"\0\0xyz\0\0\0");
    }

    #[tokio::test]
    async fn should_serialize_concurrent_writes_on_one_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let writer = Arc::new(ChunkWriter::open(&path, 0, 512).await.unwrap());

        let mut handles = Vec::new();
        for byte in 0u8..8 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                writer.write(&[byte; 64]).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(writer.write(&[9; 64]).await.unwrap(), 0);
        drop(writer);

        let data = tokio::fs::read(&path).await.unwrap();
        assert_eq!(data.len(), 512);
        // 每次写入完整落在一个 64 字节的块内
        for block in data.chunks(64) {
            assert!(block.iter().all(|b| *b == block[0]));
        }
    }
}
