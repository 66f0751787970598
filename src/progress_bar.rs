use std::fmt::Write;
use std::io::{stdout, Write as _};
use std::time::Instant;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use crossterm::cursor::{MoveToColumn, MoveToPreviousLine};
use split_downloader::download::DownloadProgress;

/// 两行的终端进度条：第一行速度与大小，第二行进度
pub struct ProgressBar {
    bar_buf: String,
    buf: String,
    start_instant: Instant,
    bar_width: usize,
    started_at_len: Option<u64>,
    printed: bool,
}

impl ProgressBar {
    pub fn new(max_width: usize) -> Self {
        Self {
            buf: String::new(),
            bar_buf: String::new(),
            start_instant: Instant::now(),
            bar_width: crossterm::terminal::size().ok()
                .map(|(cols, _rows)| usize::from(cols))
                .unwrap_or(max_width)
                .clamp(10, max_width.max(10)),
            started_at_len: None,
            printed: false,
        }
    }

    fn update(&mut self, progress: DownloadProgress) -> Result<&str, std::fmt::Error> {
        let DownloadProgress { downloaded, total } = progress;
        // 恢复下载时已有的部分不计入速度
        let base = *self.started_at_len.get_or_insert(downloaded);
        let elapsed = self.start_instant.elapsed();
        let speed = if elapsed.as_secs_f64() > 0.0 {
            (downloaded.saturating_sub(base) as f64 / elapsed.as_secs_f64()) as u64
        } else {
            0
        };
        let percent = if total > 0 { (downloaded.min(total) * 100 / total) as usize } else { 0 };

        let (downloaded_size, downloaded_unit) = Self::byte_unit(downloaded);
        let (total_size, total_unit) = Self::byte_unit(total);
        let (speed_size, speed_unit) = Self::byte_unit(speed);

        self.bar_buf.clear();
        self.buf.clear();
        write!(self.bar_buf, "{speed_size:.2} {speed_unit}/s - {percent} % - elapsed: {elapsed:.2?} ")?;
        write!(self.buf, "{downloaded_size:.2} {downloaded_unit} / {total_size:.2} {total_unit}")?;
        let padding = self.bar_width.saturating_sub(self.bar_buf.len() + self.buf.len());
        self.bar_buf.extend(std::iter::repeat(' ').take(padding));
        writeln!(self.bar_buf, "{}", self.buf)?;

        let inner_width = self.bar_width - 2;
        let filled = percent * inner_width / 100;
        self.bar_buf.push('[');
        self.bar_buf.extend(std::iter::repeat('█').take(filled));
        self.bar_buf.extend(std::iter::repeat(' ').take(inner_width - filled));
        self.bar_buf.push(']');

        Ok(&self.bar_buf)
    }

    pub fn print(&mut self, progress: DownloadProgress) -> std::io::Result<()> {
        let printed = self.printed;
        let update_value = self.update(progress).map_err(std::io::Error::other)?.to_string();
        let mut out = stdout();

        if printed {
            execute!(
                out,
                Clear(ClearType::CurrentLine),
                MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine),
                MoveToColumn(0),
            )?;
        }
        execute!(out, crossterm::style::Print(update_value))?;
        out.flush()?;
        self.printed = true;

        Ok(())
    }

    pub fn finish(&mut self) -> std::io::Result<()> {
        if self.printed {
            println!();
        }
        Ok(())
    }

    fn byte_unit(bytes_count: u64) -> (f32, &'static str) {
        const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

        let mut i = 0;
        let mut bytes_count = bytes_count as f32;
        while bytes_count >= 1024.0 && i < UNITS.len() - 1 {
            i += 1;
            bytes_count /= 1024.0;
        }
        (bytes_count, UNITS[i])
    }
}
