use std::path::{Path, PathBuf};
use url::Url;
use crate::download::error::DownloadError;

pub const DEFAULT_SPLIT_COUNT: usize = 5;
/// 系统没有下载目录时使用的保存路径
pub const FALLBACK_DIRECTORY: &str = "downloads";
pub const POSITION_EXTENSION: &str = "position";

/// 一次下载的请求，构造时完成校验，之后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: Url,
    file_name: String,
    directory: PathBuf,
    split_count: usize,
}

impl DownloadRequest {
    pub fn new(
        url: &str,
        file_name: Option<String>,
        directory: Option<PathBuf>,
        split_count: i64,
    ) -> Result<Self, DownloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidRequest("url is empty".to_string()));
        }

        let url = Url::parse(url)
            .map_err(|err| DownloadError::InvalidRequest(format!("{}: {}", url, err)))?;

        let file_name = match file_name.filter(|name| !name.is_empty()) {
            Some(name) => name,
            None => file_name_from_url(&url)?,
        };

        let directory = directory
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(default_directory);

        // 小于 1 的分块数使用默认值
        let split_count = usize::try_from(split_count)
            .ok()
            .filter(|count| *count > 0)
            .unwrap_or(DEFAULT_SPLIT_COUNT);

        Ok(Self { url, file_name, directory, split_count })
    }

    pub fn from_url(url: &str) -> Result<Self, DownloadError> {
        Self::new(url, None, None, 0)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// 断点信息文件：`{directory}/{file_name}.position`
    pub fn position_path(&self) -> PathBuf {
        self.directory.join(format!("{}.{}", self.file_name, POSITION_EXTENSION))
    }
}

pub fn default_directory() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from(FALLBACK_DIRECTORY))
}

fn file_name_from_url(url: &Url) -> Result<String, DownloadError> {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .ok_or_else(|| DownloadError::InvalidRequest(format!("cannot derive a file name from {}", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_reject_empty_url() {
        assert!(matches!(DownloadRequest::from_url(""), Err(DownloadError::InvalidRequest(_))));
        assert!(matches!(DownloadRequest::from_url("   "), Err(DownloadError::InvalidRequest(_))));
    }

    #[test]
    fn should_reject_unparseable_url() {
        assert!(matches!(
            DownloadRequest::from_url("not a url"),
            Err(DownloadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn should_derive_file_name_from_last_segment() {
        let request = DownloadRequest::from_url("https://oss.example.com/media/cool.mp4?token=1").unwrap();

        assert_eq!(request.file_name(), "cool.mp4");
    }

    #[test]
    fn should_reject_url_without_file_name() {
        assert!(DownloadRequest::from_url("https://oss.example.com/media/").is_err());
    }

    #[test]
    fn should_default_split_count() {
        for split_count in [0, -3, i64::MIN] {
            let request = DownloadRequest::new("http://a/b.bin", None, None, split_count).unwrap();
            assert_eq!(request.split_count(), DEFAULT_SPLIT_COUNT);
        }

        let request = DownloadRequest::new("http://a/b.bin", None, None, 8).unwrap();
        assert_eq!(request.split_count(), 8);
    }

    #[test]
    fn should_default_directory() {
        let request = DownloadRequest::new("http://a/b.bin", Some(String::new()), Some(PathBuf::new()), 1).unwrap();

        assert_eq!(request.directory(), default_directory().as_path());
        assert_eq!(request.file_name(), "b.bin");
    }

    #[test]
    fn should_build_paths() {
        let request = DownloadRequest::new(
            "http://a/b.bin",
            Some("movie.mkv".to_string()),
            Some(PathBuf::from("/tmp/dl")),
            2,
        ).unwrap();

        assert_eq!(request.file_path(), PathBuf::from("/tmp/dl/movie.mkv"));
        assert_eq!(request.position_path(), PathBuf::from("/tmp/dl/movie.mkv.position"));
    }
}
