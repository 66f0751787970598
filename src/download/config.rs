//!
//! 配置模块
//!

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use headers::HeaderMapExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Request};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::download::error::DownloadError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";
const CRATE_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// 下载过程的运行参数
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// 每个分块失败后的最大重试次数
    pub retry_count: u8,
    /// 第一次重试前的等待时间，之后每次翻倍
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// 保存断点信息的间隔
    pub persist_interval: Duration,
    // 提前设置文件长度，如果存储空间不足将提前报错
    pub set_len_in_advance: bool,
    pub revalidate_on_resume: bool,
    pub use_browser_user_agent: bool,
    pub header_map: HeaderMap,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            persist_interval: Duration::from_millis(500),
            set_len_in_advance: true,
            revalidate_on_resume: false,
            use_browser_user_agent: false,
            header_map: HeaderMap::new(),
        }
    }
}

impl DownloadOptions {
    /// 探测与分块请求共用的请求模板，保证服务端看到一致的请求头
    pub fn create_http_request(&self, method: Method, url: &Url) -> Request {
        let mut request = Request::new(method, url.clone());
        let header_map = request.headers_mut();

        let agent = if self.use_browser_user_agent { BROWSER_USER_AGENT } else { CRATE_USER_AGENT };
        header_map.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(agent));
        header_map.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        header_map.typed_insert(headers::Connection::keep_alive());
        for (header_name, header_value) in self.header_map.iter() {
            header_map.insert(header_name, header_value.clone());
        }

        request
    }

    /// 第 `attempt` 次重试 (从 1 开始) 前的等待时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }

    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<(), DownloadError> {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|err| DownloadError::InvalidRequest(format!("header name {:?}: {}", name, err)))?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|err| DownloadError::InvalidRequest(format!("header {}: {}", header_name, err)))?;
        self.header_map.insert(header_name, header_value);

        Ok(())
    }

    /// 解析 `Name: value` 形式的请求头
    pub fn insert_raw_header(&mut self, raw: &str) -> Result<(), DownloadError> {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| DownloadError::InvalidRequest(format!("header {:?} is not `Name: value`", raw)))?;

        self.insert_header(name, value)
    }
}

/// 配置文件 (JSON)
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub split_count: i64,
    pub download_dir: Option<PathBuf>,
    pub retry_times: u8,
    pub retry_delay_ms: u64,
    pub persist_interval_ms: u64,
    pub set_len_in_advance: bool,
    pub revalidate_on_resume: bool,
    pub use_browser_user_agent: bool,
    pub headers: BTreeMap<String, String>,
}

impl Config {
    pub fn load_from_file(file_path: &Path) -> Result<Self> {
        let config_data = fs::read_to_string(file_path)
            .with_context(|| format!("Read config failed: {}", file_path.display()))?;
        let config: Config = serde_json::from_str(&config_data)
            .with_context(|| format!("Parse config failed: {}", file_path.display()))?;

        Ok(config)
    }

    pub fn options(&self) -> Result<DownloadOptions, DownloadError> {
        let mut options = DownloadOptions {
            retry_count: self.retry_times,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            persist_interval: Duration::from_millis(self.persist_interval_ms.max(1)),
            set_len_in_advance: self.set_len_in_advance,
            revalidate_on_resume: self.revalidate_on_resume,
            use_browser_user_agent: self.use_browser_user_agent,
            ..DownloadOptions::default()
        };

        for (name, value) in &self.headers {
            options.insert_header(name, value)?;
        }

        Ok(options)
    }
}

impl Default for Config {
    fn default() -> Self {
        let options = DownloadOptions::default();
        Self {
            split_count: crate::download::request::DEFAULT_SPLIT_COUNT as i64,
            download_dir: None,
            retry_times: options.retry_count,
            retry_delay_ms: options.retry_delay.as_millis() as u64,
            persist_interval_ms: options.persist_interval.as_millis() as u64,
            set_len_in_advance: options.set_len_in_advance,
            revalidate_on_resume: options.revalidate_on_resume,
            use_browser_user_agent: options.use_browser_user_agent,
            headers: BTreeMap::new(),
        }
    }
}
