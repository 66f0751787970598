//! 测试用的 HTTP 服务端行为

use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

/// 可预测的测试数据
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// 按 `Range` 请求头返回对应片段 (206)，没有 Range 时返回全部内容 (200)
pub struct RangeResponder {
    data: Vec<u8>,
    delay: Option<Duration>,
}

impl RangeResponder {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn parse_range(request: &Request) -> Option<(usize, Option<usize>)> {
        let value = request.headers.get("range")?.to_str().ok()?;
        let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
        let start = start.parse().ok()?;
        let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };

        Some((start, end))
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.data.len();
        let template = if request.method.as_str() == "HEAD" {
            ResponseTemplate::new(200)
                .insert_header("content-length", len.to_string().as_str())
                .set_body_bytes(self.data.clone())
        } else {
            match Self::parse_range(request) {
                Some((start, end)) if start < len => {
                    let end = end.unwrap_or(len - 1).min(len - 1);
                    ResponseTemplate::new(206)
                        .insert_header("content-range", format!("bytes {}-{}/{}", start, end, len).as_str())
                        .set_body_bytes(self.data[start..=end].to_vec())
                }
                Some(_) => ResponseTemplate::new(416),
                None => ResponseTemplate::new(200).set_body_bytes(self.data.clone()),
            }
        };

        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}
