use log::{debug, warn};
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::{Client, Request, StatusCode};
use crate::download::error::{DownloadError, ProbeError};

pub fn clone_request(request: &Request) -> Request {
    let mut req = Request::new(request.method().clone(), request.url().clone());
    *req.headers_mut() = request.headers().clone();
    *req.version_mut() = request.version();
    *req.timeout_mut() = request.timeout().map(Clone::clone);

    req
}

/// 根据探测请求的状态码和响应头得到文件长度
///
/// 只有 200 和 206 被视为成功；缺失、无法解析或为 0 的长度都算作未知长度。
pub fn interpret_probe(status: StatusCode, headers: &HeaderMap) -> Result<u64, ProbeError> {
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(ProbeError::BadStatus(status.as_u16()));
    }

    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|length| *length > 0)
        .ok_or(ProbeError::UnknownLength)
}

/// 发送探测请求获取文件长度，`request` 应为 HEAD 请求模板
pub async fn probe_content_length(client: &Client, request: Request) -> Result<u64, DownloadError> {
    let url = request.url().clone();
    let response = client.execute(request).await?;
    let status = response.status();
    debug!("Probe {} answered HTTP {}: {:?}", url, status, response.headers());

    interpret_probe(status, response.headers()).map_err(|err| {
        warn!("Probe {} failed: {}", url, err);
        DownloadError::ProbeFailed(err)
    })
}
