// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/submit/http.rs - 基于 HTTP 的远端服务实现
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::{
  Body, Client, StatusCode,
  header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::Deserialize;
use tracing::{debug, error, warn};
use url::Url;

use super::{AnalysisApi, CancelHandle, ProgressFn, SubmitError};
use crate::{
  config::Config,
  model::{CredentialRequest, ImageBlob, StatusResponse, UploadCredential},
};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: String,
}

pub struct HttpAnalysisApi {
  client: Client,
  upload_url_endpoint: Url,
  status_endpoint: Url,
  request_timeout: Duration,
}

impl HttpAnalysisApi {
  pub fn new(config: &Config) -> Result<Self, SubmitError> {
    let client = Client::builder()
      .connect_timeout(CONNECT_TIMEOUT)
      .build()
      .map_err(|e| SubmitError::Network(e.to_string()))?;

    Ok(Self::with_client(client, config))
  }

  /// 使用调用方构建好的客户端，例如自定义代理或证书
  pub fn with_client(client: Client, config: &Config) -> Self {
    Self {
      client,
      upload_url_endpoint: config.upload_url_endpoint(),
      status_endpoint: config.analyze_status_endpoint(),
      request_timeout: config.request_timeout(),
    }
  }

  fn status_url(&self, key: &str) -> String {
    format!("{}?key={}", self.status_endpoint, urlencoding::encode(key))
  }
}

/// 把图像切块成流，每交出一块就报告一次进度
fn upload_stream(
  image: &ImageBlob,
  progress: ProgressFn,
  cancel: CancelHandle,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
  let data = Bytes::from(image.bytes.clone());
  let total = data.len();
  let chunks: Vec<Bytes> = (0..total)
    .step_by(UPLOAD_CHUNK_BYTES)
    .map(|start| data.slice(start..(start + UPLOAD_CHUNK_BYTES).min(total)))
    .collect();

  let mut sent = 0usize;
  futures::stream::iter(chunks.into_iter().map(move |chunk| {
    if cancel.is_cancelled() {
      return Err(std::io::Error::new(
        std::io::ErrorKind::Interrupted,
        "upload cancelled",
      ));
    }
    sent += chunk.len();
    progress(sent as f64 / total as f64 * 100.0);
    Ok::<Bytes, std::io::Error>(chunk)
  }))
}

impl AnalysisApi for HttpAnalysisApi {
  async fn request_credential(&self, content_type: &str) -> Result<UploadCredential, SubmitError> {
    let response = self
      .client
      .post(self.upload_url_endpoint.clone())
      .timeout(self.request_timeout)
      .json(&CredentialRequest {
        content_type: content_type.to_string(),
      })
      .send()
      .await
      .map_err(|e| SubmitError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let detail = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => format!("HTTP {}", status),
      };
      error!("凭证请求失败: {} {}", status, detail);
      return Err(SubmitError::CredentialRequestFailed(detail));
    }

    response
      .json::<UploadCredential>()
      .await
      .map_err(|e| SubmitError::InvalidResponse(e.to_string()))
  }

  async fn upload(
    &self,
    credential: &UploadCredential,
    image: &ImageBlob,
    progress: ProgressFn,
    cancel: &CancelHandle,
  ) -> Result<(), SubmitError> {
    if cancel.is_cancelled() {
      return Err(SubmitError::UploadCancelled);
    }

    debug!("开始上传 {} 字节到 {}", image.size(), credential.key);
    let response = self
      .client
      .put(&credential.upload_url)
      .header(CONTENT_TYPE, &image.content_type)
      .header(CONTENT_LENGTH, image.size())
      .body(Body::wrap_stream(upload_stream(
        image,
        progress,
        cancel.clone(),
      )))
      .send()
      .await;

    let response = match response {
      Ok(response) => response,
      Err(_) if cancel.is_cancelled() => {
        warn!("上传已取消: {}", credential.key);
        return Err(SubmitError::UploadCancelled);
      }
      Err(e) => {
        error!("上传网络错误: {}", e);
        return Err(SubmitError::Network(e.to_string()));
      }
    };

    let status = response.status();
    if !status.is_success() {
      error!("上传失败: {}", status);
      return Err(SubmitError::UploadFailed {
        status: status.as_u16(),
      });
    }
    Ok(())
  }

  async fn query_status(&self, key: &str) -> Result<StatusResponse, SubmitError> {
    let response = self
      .client
      .get(self.status_url(key))
      .timeout(self.request_timeout)
      .send()
      .await
      .map_err(|e| SubmitError::Network(e.to_string()))?;

    let status = response.status();
    // 记录不存在与处理中无法区分，一律按处理中继续轮询
    if status == StatusCode::NOT_FOUND {
      debug!("状态查询 404，按处理中处理: {}", key);
      return Ok(StatusResponse::Processing);
    }
    if !status.is_success() {
      error!("状态查询失败: {}", status);
      return Err(SubmitError::StatusQueryFailed {
        status: status.as_u16(),
      });
    }

    response
      .json::<StatusResponse>()
      .await
      .map_err(|e| SubmitError::InvalidResponse(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ConfigKey;
  use crate::submit::progress_fn;
  use futures::StreamExt;
  use std::sync::{Arc, Mutex};
  use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
  };

  fn config() -> Config {
    config_for("https://app.example")
  }

  fn config_for(base: &str) -> Config {
    let base = base.to_string();
    Config::from_lookup(move |key| match key {
      ConfigKey::ApiBase => Some(base.clone()),
      _ => None,
    })
    .unwrap()
  }

  /// 读完一个请求：头部加上 Content-Length 或分块编码的正文
  async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
      let n = socket.read(&mut chunk).await.unwrap_or(0);
      if n == 0 {
        return;
      }
      buf.extend_from_slice(&chunk[..n]);
      if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        break end + 4;
      }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let chunked = head.contains("transfer-encoding: chunked");
    let length = head
      .lines()
      .find_map(|line| line.strip_prefix("content-length:"))
      .and_then(|v| v.trim().parse::<usize>().ok())
      .unwrap_or(0);

    loop {
      let body = &buf[head_end..];
      let done = if chunked {
        body.ends_with(b"0\r\n\r\n")
      } else {
        body.len() >= length
      };
      if done {
        return;
      }
      let n = socket.read(&mut chunk).await.unwrap_or(0);
      if n == 0 {
        return;
      }
      buf.extend_from_slice(&chunk[..n]);
    }
  }

  /// 本地应答器，每个请求都返回同一状态码与正文，返回基础地址
  async fn respond_with(status: u16, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      while let Ok((mut socket, _)) = listener.accept().await {
        tokio::spawn(async move {
          read_request(&mut socket).await;
          let response = format!(
            "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
          );
          let _ = socket.write_all(response.as_bytes()).await;
          let _ = socket.shutdown().await;
        });
      }
    });
    format!("http://{}", addr)
  }

  fn local_api(base: &str) -> HttpAnalysisApi {
    let client = Client::builder().no_proxy().build().unwrap();
    HttpAnalysisApi::with_client(client, &config_for(base))
  }

  fn credential_for(base: &str) -> UploadCredential {
    UploadCredential {
      upload_url: format!("{}/put", base),
      key: "uploads/1-test.jpg".into(),
    }
  }

  #[tokio::test]
  async fn status_not_found_keeps_processing() {
    let base = respond_with(404, "").await;
    let status = local_api(&base).query_status("uploads/1-test.jpg").await.unwrap();
    assert_eq!(status, StatusResponse::Processing);
  }

  #[tokio::test]
  async fn status_server_error_is_query_failure() {
    let base = respond_with(500, r#"{"error":"boom"}"#).await;
    let err = local_api(&base)
      .query_status("uploads/1-test.jpg")
      .await
      .unwrap_err();
    assert!(matches!(err, SubmitError::StatusQueryFailed { status: 500 }));
  }

  #[tokio::test]
  async fn status_completed_body_is_parsed() {
    let base = respond_with(200, r#"{"status":"completed","result":{"equipment":null}}"#).await;
    let status = local_api(&base).query_status("uploads/1-test.jpg").await.unwrap();
    assert!(matches!(status, StatusResponse::Completed { ref result } if result.equipment.is_empty()));
  }

  #[tokio::test]
  async fn rejected_upload_reports_status() {
    let base = respond_with(403, "").await;
    let image = ImageBlob::new(vec![0xFF, 0xD8, 0xFF, 0xD9], "image/jpeg");
    let err = local_api(&base)
      .upload(
        &credential_for(&base),
        &image,
        progress_fn(|_| {}),
        &CancelHandle::default(),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, SubmitError::UploadFailed { status: 403 }));
  }

  #[tokio::test]
  async fn accepted_upload_succeeds() {
    let base = respond_with(200, "").await;
    let image = ImageBlob::new(vec![3u8; UPLOAD_CHUNK_BYTES + 1], "image/jpeg");
    local_api(&base)
      .upload(
        &credential_for(&base),
        &image,
        progress_fn(|_| {}),
        &CancelHandle::default(),
      )
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn credential_error_body_is_surfaced() {
    let base = respond_with(400, r#"{"error":"Invalid content type"}"#).await;
    let err = local_api(&base)
      .request_credential("image/gif")
      .await
      .unwrap_err();
    assert!(matches!(err, SubmitError::CredentialRequestFailed(ref m) if m == "Invalid content type"));
  }

  #[tokio::test]
  async fn credential_error_without_body_uses_status() {
    let base = respond_with(502, "").await;
    let err = local_api(&base)
      .request_credential("image/jpeg")
      .await
      .unwrap_err();
    assert!(matches!(err, SubmitError::CredentialRequestFailed(ref m) if m.contains("502")));
  }

  #[tokio::test]
  async fn credential_is_parsed() {
    let base = respond_with(
      200,
      r#"{"uploadUrl":"https://bucket.example/put","key":"uploads/1-a.jpg"}"#,
    )
    .await;
    let credential = local_api(&base).request_credential("image/jpeg").await.unwrap();
    assert_eq!(credential.key, "uploads/1-a.jpg");
  }

  #[test]
  fn status_url_encodes_key() {
    let api = HttpAnalysisApi::new(&config()).unwrap();
    assert_eq!(
      api.status_url("uploads/1-a b.jpg"),
      "https://app.example/api/analyze-status?key=uploads%2F1-a%20b.jpg"
    );
  }

  #[tokio::test]
  async fn body_reports_monotonic_progress_to_full() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let image = ImageBlob::new(vec![7u8; UPLOAD_CHUNK_BYTES * 2 + 10], "image/jpeg");
    let mut stream = Box::pin(upload_stream(
      &image,
      progress_fn(move |p| sink.lock().unwrap().push(p)),
      CancelHandle::default(),
    ));

    let mut received = 0;
    while let Some(chunk) = stream.next().await {
      received += chunk.unwrap().len();
    }
    assert_eq!(received, image.bytes.len());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*seen.last().unwrap(), 100.0);
  }

  #[tokio::test]
  async fn cancelled_body_stops_streaming() {
    let cancel = CancelHandle::default();
    let image = ImageBlob::new(vec![1u8; UPLOAD_CHUNK_BYTES * 3], "image/jpeg");
    let mut stream = Box::pin(upload_stream(&image, progress_fn(|_| {}), cancel.clone()));
    assert!(stream.next().await.unwrap().is_ok());
    cancel.cancel();
    assert!(stream.next().await.unwrap().is_err());
  }
}
