// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/submit.rs - 图像提交：凭证、上传与结果轮询
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::Config,
  model::{AnalysisResult, ImageBlob, StatusResponse, UploadCredential},
};

mod http;
pub use self::http::HttpAnalysisApi;

const DEFAULT_ANALYSIS_FAILURE: &str = "分析に失敗しました";

/// 上传进度回调，参数为 [0, 100] 的百分比
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

pub fn progress_fn<F>(f: F) -> ProgressFn
where
  F: Fn(f64) + Send + Sync + 'static,
{
  Arc::new(f)
}

#[derive(Error, Debug)]
pub enum SubmitError {
  #[error("署名付きURLの取得に失敗しました: {0}")]
  CredentialRequestFailed(String),
  #[error("アップロード失敗: {status}")]
  UploadFailed { status: u16 },
  #[error("ネットワークエラーが発生しました: {0}")]
  Network(String),
  #[error("アップロードがキャンセルされました")]
  UploadCancelled,
  #[error("分析ステータスの確認に失敗しました: {status}")]
  StatusQueryFailed { status: u16 },
  #[error("応答の解析に失敗しました: {0}")]
  InvalidResponse(String),
  #[error("{message}")]
  AnalysisFailed { message: String },
  #[error("分析がタイムアウトしました。もう一度お試しください")]
  AnalysisTimeout { attempts: u32 },
}

/// 上传取消标记，可跨线程共享
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// 远端服务接口：凭证签发、对象上传、状态查询
#[allow(async_fn_in_trait)]
pub trait AnalysisApi {
  async fn request_credential(&self, content_type: &str) -> Result<UploadCredential, SubmitError>;

  async fn upload(
    &self,
    credential: &UploadCredential,
    image: &ImageBlob,
    progress: ProgressFn,
    cancel: &CancelHandle,
  ) -> Result<(), SubmitError>;

  async fn query_status(&self, key: &str) -> Result<StatusResponse, SubmitError>;
}

/// 固定间隔、有限次数的轮询策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
  pub interval: Duration,
  pub max_attempts: u32,
  /// 单次查询超时，超时的查询按处理中计入次数
  pub query_timeout: Duration,
}

impl Default for PollPolicy {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
      max_attempts: crate::config::DEFAULT_POLL_MAX_ATTEMPTS,
      query_timeout: Duration::from_millis(crate::config::DEFAULT_POLL_QUERY_TIMEOUT_MS),
    }
  }
}

impl From<&Config> for PollPolicy {
  fn from(config: &Config) -> Self {
    Self {
      interval: config.poll_interval(),
      max_attempts: config.poll_max_attempts(),
      query_timeout: config.poll_query_timeout(),
    }
  }
}

pub struct SubmissionClient<A> {
  api: A,
  policy: PollPolicy,
}

impl<A: AnalysisApi> SubmissionClient<A> {
  pub fn new(api: A) -> Self {
    Self {
      api,
      policy: PollPolicy::default(),
    }
  }

  pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn api(&self) -> &A {
    &self.api
  }

  /// 依次执行：申请凭证 -> 上传 -> 轮询结果，任一步失败即终止，不做重试
  pub async fn submit(
    &self,
    image: &ImageBlob,
    progress: ProgressFn,
    cancel: &CancelHandle,
  ) -> Result<AnalysisResult, SubmitError> {
    info!("申请上传凭证: {}", image.content_type);
    let credential = self.api.request_credential(&image.content_type).await?;
    info!("凭证已签发: {}", credential.key);

    self.api.upload(&credential, image, progress, cancel).await?;
    info!("上传完成: {} ({} 字节)", credential.key, image.size());

    self.poll_result(&credential.key).await
  }

  /// 顺序轮询，同一时间只有一个查询在进行
  pub async fn poll_result(&self, key: &str) -> Result<AnalysisResult, SubmitError> {
    let max_attempts = self.policy.max_attempts;
    for attempt in 1..=max_attempts {
      debug!("查询分析状态 ({}/{}): {}", attempt, max_attempts, key);
      let status =
        match tokio::time::timeout(self.policy.query_timeout, self.api.query_status(key)).await {
          Ok(status) => status?,
          Err(_) => {
            warn!(
              "状态查询超时 ({:?})，按处理中继续: {}",
              self.policy.query_timeout, key
            );
            StatusResponse::Processing
          }
        };
      match status {
        StatusResponse::Completed { result } => {
          info!(
            "分析完成: {}, 检测到 {} 个设备 (第 {} 次查询)",
            key,
            result.equipment.len(),
            attempt
          );
          return Ok(AnalysisResult::completed(key, result.equipment));
        }
        StatusResponse::Failed { error } => {
          let message = error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ANALYSIS_FAILURE.to_string());
          warn!("分析失败: {}: {}", key, message);
          return Err(SubmitError::AnalysisFailed { message });
        }
        StatusResponse::Processing => {
          if attempt < max_attempts {
            tokio::time::sleep(self.policy.interval).await;
          }
        }
      }
    }

    warn!("分析超时: {} ({} 次查询)", key, max_attempts);
    Err(SubmitError::AnalysisTimeout {
      attempts: max_attempts,
    })
  }
}
