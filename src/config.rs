// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/config.rs - 运行配置
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

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_QUERY_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// 全部可识别的配置项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
  ApiBase,
  MaxFileBytes,
  PollIntervalMs,
  PollMaxAttempts,
  PollQueryTimeoutMs,
  RequestTimeoutSecs,
  FontPath,
}

impl ConfigKey {
  pub const ALL: [ConfigKey; 7] = [
    ConfigKey::ApiBase,
    ConfigKey::MaxFileBytes,
    ConfigKey::PollIntervalMs,
    ConfigKey::PollMaxAttempts,
    ConfigKey::PollQueryTimeoutMs,
    ConfigKey::RequestTimeoutSecs,
    ConfigKey::FontPath,
  ];

  pub fn env_name(&self) -> &'static str {
    match self {
      ConfigKey::ApiBase => "KYOKUCHO_API_BASE",
      ConfigKey::MaxFileBytes => "KYOKUCHO_MAX_FILE_BYTES",
      ConfigKey::PollIntervalMs => "KYOKUCHO_POLL_INTERVAL_MS",
      ConfigKey::PollMaxAttempts => "KYOKUCHO_POLL_MAX_ATTEMPTS",
      ConfigKey::PollQueryTimeoutMs => "KYOKUCHO_POLL_QUERY_TIMEOUT_MS",
      ConfigKey::RequestTimeoutSecs => "KYOKUCHO_REQUEST_TIMEOUT_SECS",
      ConfigKey::FontPath => "KYOKUCHO_FONT_PATH",
    }
  }

  pub fn is_required(&self) -> bool {
    matches!(self, ConfigKey::ApiBase)
  }
}

impl fmt::Display for ConfigKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.env_name())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("缺少必需的配置项: {0}")]
  Missing(ConfigKey),
  #[error("配置项 {key} 的值无效 '{value}': {reason}")]
  Invalid {
    key: ConfigKey,
    value: String,
    reason: String,
  },
}

/// 进程启动时构建一次的不可变配置
#[derive(Debug, Clone)]
pub struct Config {
  api_base: Url,
  max_file_bytes: u64,
  poll_interval: Duration,
  poll_max_attempts: u32,
  poll_query_timeout: Duration,
  request_timeout: Duration,
  font_path: Option<PathBuf>,
}

impl Config {
  /// 从进程环境变量读取配置
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key.env_name()).ok())
  }

  /// 通过任意查找函数读取配置，所有校验在此一次完成
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(ConfigKey) -> Option<String>,
  {
    for key in ConfigKey::ALL {
      let present = lookup(key).is_some_and(|v| !v.trim().is_empty());
      if key.is_required() && !present {
        return Err(ConfigError::Missing(key));
      }
      debug!("配置项 {}: {}", key, if present { "已设置" } else { "未设置" });
    }

    let api_base = {
      let raw = required(&lookup, ConfigKey::ApiBase)?;
      let url = Url::parse(raw.trim()).map_err(|e| invalid(ConfigKey::ApiBase, &raw, e))?;
      if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(ConfigKey::ApiBase, &raw, "需要 http(s) 基础地址"));
      }
      url
    };

    let max_file_bytes = parsed(&lookup, ConfigKey::MaxFileBytes, DEFAULT_MAX_FILE_BYTES)?;
    let poll_interval_ms = parsed(&lookup, ConfigKey::PollIntervalMs, DEFAULT_POLL_INTERVAL_MS)?;
    let poll_max_attempts = parsed(&lookup, ConfigKey::PollMaxAttempts, DEFAULT_POLL_MAX_ATTEMPTS)?;
    let poll_query_timeout_ms = parsed(
      &lookup,
      ConfigKey::PollQueryTimeoutMs,
      DEFAULT_POLL_QUERY_TIMEOUT_MS,
    )?;
    let timeout_secs = parsed(
      &lookup,
      ConfigKey::RequestTimeoutSecs,
      DEFAULT_REQUEST_TIMEOUT_SECS,
    )?;

    if poll_max_attempts == 0 {
      return Err(invalid(ConfigKey::PollMaxAttempts, "0", "至少需要一次轮询"));
    }
    if poll_query_timeout_ms == 0 {
      return Err(invalid(ConfigKey::PollQueryTimeoutMs, "0", "单次查询超时必须大于 0"));
    }

    let font_path = lookup(ConfigKey::FontPath)
      .filter(|v| !v.trim().is_empty())
      .map(PathBuf::from);

    let config = Config {
      api_base,
      max_file_bytes,
      poll_interval: Duration::from_millis(poll_interval_ms),
      poll_max_attempts,
      poll_query_timeout: Duration::from_millis(poll_query_timeout_ms),
      request_timeout: Duration::from_secs(timeout_secs),
      font_path,
    };
    info!("配置加载完成: 接口地址 {}", config.api_base);
    Ok(config)
  }

  pub fn api_base(&self) -> &Url {
    &self.api_base
  }

  pub fn max_file_bytes(&self) -> u64 {
    self.max_file_bytes
  }

  pub fn poll_interval(&self) -> Duration {
    self.poll_interval
  }

  pub fn poll_max_attempts(&self) -> u32 {
    self.poll_max_attempts
  }

  /// 单次状态查询的超时，与轮询次数一起限定最长等待时间
  pub fn poll_query_timeout(&self) -> Duration {
    self.poll_query_timeout
  }

  pub fn request_timeout(&self) -> Duration {
    self.request_timeout
  }

  pub fn font_path(&self) -> Option<&PathBuf> {
    self.font_path.as_ref()
  }

  /// 凭证接口地址
  pub fn upload_url_endpoint(&self) -> Url {
    self.endpoint("api/upload-url")
  }

  /// 状态查询接口地址
  pub fn analyze_status_endpoint(&self) -> Url {
    self.endpoint("api/analyze-status")
  }

  fn endpoint(&self, path: &str) -> Url {
    let mut url = self.api_base.clone();
    let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url
  }
}

fn required<F>(lookup: &F, key: ConfigKey) -> Result<String, ConfigError>
where
  F: Fn(ConfigKey) -> Option<String>,
{
  lookup(key).ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: ConfigKey, default: T) -> Result<T, ConfigError>
where
  F: Fn(ConfigKey) -> Option<String>,
  T: FromStr,
  T::Err: fmt::Display,
{
  match lookup(key).filter(|v| !v.trim().is_empty()) {
    Some(raw) => raw.trim().parse().map_err(|e| invalid(key, &raw, e)),
    None => Ok(default),
  }
}

fn invalid(key: ConfigKey, value: &str, reason: impl fmt::Display) -> ConfigError {
  ConfigError::Invalid {
    key,
    value: value.to_string(),
    reason: reason.to_string(),
  }
}
