// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/error.rs - 统一错误类型
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

use std::fmt;

use thiserror::Error;

use crate::{
  config::ConfigError,
  input::{InputError, ValidationError},
  normalize::NormalizeError,
  output::OutputError,
  state::TransitionError,
  submit::SubmitError,
};

#[derive(Error, Debug)]
pub enum AppError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Normalize(#[from] NormalizeError),
  #[error(transparent)]
  Submit(#[from] SubmitError),
  #[error(transparent)]
  Input(#[from] InputError),
  #[error(transparent)]
  Output(#[from] OutputError),
  #[error(transparent)]
  Transition(#[from] TransitionError),
}

/// 错误类别，由产生错误的变体决定，不从消息文本推断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Configuration,
  FileTooLarge,
  UnsupportedFormat,
  Compression,
  Network,
  Upload,
  Cancelled,
  AnalysisFailed,
  Timeout,
  Camera,
  Output,
  Internal,
}

impl ErrorKind {
  pub fn title(&self) -> &'static str {
    match self {
      ErrorKind::Network => "ネットワークエラー",
      ErrorKind::Timeout => "タイムアウト",
      ErrorKind::Camera => "カメラエラー",
      ErrorKind::FileTooLarge => "ファイルサイズエラー",
      ErrorKind::UnsupportedFormat => "ファイル形式エラー",
      _ => "エラー",
    }
  }

  pub fn icon(&self) -> &'static str {
    match self {
      ErrorKind::Network => "📡",
      ErrorKind::Timeout => "⏱️",
      ErrorKind::Camera => "📷",
      ErrorKind::FileTooLarge => "📏",
      ErrorKind::UnsupportedFormat => "📄",
      _ => "⚠️",
    }
  }
}

impl AppError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      AppError::Config(_) => ErrorKind::Configuration,
      AppError::Validation(ValidationError::FileTooLarge { .. }) => ErrorKind::FileTooLarge,
      AppError::Validation(ValidationError::UnsupportedFormat { .. }) => {
        ErrorKind::UnsupportedFormat
      }
      AppError::Normalize(_) => ErrorKind::Compression,
      AppError::Submit(err) => match err {
        SubmitError::Network(_) => ErrorKind::Network,
        SubmitError::CredentialRequestFailed(_)
        | SubmitError::UploadFailed { .. }
        | SubmitError::StatusQueryFailed { .. }
        | SubmitError::InvalidResponse(_) => ErrorKind::Upload,
        SubmitError::UploadCancelled => ErrorKind::Cancelled,
        SubmitError::AnalysisFailed { .. } => ErrorKind::AnalysisFailed,
        SubmitError::AnalysisTimeout { .. } => ErrorKind::Timeout,
      },
      AppError::Input(InputError::CameraPermissionDenied) => ErrorKind::Camera,
      AppError::Input(_) => ErrorKind::Internal,
      AppError::Output(_) => ErrorKind::Output,
      AppError::Transition(_) => ErrorKind::Internal,
    }
  }

  pub fn report(&self) -> ErrorReport {
    ErrorReport {
      kind: self.kind(),
      message: self.to_string(),
    }
  }
}

/// 错误状态下展示给用户的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
  pub kind: ErrorKind,
  pub message: String,
}

impl ErrorReport {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

impl From<&AppError> for ErrorReport {
  fn from(error: &AppError) -> Self {
    error.report()
  }
}

impl fmt::Display for ErrorReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}: {}", self.kind.icon(), self.kind.title(), self.message)
  }
}
