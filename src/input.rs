// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/input.rs - 图像获取与校验
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

use thiserror::Error;
use tracing::warn;

use crate::{
  FromUrl,
  model::{ImageBlob, MimeType},
};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 提交前的校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("画像サイズが大きすぎます: {size} バイト（上限 {} MB）", .limit / 1024 / 1024)]
  FileTooLarge { size: u64, limit: u64 },
  #[error("対応していない画像形式です: {content_type}（JPEG、PNG、WEBP のみ）")]
  UnsupportedFormat { content_type: String },
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("カメラへのアクセスが拒否されました")]
  CameraPermissionDenied,
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 检查大小上限与格式；先查大小，再查类型
pub fn validate(blob: &ImageBlob, max_bytes: u64) -> Result<MimeType, ValidationError> {
  if blob.size() > max_bytes {
    warn!("图像过大: {} > {}", blob.size(), max_bytes);
    return Err(ValidationError::FileTooLarge {
      size: blob.size(),
      limit: max_bytes,
    });
  }

  blob.mime().ok_or_else(|| {
    warn!("不支持的图像类型: {}", blob.content_type);
    ValidationError::UnsupportedFormat {
      content_type: blob.content_type.clone(),
    }
  })
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    let _ = url;
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = ImageBlob;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
    }
  }
}
