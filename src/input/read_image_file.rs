// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::ImageFormat;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::ImageBlob};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid path encoding: {0}")]
  PathEncoding(#[from] std::string::FromUtf8Error),
}

const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// 单张图像文件，读取一次后耗尽
pub struct ImageFileInput {
  blob: Option<ImageBlob>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = urlencoding::decode(url.path())?;
    Self::open(&*path)
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let content_type = declared_content_type(path);
    info!(
      "读取图像文件: {} ({:.2} MB, {})",
      path.display(),
      bytes.len() as f64 / (1024.0 * 1024.0),
      content_type
    );

    Ok(ImageFileInput {
      blob: Some(ImageBlob::new(bytes, content_type)),
    })
  }
}

/// 按扩展名声明类型，不看文件内容
fn declared_content_type(path: &Path) -> &'static str {
  ImageFormat::from_path(path)
    .map(|format| format.to_mime_type())
    .unwrap_or(UNKNOWN_CONTENT_TYPE)
}

impl Iterator for ImageFileInput {
  type Item = ImageBlob;

  fn next(&mut self) -> Option<Self::Item> {
    self.blob.take()
  }
}
