// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/model/storage_key.rs - 存储键生成
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

use uuid::Uuid;

const UPLOAD_PREFIX: &str = "uploads";

/// 上传图像的唯一存储键，同时作为结果查询键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
  /// `uploads/{epoch-millis}-{uuid}.{ext}`
  pub fn generate(content_type: &str) -> Self {
    Self::with_parts(
      content_type,
      chrono::Utc::now().timestamp_millis(),
      Uuid::new_v4(),
    )
  }

  pub fn with_parts(content_type: &str, epoch_millis: i64, id: Uuid) -> Self {
    StorageKey(format!(
      "{}/{}-{}.{}",
      UPLOAD_PREFIX,
      epoch_millis,
      id,
      Self::extension_for(content_type)
    ))
  }

  /// png / webp 保留原扩展名，其余一律 jpg
  pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
      "image/png" => "png",
      "image/webp" => "webp",
      _ => "jpg",
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for StorageKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for StorageKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}
