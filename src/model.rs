// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/model.rs - 分析结果数据模型
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

use serde::{Deserialize, Serialize};

mod sanitize;
mod storage_key;
mod wire;

pub use self::sanitize::sanitize_model_reply;
pub use self::storage_key::StorageKey;
pub use self::wire::{
  CredentialRequest, RecordPayload, ResultPayload, ResultRecord, StatusResponse, UploadCredential,
};

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum RiskLevel {
  Safe,
  Warning,
  Danger,
  Unknown,
}

impl From<String> for RiskLevel {
  fn from(value: String) -> Self {
    RiskLevel::from_label_str(&value)
  }
}

impl RiskLevel {
  /// 无法识别的字符串一律视为 UNKNOWN
  pub fn from_label_str(value: &str) -> Self {
    match value.trim().to_ascii_uppercase().as_str() {
      "SAFE" => RiskLevel::Safe,
      "WARNING" => RiskLevel::Warning,
      "DANGER" => RiskLevel::Danger,
      _ => RiskLevel::Unknown,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RiskLevel::Safe => "SAFE",
      RiskLevel::Warning => "WARNING",
      RiskLevel::Danger => "DANGER",
      RiskLevel::Unknown => "UNKNOWN",
    }
  }

  /// 边框与标签颜色
  pub fn color(&self) -> [u8; 3] {
    match self {
      RiskLevel::Safe => [0x10, 0xB9, 0x81],
      RiskLevel::Warning => [0xF5, 0x9E, 0x0B],
      RiskLevel::Danger => [0xEF, 0x44, 0x44],
      RiskLevel::Unknown => [0x0E, 0xA5, 0xE9],
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      RiskLevel::Safe => "安全",
      RiskLevel::Warning => "警告",
      RiskLevel::Danger => "危険",
      RiskLevel::Unknown => "不明",
    }
  }

  pub fn advice(&self) -> &'static str {
    match self {
      RiskLevel::Safe => "安全に操作できます",
      RiskLevel::Warning => "確認が必要です",
      RiskLevel::Danger => "触らないでください",
      RiskLevel::Unknown => "識別できませんでした",
    }
  }
}

impl fmt::Display for RiskLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 百分比边界框，相对于原始图像，取值 [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

impl BoundingBox {
  pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn right(&self) -> f64 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f64 {
    self.y + self.height
  }
}

/// 单个检测到的设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub name: String,
  #[serde(rename = "bbox", alias = "boundingBox")]
  pub bbox: BoundingBox,
  #[serde(rename = "risk_level", alias = "riskLevel")]
  pub risk_level: RiskLevel,
  #[serde(default)]
  pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
  Processing,
  Completed,
  Failed,
}

/// 一次分析的结果，同一 image_key 至多对应一个
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
  pub image_key: String,
  #[serde(rename = "equipment")]
  pub detections: Vec<Detection>,
  pub status: AnalysisStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  pub timestamp: i64,
}

impl AnalysisResult {
  pub fn completed(image_key: impl Into<String>, detections: Vec<Detection>) -> Self {
    Self {
      image_key: image_key.into(),
      detections,
      status: AnalysisStatus::Completed,
      error_message: None,
      timestamp: chrono::Utc::now().timestamp_millis(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn len(&self) -> usize {
    self.detections.len()
  }
}

/// 允许上传的图像类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
  Jpeg,
  Png,
  Webp,
}

impl MimeType {
  pub const ACCEPTED: [MimeType; 3] = [MimeType::Jpeg, MimeType::Png, MimeType::Webp];

  pub fn from_content_type(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "image/jpeg" | "image/jpg" => Some(MimeType::Jpeg),
      "image/png" => Some(MimeType::Png),
      "image/webp" => Some(MimeType::Webp),
      _ => None,
    }
  }

  pub fn content_type(&self) -> &'static str {
    match self {
      MimeType::Jpeg => "image/jpeg",
      MimeType::Png => "image/png",
      MimeType::Webp => "image/webp",
    }
  }

  pub fn image_format(&self) -> image::ImageFormat {
    match self {
      MimeType::Jpeg => image::ImageFormat::Jpeg,
      MimeType::Png => image::ImageFormat::Png,
      MimeType::Webp => image::ImageFormat::WebP,
    }
  }
}

impl fmt::Display for MimeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.content_type())
  }
}

/// 待提交的图像数据及其声明类型
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
  pub bytes: Vec<u8>,
  /// 声明的内容类型，原样保留以便校验
  pub content_type: String,
}

impl ImageBlob {
  pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
    Self {
      bytes,
      content_type: content_type.into(),
    }
  }

  pub fn size(&self) -> u64 {
    self.bytes.len() as u64
  }

  pub fn mime(&self) -> Option<MimeType> {
    MimeType::from_content_type(&self.content_type)
  }
}
