// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/normalize.rs - 上传前的图像压缩与转码
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

use image::{DynamicImage, RgbImage, codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ImageBlob, MimeType};

/// 上游模型的硬上限为 5 MB，这里留出余量
pub const TARGET_MAX_BYTES: u64 = 4_718_592; // 4.5 MiB
pub const MAX_DIMENSION: u32 = 1920;
const INITIAL_QUALITY: u8 = 80;
const MIN_QUALITY: u8 = 10;
const QUALITY_STEP: u8 = 10;

#[derive(Error, Debug)]
pub enum NormalizeError {
  #[error("画像の圧縮に失敗しました: {0}")]
  CompressionFailed(#[from] image::ImageError),
  #[error("画像の圧縮に失敗しました: 后台任务异常 {0}")]
  Worker(String),
}

/// 压缩后的 JPEG 及其尺寸信息
#[derive(Debug, Clone)]
pub struct NormalizedImage {
  pub blob: ImageBlob,
  pub width: u32,
  pub height: u32,
  pub source_width: u32,
  pub source_height: u32,
  pub quality: u8,
  /// 未能压到目标大小时为 false，结果仍然可用
  pub within_target: bool,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
  max_bytes: u64,
  max_dimension: u32,
  initial_quality: u8,
  min_quality: u8,
  quality_step: u8,
}

impl Default for Normalizer {
  fn default() -> Self {
    Self {
      max_bytes: TARGET_MAX_BYTES,
      max_dimension: MAX_DIMENSION,
      initial_quality: INITIAL_QUALITY,
      min_quality: MIN_QUALITY,
      quality_step: QUALITY_STEP,
    }
  }
}

impl Normalizer {
  pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
    self.max_bytes = max_bytes;
    self
  }

  pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
    self.max_dimension = max_dimension.max(1);
    self
  }

  pub fn with_initial_quality(mut self, quality: u8) -> Self {
    self.initial_quality = quality.clamp(1, 100);
    self
  }

  pub fn max_bytes(&self) -> u64 {
    self.max_bytes
  }

  /// 无条件重新编码为 JPEG，按质量逐级下调直到满足目标大小
  pub fn normalize(&self, blob: &ImageBlob) -> Result<NormalizedImage, NormalizeError> {
    let input_mb = blob.size() as f64 / 1024.0 / 1024.0;
    info!(
      "压缩图像: {:.2} MB ({}) -> 目标 {:.2} MB",
      input_mb,
      blob.content_type,
      self.max_bytes as f64 / 1024.0 / 1024.0
    );

    let decoded = image::load_from_memory(&blob.bytes)?;
    let (source_width, source_height) = (decoded.width(), decoded.height());
    let rgb = self.fit_dimensions(decoded);
    let (width, height) = rgb.dimensions();

    let mut quality = self.initial_quality.max(self.min_quality);
    let bytes = loop {
      let bytes = encode_jpeg(&rgb, quality)?;
      debug!("质量 {} 编码结果: {} 字节", quality, bytes.len());
      if bytes.len() as u64 <= self.max_bytes || quality <= self.min_quality {
        break bytes;
      }
      quality = quality
        .saturating_sub(self.quality_step.max(1))
        .max(self.min_quality);
    };

    let within_target = bytes.len() as u64 <= self.max_bytes;
    if !within_target {
      warn!(
        "已降至最低质量 {} 仍超过目标大小: {} > {} 字节",
        quality,
        bytes.len(),
        self.max_bytes
      );
    }

    info!(
      "压缩完成: {:.2} MB, {}x{} -> {}x{}, 质量 {}",
      bytes.len() as f64 / 1024.0 / 1024.0,
      source_width,
      source_height,
      width,
      height,
      quality
    );

    Ok(NormalizedImage {
      blob: ImageBlob::new(bytes, MimeType::Jpeg.content_type()),
      width,
      height,
      source_width,
      source_height,
      quality,
      within_target,
    })
  }

  /// 在阻塞线程池中执行压缩，调用方语义不变
  pub async fn normalize_off_thread(
    &self,
    blob: ImageBlob,
  ) -> Result<NormalizedImage, NormalizeError> {
    let normalizer = self.clone();
    tokio::task::spawn_blocking(move || normalizer.normalize(&blob))
      .await
      .map_err(|e| NormalizeError::Worker(e.to_string()))?
  }

  fn fit_dimensions(&self, image: DynamicImage) -> RgbImage {
    if image.width().max(image.height()) > self.max_dimension {
      debug!(
        "缩放图像: {}x{} 超过最长边 {}",
        image.width(),
        image.height(),
        self.max_dimension
      );
      image
        .resize(self.max_dimension, self.max_dimension, FilterType::Triangle)
        .to_rgb8()
    } else {
      image.to_rgb8()
    }
  }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
  let mut buffer = Vec::new();
  let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
  image.write_with_encoder(encoder)?;
  Ok(buffer)
}
