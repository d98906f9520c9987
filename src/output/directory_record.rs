// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{Datelike, Utc};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  model::AnalysisResult,
  output::{
    Render,
    draw::{Draw, DrawError},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("绘制参数错误: {0}")]
  DrawError(#[from] DrawError),
}

/// draw 模式保存叠加图；record 模式保存原图，两者都附带 JSON 结果
pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record,
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &RgbImage,
    result: &AnalysisResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => draw.render(frame, result).save(path)?,
      DrawWrapper::Record => frame.save(path)?,
    };

    let json = serde_json::to_vec_pretty(result)?;
    std::fs::write(path.with_extension("json"), json)?;
    Ok(())
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let draw = if record {
      DrawWrapper::Record
    } else {
      DrawWrapper::Draw(Box::new(Draw::from_query(uri)?))
    };

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn draw_mut(&mut self) -> Option<&mut Draw> {
    match &mut self.draw {
      DrawWrapper::Draw(draw) => Some(draw.as_mut()),
      DrawWrapper::Record => None,
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, AnalysisResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &AnalysisResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("结果为空，跳过记录: {}", result.image_key);
      return Ok(());
    }

    let path = self.frame_path()?;
    self.draw.save_result(&path, frame, result)?;
    info!("记录结果到: {}", path.display());
    Ok(())
  }
}
