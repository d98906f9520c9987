// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/bin/overlay_preview.rs - 离线预览叠加效果
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use kyokucho::{
  FromUrl,
  model::{AnalysisResult, sanitize_model_reply},
  output::{OutputWrapper, Render},
  overlay::{OverlayLayout, Size},
};
use tracing::{info, warn};

/// 不经过服务端，把已有的分析结果叠加到图像上
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 原始图像文件
  #[arg(long, value_name = "IMAGE")]
  pub image: PathBuf,
  /// 分析结果：AnalysisResult JSON，或模型原始回复
  #[arg(long, value_name = "RESULT")]
  pub result: PathBuf,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn load_result(path: &PathBuf) -> Result<AnalysisResult> {
  let text = std::fs::read_to_string(path)?;
  if let Ok(result) = serde_json::from_str::<AnalysisResult>(&text) {
    return Ok(result);
  }

  warn!("不是 AnalysisResult 格式，按模型回复解析: {}", path.display());
  let payload = sanitize_model_reply(&text);
  Ok(AnalysisResult::completed(
    path.display().to_string(),
    payload.equipment,
  ))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("图像: {}", args.image.display());
  info!("分析结果: {}", args.result.display());
  info!("输出路径: {}", args.output);

  let frame = image::open(&args.image)?.to_rgb8();
  let result = load_result(&args.result)?;

  let mut layout = OverlayLayout::new();
  let natural = Size::new(frame.width() as f64, frame.height() as f64);
  layout.update(natural, natural);
  for item in layout.instructions(&result.detections) {
    info!(
      "{}. {} {} -> {:?} ({:.0}, {:.0})",
      item.index + 1,
      item.name,
      item.risk_level,
      item.anchor.side,
      item.anchor.point.x,
      item.anchor.point.y
    );
  }

  let mut output = OutputWrapper::from_url(&args.output)?;
  if let Some(font) = &args.font {
    output.set_default_font(font)?;
  }
  output.render_result(&frame, &result)?;

  Ok(())
}
