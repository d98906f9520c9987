// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/output/draw.rs - 分析结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use imageproc::{
  drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
  },
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  model::AnalysisResult,
  overlay::{CalloutSide, OverlayItem, OverlayLayout, PixelRect, Point, Size},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: i32 = 6;
const OUTLINE_WIDTH: i32 = 4;
const BACKGROUND_COLOR: [u8; 3] = [0x11, 0x18, 0x27];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(String),
  #[error("画布参数无效: {0}")]
  InvalidCanvas(String),
}

/// 把图像按 contain 方式放进画布，再叠加边框与标签
pub struct Draw {
  canvas: Option<(u32, u32)>,
  font: Option<FontVec>,
  font_size: f32,
  outline_width: i32,
  background: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      canvas: None,
      font: None,
      font_size: LABEL_FONT_SIZE,
      outline_width: OUTLINE_WIDTH,
      background: BACKGROUND_COLOR,
    }
  }
}

impl Draw {
  /// 从 URL 查询参数读取 `width`、`height` 与 `font`
  pub fn from_query(url: &Url) -> Result<Self, DrawError> {
    let mut draw = Draw::default();
    let mut width = None;
    let mut height = None;

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "width" => width = Some(parse_dimension("width", &v)?),
        "height" => height = Some(parse_dimension("height", &v)?),
        "font" => draw.set_font_path(v.as_ref())?,
        _ => {}
      }
    }

    match (width, height) {
      (Some(w), Some(h)) => draw.canvas = Some((w, h)),
      (None, None) => {}
      _ => {
        return Err(DrawError::InvalidCanvas(
          "width 与 height 必须同时指定".to_string(),
        ));
      }
    }
    Ok(draw)
  }

  pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
    self.canvas = Some((width, height));
    self
  }

  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn set_font_path(&mut self, path: impl AsRef<Path>) -> Result<(), DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    info!("加载字体: {}", path.display());
    self.font = Some(font);
    Ok(())
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn render(&self, image: &RgbImage, result: &AnalysisResult) -> RgbImage {
    let (width, height) = self.canvas.unwrap_or(image.dimensions());
    let mut canvas = RgbImage::from_pixel(width, height, Rgb(self.background));

    let mut layout = OverlayLayout::new();
    let Some(geometry) = layout.update(
      Size::new(width as f64, height as f64),
      Size::new(image.width() as f64, image.height() as f64),
    ) else {
      warn!("图像或画布尺寸为 0，跳过绘制");
      return canvas;
    };

    let display_width = geometry.display_width.round().max(1.0) as u32;
    let display_height = geometry.display_height.round().max(1.0) as u32;
    if (display_width, display_height) == image.dimensions() {
      imageops::overlay(
        &mut canvas,
        image,
        geometry.offset_x.round() as i64,
        geometry.offset_y.round() as i64,
      );
    } else {
      let scaled = imageops::resize(image, display_width, display_height, FilterType::Triangle);
      imageops::overlay(
        &mut canvas,
        &scaled,
        geometry.offset_x.round() as i64,
        geometry.offset_y.round() as i64,
      );
    }

    let margin = self.clip_margin();
    let items: Vec<(OverlayItem, PixelRect)> = layout
      .instructions(&result.detections)
      .into_iter()
      .filter_map(|item| match clip_rect(&item.rect, width, height, margin) {
        Some(clipped) => Some((item, clipped)),
        None => {
          debug!("检测结果在画布外，跳过: {}. {}", item.index + 1, item.name);
          None
        }
      })
      .collect();
    debug!("绘制 {} 个检测结果", items.len());
    for (item, clipped) in items.iter() {
      self.draw_outline(&mut canvas, clipped, item.color());
    }
    // 标签统一画在边框之上
    for (item, _) in items.iter() {
      self.draw_callout(&mut canvas, item);
    }
    canvas
  }

  fn clip_margin(&self) -> f64 {
    (self.outline_width + 1) as f64
  }

  fn draw_outline(&self, canvas: &mut RgbImage, rect: &PixelRect, color: [u8; 3]) {
    let left = rect.left.round() as i32;
    let top = rect.top.round() as i32;
    let width = rect.width.round() as i32;
    let height = rect.height.round() as i32;

    for t in 0..self.outline_width {
      let w = width.saturating_sub(t.saturating_mul(2));
      let h = height.saturating_sub(t.saturating_mul(2));
      if w <= 0 || h <= 0 {
        break;
      }
      let r = Rect::at(left.saturating_add(t), top.saturating_add(t)).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(canvas, r, Rgb(color));
    }
  }

  fn label_text(item: &OverlayItem) -> String {
    format!("{}. {}（{}）", item.index + 1, item.name, item.risk_level.label())
  }

  fn label_size(&self, text: &str) -> (i32, i32) {
    match &self.font {
      Some(font) => {
        let (w, h) = text_size(PxScale::from(self.font_size), font, text);
        (w as i32, h as i32)
      }
      // 没有字体时按全角字符估算
      None => (
        (text.chars().count() as f32 * self.font_size) as i32,
        self.font_size as i32,
      ),
    }
  }

  fn draw_callout(&self, canvas: &mut RgbImage, item: &OverlayItem) {
    let text = Self::label_text(item);
    let (text_width, text_height) = self.label_size(&text);
    let panel = Size::new(
      (text_width + 2 * LABEL_PADDING) as f64,
      (text_height + 2 * LABEL_PADDING) as f64,
    );

    let edge = edge_point(&item.rect, item.anchor.side);
    let margin = self.clip_margin();
    let (width, height) = canvas.dimensions();
    draw_line_segment_mut(
      canvas,
      clip_point(item.anchor.point, width, height, margin),
      clip_point(edge, width, height, margin),
      Rgb(item.color()),
    );

    let Point { x, y } = item.anchor.place(panel);
    let (panel_width, panel_height) = (panel.width as i32, panel.height as i32);
    // 标签保持在画布内
    let x = (x.round() as i32).clamp(0, (canvas.width() as i32 - panel_width).max(0));
    let y = (y.round() as i32).clamp(0, (canvas.height() as i32 - panel_height).max(0));

    let r = Rect::at(x, y).of_size(panel_width.max(1) as u32, panel_height.max(1) as u32);
    draw_filled_rect_mut(canvas, r, Rgb(item.color()));

    if let Some(font) = &self.font {
      draw_text_mut(
        canvas,
        Rgb(TEXT_COLOR),
        x + LABEL_PADDING,
        y + LABEL_PADDING,
        PxScale::from(self.font_size),
        font,
        &text,
      );
    }
  }
}

/// 边框上与标签方位对应的边中点
fn edge_point(rect: &PixelRect, side: CalloutSide) -> Point {
  match side {
    CalloutSide::Top => Point {
      x: rect.center_x(),
      y: rect.top,
    },
    CalloutSide::Bottom => Point {
      x: rect.center_x(),
      y: rect.bottom(),
    },
    CalloutSide::Right => Point {
      x: rect.right(),
      y: rect.center_y(),
    },
    CalloutSide::Left => Point {
      x: rect.left,
      y: rect.center_y(),
    },
  }
}

/// 把矩形裁到画布外扩 `margin` 的范围内，完全不可见时返回 None
fn clip_rect(rect: &PixelRect, width: u32, height: u32, margin: f64) -> Option<PixelRect> {
  let (min_x, min_y) = (-margin, -margin);
  let (max_x, max_y) = (width as f64 + margin, height as f64 + margin);

  let left = rect.left.max(min_x);
  let top = rect.top.max(min_y);
  let right = rect.right().min(max_x);
  let bottom = rect.bottom().min(max_y);
  // NaN 比较为 false，同样视为不可见
  if !(left < right && top < bottom) {
    return None;
  }

  Some(PixelRect {
    left,
    top,
    width: right - left,
    height: bottom - top,
  })
}

/// 引线端点限制在画布外扩范围内，引线总是水平或竖直，裁剪不改变方向
fn clip_point(point: Point, width: u32, height: u32, margin: f64) -> (f32, f32) {
  let x = point.x.clamp(-margin, width as f64 + margin);
  let y = point.y.clamp(-margin, height as f64 + margin);
  (x as f32, y as f32)
}

fn parse_dimension(name: &str, value: &str) -> Result<u32, DrawError> {
  match value.parse::<u32>() {
    Ok(v) if v > 0 => Ok(v),
    _ => Err(DrawError::InvalidCanvas(format!("{}={}", name, value))),
  }
}
