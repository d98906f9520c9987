// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/overlay.rs - 检测结果叠加层的几何计算
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

use tracing::debug;

use crate::model::{BoundingBox, Detection, RiskLevel};

/// 标签与边框之间的固定间距（像素）
pub const CALLOUT_CLEARANCE: f64 = 20.0;
/// 上下放置阈值（百分比坐标）
const VERTICAL_MARGIN_THRESHOLD: f64 = 30.0;
/// 左右放置阈值（百分比坐标）
const HORIZONTAL_MARGIN_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
  pub width: f64,
  pub height: f64,
}

impl Size {
  pub fn new(width: f64, height: f64) -> Self {
    Self { width, height }
  }

  pub fn is_empty(&self) -> bool {
    !(self.width > 0.0 && self.height > 0.0)
  }
}

/// 图像在容器中按 contain 方式显示时的尺寸与留边
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderGeometry {
  pub display_width: f64,
  pub display_height: f64,
  pub offset_x: f64,
  pub offset_y: f64,
}

/// 计算 contain 缩放；图像尚未加载（原始尺寸为 0）时返回 None
pub fn contain_fit(container: Size, natural: Size) -> Option<RenderGeometry> {
  if natural.is_empty() || container.is_empty() {
    return None;
  }

  let image_aspect = natural.width / natural.height;
  let container_aspect = container.width / container.height;

  let geometry = if image_aspect > container_aspect {
    let display_height = container.width / image_aspect;
    RenderGeometry {
      display_width: container.width,
      display_height,
      offset_x: 0.0,
      offset_y: (container.height - display_height) / 2.0,
    }
  } else {
    let display_width = container.height * image_aspect;
    RenderGeometry {
      display_width,
      display_height: container.height,
      offset_x: (container.width - display_width) / 2.0,
      offset_y: 0.0,
    }
  };
  Some(geometry)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
  pub left: f64,
  pub top: f64,
  pub width: f64,
  pub height: f64,
}

impl PixelRect {
  pub fn right(&self) -> f64 {
    self.left + self.width
  }

  pub fn bottom(&self) -> f64 {
    self.top + self.height
  }

  pub fn center_x(&self) -> f64 {
    self.left + self.width / 2.0
  }

  pub fn center_y(&self) -> f64 {
    self.top + self.height / 2.0
  }
}

/// 百分比边界框映射到容器像素坐标，不做范围校验
pub fn map_bbox(geometry: &RenderGeometry, bbox: &BoundingBox) -> PixelRect {
  PixelRect {
    left: geometry.offset_x + (bbox.x / 100.0) * geometry.display_width,
    top: geometry.offset_y + (bbox.y / 100.0) * geometry.display_height,
    width: (bbox.width / 100.0) * geometry.display_width,
    height: (bbox.height / 100.0) * geometry.display_height,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalloutSide {
  Top,
  Right,
  Bottom,
  Left,
}

/// 按固定优先级为单个检测选择标签方位，不考虑其他检测
pub fn choose_callout_side(bbox: &BoundingBox) -> CalloutSide {
  let top_margin = bbox.y;
  let bottom_margin = 100.0 - bbox.bottom();
  let left_margin = bbox.x;
  let right_margin = 100.0 - bbox.right();

  if top_margin > VERTICAL_MARGIN_THRESHOLD {
    CalloutSide::Top
  } else if bottom_margin > VERTICAL_MARGIN_THRESHOLD {
    CalloutSide::Bottom
  } else if right_margin > left_margin && right_margin > HORIZONTAL_MARGIN_THRESHOLD {
    CalloutSide::Right
  } else if left_margin > HORIZONTAL_MARGIN_THRESHOLD {
    CalloutSide::Left
  } else {
    CalloutSide::Top
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

/// 标签锚点：标签的对应边中点对齐到此处
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalloutAnchor {
  pub side: CalloutSide,
  pub point: Point,
}

impl CalloutAnchor {
  /// 给定标签尺寸，求标签左上角位置
  pub fn place(&self, callout: Size) -> Point {
    let Point { x, y } = self.point;
    match self.side {
      CalloutSide::Top => Point {
        x: x - callout.width / 2.0,
        y: y - callout.height,
      },
      CalloutSide::Bottom => Point {
        x: x - callout.width / 2.0,
        y,
      },
      CalloutSide::Right => Point {
        x,
        y: y - callout.height / 2.0,
      },
      CalloutSide::Left => Point {
        x: x - callout.width,
        y: y - callout.height / 2.0,
      },
    }
  }
}

pub fn callout_anchor(rect: &PixelRect, side: CalloutSide) -> CalloutAnchor {
  let point = match side {
    CalloutSide::Top => Point {
      x: rect.center_x(),
      y: rect.top - CALLOUT_CLEARANCE,
    },
    CalloutSide::Bottom => Point {
      x: rect.center_x(),
      y: rect.bottom() + CALLOUT_CLEARANCE,
    },
    CalloutSide::Right => Point {
      x: rect.right() + CALLOUT_CLEARANCE,
      y: rect.center_y(),
    },
    CalloutSide::Left => Point {
      x: rect.left - CALLOUT_CLEARANCE,
      y: rect.center_y(),
    },
  };
  CalloutAnchor { side, point }
}

/// 单个检测的绘制指令
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
  pub index: usize,
  pub name: String,
  pub risk_level: RiskLevel,
  pub rect: PixelRect,
  pub anchor: CalloutAnchor,
}

impl OverlayItem {
  pub fn color(&self) -> [u8; 3] {
    self.risk_level.color()
  }
}

/// 缓存当前显示几何；仅在容器或图像尺寸变化时重算
#[derive(Debug, Clone, Default)]
pub struct OverlayLayout {
  container: Option<Size>,
  geometry: Option<RenderGeometry>,
}

impl OverlayLayout {
  pub fn new() -> Self {
    Self::default()
  }

  /// 原始尺寸为 0 时保留上一次的结果
  pub fn update(&mut self, container: Size, natural: Size) -> Option<RenderGeometry> {
    self.container = Some(container);
    match contain_fit(container, natural) {
      Some(geometry) => {
        debug!(
          "更新显示几何: {:.1}x{:.1} 偏移 ({:.1}, {:.1})",
          geometry.display_width, geometry.display_height, geometry.offset_x, geometry.offset_y
        );
        self.geometry = Some(geometry);
      }
      None => debug!("图像尺寸未知，保留之前的显示几何"),
    }
    self.geometry
  }

  pub fn geometry(&self) -> Option<RenderGeometry> {
    self.geometry
  }

  pub fn container(&self) -> Option<Size> {
    self.container
  }

  /// 尚无几何时不产生任何绘制指令
  pub fn instructions(&self, detections: &[Detection]) -> Vec<OverlayItem> {
    let Some(geometry) = self.geometry else {
      return Vec::new();
    };

    detections
      .iter()
      .enumerate()
      .map(|(index, detection)| {
        let rect = map_bbox(&geometry, &detection.bbox);
        let side = choose_callout_side(&detection.bbox);
        OverlayItem {
          index,
          name: detection.name.clone(),
          risk_level: detection.risk_level,
          rect,
          anchor: callout_anchor(&rect, side),
        }
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f64 = 1e-9;

  fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < EPS
  }

  #[test]
  fn wide_image_in_4_3_container_letterboxes_vertically() {
    let g = contain_fit(Size::new(800.0, 600.0), Size::new(1920.0, 1080.0)).unwrap();
    assert!(approx(g.display_width, 800.0));
    assert!(approx(g.display_height, 450.0));
    assert!(approx(g.offset_x, 0.0));
    assert!(g.offset_y > 0.0);
    assert!(approx(g.offset_y, 75.0));
  }

  #[test]
  fn square_image_in_16_9_container_pillarboxes() {
    let g = contain_fit(Size::new(1600.0, 900.0), Size::new(500.0, 500.0)).unwrap();
    assert!(approx(g.display_height, 900.0));
    assert!(approx(g.display_width, 900.0));
    assert!(approx(g.offset_x, 350.0));
    assert!(approx(g.offset_y, 0.0));
  }

  #[test]
  fn equal_aspect_fills_container() {
    let g = contain_fit(Size::new(400.0, 300.0), Size::new(800.0, 600.0)).unwrap();
    assert_eq!(
      g,
      RenderGeometry {
        display_width: 400.0,
        display_height: 300.0,
        offset_x: 0.0,
        offset_y: 0.0
      }
    );
  }

  #[test]
  fn unloaded_image_keeps_previous_geometry() {
    let mut layout = OverlayLayout::new();
    let first = layout
      .update(Size::new(800.0, 600.0), Size::new(1600.0, 1200.0))
      .unwrap();
    let kept = layout.update(Size::new(1024.0, 768.0), Size::new(0.0, 0.0));
    assert_eq!(kept, Some(first));

    let mut fresh = OverlayLayout::new();
    assert_eq!(fresh.update(Size::new(800.0, 600.0), Size::new(0.0, 10.0)), None);
    assert!(fresh.instructions(&[]).is_empty());
  }

  #[test]
  fn bbox_maps_to_pixels() {
    let geometry = RenderGeometry {
      display_width: 1000.0,
      display_height: 500.0,
      offset_x: 0.0,
      offset_y: 100.0,
    };
    let rect = map_bbox(&geometry, &BoundingBox::new(10.0, 20.0, 30.0, 40.0));
    assert!(approx(rect.left, 100.0));
    assert!(approx(rect.top, 200.0));
    assert!(approx(rect.width, 300.0));
    assert!(approx(rect.height, 200.0));
  }

  #[test]
  fn out_of_range_boxes_are_not_clamped() {
    let geometry = RenderGeometry {
      display_width: 100.0,
      display_height: 100.0,
      offset_x: 0.0,
      offset_y: 0.0,
    };
    let rect = map_bbox(&geometry, &BoundingBox::new(-10.0, 90.0, 30.0, 40.0));
    assert!(approx(rect.left, -10.0));
    assert!(approx(rect.bottom(), 130.0));
  }

  #[test]
  fn callout_side_priority() {
    // 上方留白 35% > 30%
    assert_eq!(
      choose_callout_side(&BoundingBox::new(10.0, 35.0, 20.0, 20.0)),
      CalloutSide::Top
    );
    // 上方 5%，下方 85%
    assert_eq!(
      choose_callout_side(&BoundingBox::new(10.0, 5.0, 20.0, 10.0)),
      CalloutSide::Bottom
    );
    // 上 5%、下 5%、左 5%、右 5%：全部落空，默认 top
    assert_eq!(
      choose_callout_side(&BoundingBox::new(5.0, 5.0, 90.0, 90.0)),
      CalloutSide::Top
    );
    // 上 10%、下 10%、左 5%、右 45%
    assert_eq!(
      choose_callout_side(&BoundingBox::new(5.0, 10.0, 50.0, 80.0)),
      CalloutSide::Right
    );
    // 上 10%、下 10%、左 45%、右 5%
    assert_eq!(
      choose_callout_side(&BoundingBox::new(45.0, 10.0, 50.0, 80.0)),
      CalloutSide::Left
    );
  }

  #[test]
  fn thresholds_are_strict() {
    // 恰好 30% 不算足够
    assert_eq!(
      choose_callout_side(&BoundingBox::new(0.0, 30.0, 100.0, 40.0)),
      CalloutSide::Top
    );
    assert_eq!(
      choose_callout_side(&BoundingBox::new(0.0, 30.0, 100.0, 45.0)),
      CalloutSide::Top
    );
    // 左右恰好 20% 也不够
    assert_eq!(
      choose_callout_side(&BoundingBox::new(20.0, 10.0, 60.0, 80.0)),
      CalloutSide::Top
    );
  }

  #[test]
  fn anchors_sit_outside_the_box() {
    let rect = PixelRect {
      left: 100.0,
      top: 200.0,
      width: 300.0,
      height: 100.0,
    };
    let top = callout_anchor(&rect, CalloutSide::Top);
    assert_eq!(top.point, Point { x: 250.0, y: 180.0 });
    let bottom = callout_anchor(&rect, CalloutSide::Bottom);
    assert_eq!(bottom.point, Point { x: 250.0, y: 320.0 });
    let right = callout_anchor(&rect, CalloutSide::Right);
    assert_eq!(right.point, Point { x: 420.0, y: 250.0 });
    let left = callout_anchor(&rect, CalloutSide::Left);
    assert_eq!(left.point, Point { x: 80.0, y: 250.0 });
  }

  #[test]
  fn placement_aligns_matching_edge() {
    let callout = Size::new(60.0, 20.0);
    let anchor = CalloutAnchor {
      side: CalloutSide::Top,
      point: Point { x: 250.0, y: 180.0 },
    };
    assert_eq!(anchor.place(callout), Point { x: 220.0, y: 160.0 });

    let anchor = CalloutAnchor {
      side: CalloutSide::Left,
      point: Point { x: 80.0, y: 250.0 },
    };
    assert_eq!(anchor.place(callout), Point { x: 20.0, y: 240.0 });
  }

  #[test]
  fn instructions_follow_detection_order() {
    let mut layout = OverlayLayout::new();
    layout.update(Size::new(1000.0, 500.0), Size::new(2000.0, 1000.0));
    let detections = vec![
      Detection {
        name: "ミキサー".into(),
        bbox: BoundingBox::new(10.0, 40.0, 20.0, 20.0),
        risk_level: RiskLevel::Danger,
        description: String::new(),
      },
      Detection {
        name: "ケーブル".into(),
        bbox: BoundingBox::new(60.0, 5.0, 10.0, 10.0),
        risk_level: RiskLevel::Warning,
        description: String::new(),
      },
    ];
    let items = layout.instructions(&detections);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].index, 0);
    assert_eq!(items[0].anchor.side, CalloutSide::Top);
    assert_eq!(items[1].anchor.side, CalloutSide::Bottom);
    assert_eq!(items[1].color(), RiskLevel::Warning.color());
  }
}
