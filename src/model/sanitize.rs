// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/model/sanitize.rs - 视觉模型回复的解析与校验
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

use serde_json::Value;
use tracing::{error, warn};

use super::{BoundingBox, Detection, ResultPayload, RiskLevel};

const REQUIRED_FIELDS: [&str; 4] = ["name", "bbox", "risk_level", "description"];
const BBOX_FIELDS: [&str; 4] = ["x", "y", "width", "height"];
const MAX_DESCRIPTION_CHARS: usize = 100;
const TRUNCATED_DESCRIPTION_CHARS: usize = 97;

/// 去掉 markdown 代码块包裹，返回其中的 JSON 文本
fn strip_code_fence(text: &str) -> &str {
  if let Some((_, rest)) = text.split_once("```json") {
    rest.split("```").next().unwrap_or(rest).trim()
  } else if let Some((_, rest)) = text.split_once("```") {
    rest.split("```").next().unwrap_or(rest).trim()
  } else {
    text.trim()
  }
}

fn parse_bbox(value: &Value) -> Option<BoundingBox> {
  let mut coords = [0f64; 4];
  for (slot, field) in coords.iter_mut().zip(BBOX_FIELDS) {
    let v = value.get(field)?.as_f64()?;
    if !(0.0..=100.0).contains(&v) {
      return None;
    }
    *slot = v;
  }
  Some(BoundingBox::new(coords[0], coords[1], coords[2], coords[3]))
}

fn truncate_description(description: &str) -> String {
  if description.chars().count() > MAX_DESCRIPTION_CHARS {
    warn!("说明过长: {} 字符", description.chars().count());
    let mut truncated: String = description.chars().take(TRUNCATED_DESCRIPTION_CHARS).collect();
    truncated.push_str("...");
    truncated
  } else {
    description.to_string()
  }
}

fn sanitize_item(item: &Value) -> Option<Detection> {
  if !REQUIRED_FIELDS.iter().all(|f| item.get(f).is_some()) {
    warn!("缺少必需字段: {}", item);
    return None;
  }

  let Some(bbox) = parse_bbox(&item["bbox"]) else {
    warn!("边界框无效或越界: {}", item["bbox"]);
    return None;
  };

  let risk_level = match item["risk_level"].as_str() {
    Some(s) => RiskLevel::from_label_str(s),
    None => RiskLevel::Unknown,
  };
  if risk_level == RiskLevel::Unknown && item["risk_level"].as_str() != Some("UNKNOWN") {
    warn!("无效的风险等级: {}", item["risk_level"]);
  }

  let name = item["name"].as_str().map(str::to_string).unwrap_or_else(|| item["name"].to_string());
  let description = truncate_description(item["description"].as_str().unwrap_or_default());

  Some(Detection {
    name,
    bbox,
    risk_level,
    description,
  })
}

/// 将视觉模型的文本回复整理为检测结果，无法解析时返回空列表
pub fn sanitize_model_reply(text: &str) -> ResultPayload {
  let content = strip_code_fence(text);

  let value: Value = match serde_json::from_str(content) {
    Ok(value) => value,
    Err(e) => {
      error!("JSON 解析错误: {}, 内容: {}", e, content);
      return ResultPayload::default();
    }
  };

  let Some(items) = value.get("equipment").and_then(Value::as_array) else {
    warn!("未找到 equipment 数组");
    return ResultPayload::default();
  };

  ResultPayload {
    equipment: items.iter().filter_map(sanitize_item).collect(),
  }
}
