// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/model/wire.rs - 接口报文格式
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

use serde::{Deserialize, Deserializer, Serialize};

use super::Detection;

/// 凭证请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
  pub content_type: String,
}

/// 短期写入凭证：预签名地址与存储键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredential {
  pub upload_url: String,
  pub key: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultPayload {
  #[serde(default, deserialize_with = "null_as_empty")]
  pub equipment: Vec<Detection>,
}

/// `null` 与缺失字段一样视为空列表
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Detection>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<Vec<Detection>>::deserialize(deserializer)?.unwrap_or_default())
}

/// 结果字段可能是结构化 JSON，也可能是编码后的 JSON 字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordPayload {
  Structured(ResultPayload),
  Encoded(String),
}

impl RecordPayload {
  pub fn decode(self) -> Result<ResultPayload, serde_json::Error> {
    match self {
      RecordPayload::Structured(payload) => Ok(payload),
      RecordPayload::Encoded(text) => serde_json::from_str(&text),
    }
  }
}

fn either_payload<'de, D>(deserializer: D) -> Result<ResultPayload, D::Error>
where
  D: Deserializer<'de>,
{
  RecordPayload::deserialize(deserializer)?
    .decode()
    .map_err(serde::de::Error::custom)
}

/// 结果存储中读回的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
  pub image_key: String,
  pub result: RecordPayload,
  #[serde(default)]
  pub ttl: Option<i64>,
  #[serde(default)]
  pub created_at: Option<i64>,
}

/// 状态查询接口的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
  Processing,
  Completed {
    #[serde(deserialize_with = "either_payload")]
    result: ResultPayload,
  },
  Failed {
    #[serde(default)]
    error: Option<String>,
  },
}

impl StatusResponse {
  /// 由结果存储的查询结果推导状态：记录不存在即视为处理中
  pub fn from_record(record: Option<ResultRecord>) -> Result<Self, serde_json::Error> {
    match record {
      None => Ok(StatusResponse::Processing),
      Some(record) => Ok(StatusResponse::Completed {
        result: record.result.decode()?,
      }),
    }
  }

  pub fn is_terminal(&self) -> bool {
    !matches!(self, StatusResponse::Processing)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RiskLevel;

  const PAYLOAD: &str = r#"{"equipment":[{"name":"ケーブル","bbox":{"x":10,"y":20,"width":30,"height":40},"risk_level":"WARNING","description":"不明なケーブル"}]}"#;

  #[test]
  fn status_shapes_parse() {
    let processing: StatusResponse = serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
    assert_eq!(processing, StatusResponse::Processing);

    let failed: StatusResponse =
      serde_json::from_str(r#"{"status":"failed","error":"model error"}"#).unwrap();
    assert_eq!(
      failed,
      StatusResponse::Failed {
        error: Some("model error".into())
      }
    );

    let completed: StatusResponse =
      serde_json::from_str(&format!(r#"{{"status":"completed","result":{}}}"#, PAYLOAD)).unwrap();
    match completed {
      StatusResponse::Completed { result } => {
        assert_eq!(result.equipment.len(), 1);
        assert_eq!(result.equipment[0].risk_level, RiskLevel::Warning);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn completed_tolerates_string_encoded_result() {
    let encoded = serde_json::to_string(PAYLOAD).unwrap();
    let body = format!(r#"{{"status":"completed","result":{}}}"#, encoded);
    let parsed: StatusResponse = serde_json::from_str(&body).unwrap();
    assert!(matches!(parsed, StatusResponse::Completed { ref result } if result.equipment.len() == 1));
  }

  #[test]
  fn record_in_both_encodings_yields_same_status() {
    let structured: ResultRecord = serde_json::from_str(&format!(
      r#"{{"imageKey":"uploads/1-a.jpg","result":{},"ttl":1}}"#,
      PAYLOAD
    ))
    .unwrap();
    let encoded: ResultRecord = serde_json::from_str(&format!(
      r#"{{"imageKey":"uploads/1-a.jpg","result":{},"ttl":1}}"#,
      serde_json::to_string(PAYLOAD).unwrap()
    ))
    .unwrap();

    let a = StatusResponse::from_record(Some(structured)).unwrap();
    let b = StatusResponse::from_record(Some(encoded)).unwrap();
    assert_eq!(a, b);
    assert!(a.is_terminal());
  }

  #[test]
  fn null_or_missing_equipment_is_empty_completion() {
    for body in [
      r#"{"status":"completed","result":{"equipment":null}}"#,
      r#"{"status":"completed","result":{}}"#,
      r#"{"status":"completed","result":"{\"equipment\":null}"}"#,
    ] {
      let parsed: StatusResponse = serde_json::from_str(body).unwrap();
      assert_eq!(
        parsed,
        StatusResponse::Completed {
          result: ResultPayload::default()
        },
        "{}",
        body
      );
    }
  }

  #[test]
  fn absent_record_is_processing() {
    let status = StatusResponse::from_record(None).unwrap();
    assert_eq!(status, StatusResponse::Processing);
    assert!(!status.is_terminal());
  }

  #[test]
  fn credential_uses_camel_case() {
    let credential: UploadCredential =
      serde_json::from_str(r#"{"uploadUrl":"https://bucket/put","key":"uploads/k.jpg"}"#).unwrap();
    assert_eq!(credential.key, "uploads/k.jpg");
    let body = serde_json::to_string(&CredentialRequest {
      content_type: "image/jpeg".into(),
    })
    .unwrap();
    assert_eq!(body, r#"{"contentType":"image/jpeg"}"#);
  }
}
