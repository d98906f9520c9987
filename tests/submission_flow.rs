// 该文件是 Kyokucho （技术局长） 项目的一部分。
// tests/submission_flow.rs - 提交流程与状态机的端到端测试
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

use std::cell::RefCell;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use kyokucho::{
  Config, ErrorKind,
  config::ConfigKey,
  input::{ImageFileInput, validate},
  model::{
    AnalysisResult, BoundingBox, Detection, ImageBlob, ResultPayload, RiskLevel, StatusResponse,
    UploadCredential,
  },
  output::Render,
  state::{Controller, Phase},
  submit::{AnalysisApi, CancelHandle, PollPolicy, ProgressFn, SubmissionClient, SubmitError},
  task::{AnalyzeTask, Task},
};

const MIB: usize = 1024 * 1024;

/// 按脚本应答的远端服务，同时记录调用顺序
struct ScriptedApi {
  processing_rounds: u32,
  polls: Mutex<u32>,
  log: Mutex<Vec<String>>,
}

impl ScriptedApi {
  fn completing_after(processing_rounds: u32) -> Self {
    Self {
      processing_rounds,
      polls: Mutex::new(0),
      log: Mutex::new(Vec::new()),
    }
  }

  fn log(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }
}

fn three_detections() -> Vec<Detection> {
  vec![
    Detection {
      name: "音声ミキサー".into(),
      bbox: BoundingBox::new(10.0, 40.0, 30.0, 20.0),
      risk_level: RiskLevel::Warning,
      description: "フェーダー操作は担当者のみ".into(),
    },
    Detection {
      name: "電源分配盤".into(),
      bbox: BoundingBox::new(60.0, 5.0, 20.0, 15.0),
      risk_level: RiskLevel::Danger,
      description: "触らないでください".into(),
    },
    Detection {
      name: "モニター".into(),
      bbox: BoundingBox::new(40.0, 70.0, 20.0, 20.0),
      risk_level: RiskLevel::Safe,
      description: String::new(),
    },
  ]
}

impl AnalysisApi for ScriptedApi {
  async fn request_credential(&self, content_type: &str) -> Result<UploadCredential, SubmitError> {
    self.log.lock().unwrap().push(format!("credential {}", content_type));
    Ok(UploadCredential {
      upload_url: "https://storage.example/put".into(),
      key: "uploads/1700000000000-test.jpg".into(),
    })
  }

  async fn upload(
    &self,
    credential: &UploadCredential,
    image: &ImageBlob,
    progress: ProgressFn,
    cancel: &CancelHandle,
  ) -> Result<(), SubmitError> {
    for step in 1..=4 {
      if cancel.is_cancelled() {
        return Err(SubmitError::UploadCancelled);
      }
      progress(step as f64 * 25.0);
      tokio::task::yield_now().await;
    }
    self
      .log
      .lock()
      .unwrap()
      .push(format!("upload {} {}", credential.key, image.size()));
    Ok(())
  }

  async fn query_status(&self, key: &str) -> Result<StatusResponse, SubmitError> {
    let mut polls = self.polls.lock().unwrap();
    *polls += 1;
    self.log.lock().unwrap().push(format!("poll {}", key));
    if *polls > self.processing_rounds {
      Ok(StatusResponse::Completed {
        result: ResultPayload {
          equipment: three_detections(),
        },
      })
    } else {
      Ok(StatusResponse::Processing)
    }
  }
}

fn client(api: ScriptedApi, max_attempts: u32) -> SubmissionClient<ScriptedApi> {
  SubmissionClient::new(api).with_poll_policy(PollPolicy {
    interval: Duration::from_millis(1),
    max_attempts,
    ..PollPolicy::default()
  })
}

fn two_megabyte_jpeg() -> ImageBlob {
  let mut bytes = vec![0u8; 2 * MIB];
  bytes[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
  ImageBlob::new(bytes, "image/jpeg")
}

fn config() -> Config {
  Config::from_lookup(|key| match key {
    ConfigKey::ApiBase => Some("https://kyokucho.example".to_string()),
    _ => None,
  })
  .unwrap()
}

#[tokio::test]
async fn idle_to_completed_step_by_step() {
  let image = two_megabyte_jpeg();
  validate(&image, 10 * MIB as u64).unwrap();

  let mut controller: Controller = Controller::default();
  assert_eq!(controller.phase(), Phase::Idle);

  controller.select_image(image.clone()).unwrap();
  assert_eq!(controller.phase(), Phase::Preview);

  let confirmed = controller.confirm().unwrap();
  assert_eq!(controller.phase(), Phase::Uploading);

  let client = client(ScriptedApi::completing_after(2), 30);
  let credential = client
    .api()
    .request_credential(&confirmed.content_type)
    .await
    .unwrap();

  let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  client
    .api()
    .upload(
      &credential,
      &confirmed,
      kyokucho::submit::progress_fn(move |p| sink.lock().unwrap().push(p)),
      &CancelHandle::default(),
    )
    .await
    .unwrap();
  for p in seen.lock().unwrap().iter() {
    controller.on_progress(*p).unwrap();
  }
  assert_eq!(controller.phase(), Phase::Analyzing);

  let result = client.poll_result(&credential.key).await.unwrap();
  controller.complete(result).unwrap();
  assert_eq!(controller.phase(), Phase::Completed);
  assert_eq!(controller.detection_count(), Some(3));
}

#[tokio::test]
async fn run_submission_completes_with_three_detections() {
  let mut controller: Controller = Controller::default();
  controller.select_image(two_megabyte_jpeg()).unwrap();

  let client = client(ScriptedApi::completing_after(29), 30);
  let phase = controller
    .run_submission(&client, &CancelHandle::default())
    .await
    .unwrap();

  assert_eq!(phase, Phase::Completed);
  assert_eq!(controller.detection_count(), Some(3));
  assert_eq!(controller.progress(), Some(100.0));

  // 凭证 -> 上传 -> 轮询，严格按顺序
  let log = client.api().log();
  assert_eq!(log[0], "credential image/jpeg");
  assert_eq!(
    log[1],
    format!("upload uploads/1700000000000-test.jpg {}", 2 * MIB)
  );
  assert_eq!(log.len(), 2 + 30);
  assert!(log[2..].iter().all(|entry| entry.starts_with("poll ")));
}

#[tokio::test]
async fn timeout_lands_in_error_and_retry_keeps_image() {
  let mut controller: Controller = Controller::default();
  controller.select_image(two_megabyte_jpeg()).unwrap();

  let client = client(ScriptedApi::completing_after(u32::MAX), 30);
  let phase = controller
    .run_submission(&client, &CancelHandle::default())
    .await
    .unwrap();

  assert_eq!(phase, Phase::Error);
  let report = controller.error().unwrap();
  assert_eq!(report.kind, ErrorKind::Timeout);
  assert_eq!(report.kind.icon(), "⏱️");
  assert_eq!(client.api().log().len(), 2 + 30);

  assert_eq!(controller.retry(), Ok(Phase::Preview));
  assert_eq!(controller.selection().unwrap().image, two_megabyte_jpeg());
}

#[tokio::test]
async fn cancelled_upload_is_reported_as_cancellation() {
  let mut controller: Controller = Controller::default();
  controller.select_image(two_megabyte_jpeg()).unwrap();

  let cancel = CancelHandle::default();
  cancel.cancel();
  let client = client(ScriptedApi::completing_after(0), 30);
  let phase = controller.run_submission(&client, &cancel).await.unwrap();

  assert_eq!(phase, Phase::Error);
  assert_eq!(controller.error().unwrap().kind, ErrorKind::Cancelled);
  // 上传失败后不会开始轮询
  assert!(client.api().log().iter().all(|e| !e.starts_with("poll")));
}

/// 只记录渲染调用的输出
#[derive(Default)]
struct RecordingOutput {
  rendered: RefCell<Vec<((u32, u32), usize)>>,
}

impl Render<RgbImage, AnalysisResult> for RecordingOutput {
  type Error = std::io::Error;

  fn render_result(&self, frame: &RgbImage, result: &AnalysisResult) -> Result<(), Self::Error> {
    self
      .rendered
      .borrow_mut()
      .push((frame.dimensions(), result.len()));
    Ok(())
  }
}

fn write_png(dir: &std::path::Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
  let image = RgbImage::from_fn(width, height, |x, y| {
    Rgb([(x % 256) as u8, (y % 256) as u8, 128])
  });
  let mut cursor = Cursor::new(Vec::new());
  image.write_to(&mut cursor, ImageFormat::Png).unwrap();
  let path = dir.join(name);
  std::fs::write(&path, cursor.into_inner()).unwrap();
  path
}

#[tokio::test]
async fn analyze_task_renders_completed_result() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_png(dir.path(), "studio.png", 320, 180);

  let input = ImageFileInput::open(&path).unwrap();
  let output = RecordingOutput::default();
  let client = client(ScriptedApi::completing_after(1), 30);

  let mut task = AnalyzeTask::new(&config());
  let result = task.run_task(input, &client, &output).await.unwrap();

  assert_eq!(result.len(), 3);
  assert_eq!(task.controller().phase(), Phase::Completed);
  assert_eq!(*output.rendered.borrow(), vec![((320, 180), 3)]);
  // 上传的是压缩后的 JPEG
  assert_eq!(client.api().log()[0], "credential image/jpeg");
}

#[tokio::test]
async fn analyze_task_rejects_unsupported_format_before_upload() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("notes.txt");
  std::fs::write(&path, b"not an image").unwrap();

  let input = ImageFileInput::open(&path).unwrap();
  let output = RecordingOutput::default();
  let client = client(ScriptedApi::completing_after(0), 30);

  let mut task = AnalyzeTask::new(&config());
  assert!(task.run_task(input, &client, &output).await.is_err());

  assert_eq!(task.controller().phase(), Phase::Error);
  assert_eq!(
    task.controller().error().unwrap().kind,
    ErrorKind::UnsupportedFormat
  );
  assert!(client.api().log().is_empty());
  assert!(output.rendered.borrow().is_empty());
}
