// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/state.rs - 应用状态控制器
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

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  error::{AppError, ErrorReport},
  model::{AnalysisResult, Detection, ImageBlob},
  submit::{AnalysisApi, CancelHandle, SubmissionClient, progress_fn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  Idle,
  Preview,
  Uploading,
  Analyzing,
  Completed,
  Error,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::Idle => "idle",
      Phase::Preview => "preview",
      Phase::Uploading => "uploading",
      Phase::Analyzing => "analyzing",
      Phase::Completed => "completed",
      Phase::Error => "error",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
  #[error("状態 {from} では {action} を実行できません")]
  NotAllowed { from: Phase, action: &'static str },
}

/// 本地预览句柄，丢弃图像时必须回收
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle(String);

impl PreviewHandle {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PreviewHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

pub trait PreviewStore {
  fn create(&mut self, image: &ImageBlob) -> PreviewHandle;
  fn revoke(&mut self, handle: &PreviewHandle);
}

/// 进程内的预览存储
#[derive(Debug, Default)]
pub struct MemoryPreviewStore {
  live: HashMap<PreviewHandle, ImageBlob>,
}

impl MemoryPreviewStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, handle: &PreviewHandle) -> Option<&ImageBlob> {
    self.live.get(handle)
  }

  pub fn live_count(&self) -> usize {
    self.live.len()
  }
}

impl PreviewStore for MemoryPreviewStore {
  fn create(&mut self, image: &ImageBlob) -> PreviewHandle {
    let handle = PreviewHandle(format!("blob:kyokucho/{}", Uuid::new_v4()));
    self.live.insert(handle.clone(), image.clone());
    handle
  }

  fn revoke(&mut self, handle: &PreviewHandle) {
    if self.live.remove(handle).is_none() {
      warn!("回收未知的预览句柄: {}", handle);
    }
  }
}

/// 已选中的图像及其预览
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
  pub image: ImageBlob,
  pub preview: PreviewHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
  Idle,
  Preview(Selection),
  Uploading { selection: Selection, progress: f64 },
  Analyzing(Selection),
  Completed {
    selection: Selection,
    result: AnalysisResult,
  },
  Error {
    selection: Option<Selection>,
    report: ErrorReport,
  },
}

impl ViewState {
  pub fn phase(&self) -> Phase {
    match self {
      ViewState::Idle => Phase::Idle,
      ViewState::Preview(_) => Phase::Preview,
      ViewState::Uploading { .. } => Phase::Uploading,
      ViewState::Analyzing(_) => Phase::Analyzing,
      ViewState::Completed { .. } => Phase::Completed,
      ViewState::Error { .. } => Phase::Error,
    }
  }

  fn into_selection(self) -> Option<Selection> {
    match self {
      ViewState::Idle => None,
      ViewState::Preview(selection)
      | ViewState::Uploading { selection, .. }
      | ViewState::Analyzing(selection)
      | ViewState::Completed { selection, .. } => Some(selection),
      ViewState::Error { selection, .. } => selection,
    }
  }
}

/// 单写者的界面状态机，同一时间至多一个提交在进行
pub struct Controller<S: PreviewStore = MemoryPreviewStore> {
  state: ViewState,
  store: S,
}

impl Default for Controller<MemoryPreviewStore> {
  fn default() -> Self {
    Self::new(MemoryPreviewStore::new())
  }
}

impl<S: PreviewStore> Controller<S> {
  pub fn new(store: S) -> Self {
    Self {
      state: ViewState::Idle,
      store,
    }
  }

  pub fn state(&self) -> &ViewState {
    &self.state
  }

  pub fn phase(&self) -> Phase {
    self.state.phase()
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn selection(&self) -> Option<&Selection> {
    match &self.state {
      ViewState::Idle => None,
      ViewState::Preview(selection)
      | ViewState::Uploading { selection, .. }
      | ViewState::Analyzing(selection)
      | ViewState::Completed { selection, .. } => Some(selection),
      ViewState::Error { selection, .. } => selection.as_ref(),
    }
  }

  pub fn progress(&self) -> Option<f64> {
    match &self.state {
      ViewState::Uploading { progress, .. } => Some(*progress),
      ViewState::Analyzing(_) | ViewState::Completed { .. } => Some(100.0),
      _ => None,
    }
  }

  pub fn result(&self) -> Option<&AnalysisResult> {
    match &self.state {
      ViewState::Completed { result, .. } => Some(result),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ErrorReport> {
    match &self.state {
      ViewState::Error { report, .. } => Some(report),
      _ => None,
    }
  }

  /// 完成状态下展示的检测数量
  pub fn detection_count(&self) -> Option<usize> {
    self.result().map(AnalysisResult::len)
  }

  pub fn detection(&self, index: usize) -> Option<&Detection> {
    self.result().and_then(|r| r.detections.get(index))
  }

  fn transition(&mut self, from: Phase, next: ViewState) {
    let to = next.phase();
    info!("状态转换: {} -> {}", from, to);
    self.state = next;
  }

  fn not_allowed(&self, action: &'static str) -> TransitionError {
    let from = self.phase();
    warn!("拒绝状态转换: {} 于 {}", action, from);
    TransitionError::NotAllowed { from, action }
  }

  fn take_state(&mut self) -> ViewState {
    std::mem::replace(&mut self.state, ViewState::Idle)
  }

  fn discard(&mut self, selection: Option<Selection>) {
    if let Some(selection) = selection {
      debug!("回收预览: {}", selection.preview);
      self.store.revoke(&selection.preview);
    }
  }

  /// 只有 idle 与 completed 可以开始新一轮
  pub fn select_image(&mut self, image: ImageBlob) -> Result<&PreviewHandle, TransitionError> {
    let from = self.phase();
    if !matches!(from, Phase::Idle | Phase::Completed) {
      return Err(self.not_allowed("select_image"));
    }

    let previous = self.take_state().into_selection();
    self.discard(previous);

    let preview = self.store.create(&image);
    self.transition(from, ViewState::Preview(Selection { image, preview }));
    match &self.state {
      ViewState::Preview(selection) => Ok(&selection.preview),
      _ => Err(self.not_allowed("select_image")),
    }
  }

  /// 图像获取失败（例如相机权限被拒绝）
  pub fn acquire_failed(&mut self, error: &AppError) -> Result<(), TransitionError> {
    let from = self.phase();
    if !matches!(from, Phase::Idle | Phase::Completed) {
      return Err(self.not_allowed("acquire_failed"));
    }

    let previous = self.take_state().into_selection();
    self.discard(previous);
    self.transition(from, ViewState::Error {
      selection: None,
      report: error.report(),
    });
    Ok(())
  }

  /// 确认提交，返回待上传的图像
  pub fn confirm(&mut self) -> Result<ImageBlob, TransitionError> {
    let from = self.phase();
    match self.take_state() {
      ViewState::Preview(selection) => {
        let image = selection.image.clone();
        self.transition(from, ViewState::Uploading {
          selection,
          progress: 0.0,
        });
        Ok(image)
      }
      other => {
        self.state = other;
        Err(self.not_allowed("confirm"))
      }
    }
  }

  /// 进度达到 100% 时进入 analyzing；之后的进度事件忽略
  pub fn on_progress(&mut self, percent: f64) -> Result<(), TransitionError> {
    let from = self.phase();
    match &mut self.state {
      ViewState::Uploading { progress, .. } => {
        *progress = progress.max(percent.clamp(0.0, 100.0));
        debug!("上传进度: {:.1}%", *progress);
        if *progress >= 100.0
          && let ViewState::Uploading { selection, .. } = self.take_state()
        {
          self.transition(from, ViewState::Analyzing(selection));
        }
        Ok(())
      }
      ViewState::Analyzing(_) => Ok(()),
      _ => Err(self.not_allowed("on_progress")),
    }
  }

  pub fn complete(&mut self, result: AnalysisResult) -> Result<(), TransitionError> {
    let from = self.phase();
    match self.take_state() {
      ViewState::Analyzing(selection) => {
        info!("分析完成，检测到 {} 个设备", result.len());
        self.transition(from, ViewState::Completed { selection, result });
        Ok(())
      }
      ViewState::Uploading { selection, progress } => {
        debug!("上传进度停在 {:.1}% 即收到结果", progress);
        self.transition(from, ViewState::Completed { selection, result });
        Ok(())
      }
      other => {
        self.state = other;
        Err(self.not_allowed("complete"))
      }
    }
  }

  /// preview、uploading、analyzing 中的任何失败都进入 error，并保留已选图像
  pub fn fail(&mut self, error: &AppError) -> Result<(), TransitionError> {
    let from = self.phase();
    if !matches!(from, Phase::Preview | Phase::Uploading | Phase::Analyzing) {
      return Err(self.not_allowed("fail"));
    }

    let report = error.report();
    warn!("进入错误状态: {}", report);
    let selection = self.take_state().into_selection();
    self.transition(from, ViewState::Error { selection, report });
    Ok(())
  }

  /// 仍持有图像时回到 preview，否则回到 idle
  pub fn retry(&mut self) -> Result<Phase, TransitionError> {
    let from = self.phase();
    match self.take_state() {
      ViewState::Error {
        selection: Some(selection),
        ..
      } => self.transition(from, ViewState::Preview(selection)),
      ViewState::Error {
        selection: None, ..
      } => self.transition(from, ViewState::Idle),
      other => {
        self.state = other;
        return Err(self.not_allowed("retry"));
      }
    }
    Ok(self.phase())
  }

  /// 重新选择：丢弃当前图像并回到 idle
  pub fn retake(&mut self) -> Result<(), TransitionError> {
    let from = self.phase();
    if matches!(from, Phase::Uploading | Phase::Analyzing) {
      return Err(self.not_allowed("retake"));
    }

    let previous = self.take_state().into_selection();
    self.discard(previous);
    self.transition(from, ViewState::Idle);
    Ok(())
  }

  /// 确认并执行一次完整提交，进度事件在同一任务内应用到状态上
  pub async fn run_submission<A: AnalysisApi>(
    &mut self,
    client: &SubmissionClient<A>,
    cancel: &CancelHandle,
  ) -> Result<Phase, TransitionError> {
    let image = self.confirm()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<f64>();
    let progress = progress_fn(move |p| {
      let _ = tx.send(p);
    });

    let submission = client.submit(&image, progress, cancel);
    tokio::pin!(submission);

    let outcome = loop {
      tokio::select! {
        biased;
        Some(p) = rx.recv() => self.on_progress(p)?,
        outcome = &mut submission => break outcome,
      }
    };
    while let Ok(p) = rx.try_recv() {
      self.on_progress(p)?;
    }

    match outcome {
      Ok(result) => self.complete(result)?,
      Err(e) => self.fail(&AppError::from(e))?,
    }
    Ok(self.phase())
  }
}
