// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/task.rs - 端到端任务：获取、压缩、提交、渲染
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

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  config::Config,
  error::AppError,
  input::validate,
  model::{AnalysisResult, ImageBlob},
  normalize::Normalizer,
  output::Render,
  state::{Controller, Phase},
  submit::{AnalysisApi, CancelHandle, SubmissionClient},
};

#[allow(async_fn_in_trait)]
pub trait Task<I, A, O> {
  type Error;
  async fn run_task(
    &mut self,
    input: I,
    client: &SubmissionClient<A>,
    output: &O,
  ) -> Result<AnalysisResult, Self::Error>;
}

/// 单张图像的完整分析流程
pub struct AnalyzeTask {
  max_file_bytes: u64,
  normalizer: Normalizer,
  cancel: CancelHandle,
  controller: Controller,
}

impl AnalyzeTask {
  pub fn new(config: &Config) -> Self {
    Self {
      max_file_bytes: config.max_file_bytes(),
      normalizer: Normalizer::default(),
      cancel: CancelHandle::default(),
      controller: Controller::default(),
    }
  }

  pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
    self.normalizer = normalizer;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn controller(&self) -> &Controller {
    &self.controller
  }

  /// 获取阶段的失败直接进入 error，不持有图像
  fn reject(&mut self, error: AppError) -> anyhow::Error {
    let report = error.report();
    if let Err(e) = self.controller.acquire_failed(&error) {
      warn!("无法记录获取失败: {}", e);
    }
    anyhow::anyhow!("{}", report)
  }

  async fn prepare(&self, blob: ImageBlob) -> Result<ImageBlob, AppError> {
    validate(&blob, self.max_file_bytes)?;
    let normalized = self.normalizer.normalize_off_thread(blob).await?;
    Ok(normalized.blob)
  }
}

impl<I, A, O> Task<I, A, O> for AnalyzeTask
where
  I: Iterator<Item = ImageBlob>,
  A: AnalysisApi,
  O: Render<RgbImage, AnalysisResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(
    &mut self,
    mut input: I,
    client: &SubmissionClient<A>,
    output: &O,
  ) -> Result<AnalysisResult, Self::Error> {
    info!("开始任务...");
    let blob = input
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功: {} 字节", blob.size());

    let prepared = match self.prepare(blob).await {
      Ok(prepared) => prepared,
      Err(e) => return Err(self.reject(e)),
    };
    let frame = image::load_from_memory(&prepared.bytes)?.to_rgb8();
    self.controller.select_image(prepared)?;

    let now = std::time::Instant::now();
    let phase = self
      .controller
      .run_submission(client, &self.cancel)
      .await?;
    info!("提交结束: {}，耗时: {:.2?}", phase, now.elapsed());

    if phase != Phase::Completed {
      let report = self
        .controller
        .error()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("意外的阶段: {}", phase));
      return Err(anyhow::anyhow!(report));
    }

    let result = self
      .controller
      .result()
      .cloned()
      .ok_or_else(|| anyhow::anyhow!("没有分析结果"))?;
    if result.is_empty() {
      warn!("未检测到任何设备: {}", result.image_key);
    }

    let now = std::time::Instant::now();
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(result)
  }
}
