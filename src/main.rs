// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use kyokucho::{
  FromUrl,
  config::Config,
  input::InputWrapper,
  output::OutputWrapper,
  submit::{CancelHandle, HttpAnalysisApi, PollPolicy, SubmissionClient},
  task::{AnalyzeTask, Task},
};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = Config::from_env()?;

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let mut output = OutputWrapper::from_url(&args.output_url())?;
  if let Some(font) = config.font_path() {
    output.set_default_font(font)?;
  }

  let cancel = CancelHandle::default();
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，取消上传...");
      cancel.cancel();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
  }

  let client =
    SubmissionClient::new(HttpAnalysisApi::new(&config)?).with_poll_policy(PollPolicy::from(&config));

  let mut task = AnalyzeTask::new(&config).with_cancel(cancel);
  let result = task.run_task(input, &client, &output).await?;

  info!("检测到 {} 个设备", result.len());
  for (i, detection) in result.detections.iter().enumerate() {
    info!(
      "  {}. {} [{} {}] {}",
      i + 1,
      detection.name,
      detection.risk_level.label(),
      detection.risk_level.advice(),
      detection.description
    );
  }

  Ok(())
}
