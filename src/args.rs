// 该文件是 Kyokucho （技术局长） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

/// Kyokucho 命令行参数，服务端点等配置通过 KYOKUCHO_* 环境变量提供
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///path/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出位置
  /// 支持格式:
  /// - 叠加图像: image:///path/out.png
  /// - 目录记录: folder:///path/records[?record][&always]
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 画布宽度（像素），需与 --height 同时指定
  #[arg(long, value_name = "PIXELS", requires = "height")]
  pub width: Option<u32>,

  /// 画布高度（像素）
  #[arg(long, value_name = "PIXELS", requires = "width")]
  pub height: Option<u32>,
}

impl Args {
  /// 命令行给出的画布尺寸写入输出 URL
  pub fn output_url(&self) -> Url {
    let mut url = self.output.clone();
    if let (Some(width), Some(height)) = (self.width, self.height) {
      url
        .query_pairs_mut()
        .append_pair("width", &width.to_string())
        .append_pair("height", &height.to_string());
    }
    url
  }
}
