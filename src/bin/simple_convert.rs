// 该文件是 Anjian （安检） 项目的一部分。
// src/bin/simple_convert.rs - 图像格式转换
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use anjian::convert::{TargetFormat, convert_request};

/// 把图像转换为另一种格式
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 源图像文件
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 目标格式: png, jpeg, bmp, gif, tiff, webp, ico
  #[arg(long, value_name = "FORMAT")]
  pub format: TargetFormat,
  /// 输出文件，默认为源文件旁的 <名称>_converted.<扩展名>
  #[arg(long, value_name = "FILE")]
  pub output: Option<PathBuf>,
  /// JPEG 质量 (10 - 100)
  #[arg(long, value_name = "QUALITY")]
  pub quality: Option<u32>,
  /// 输出宽度
  #[arg(long, value_name = "PIXELS")]
  pub width: Option<u32>,
  /// 输出高度
  #[arg(long, value_name = "PIXELS")]
  pub height: Option<u32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let bytes = std::fs::read(&args.input).with_context(|| format!("读取 {} 失败", args.input.display()))?;
  let (info, converted) = convert_request(&bytes, args.format, args.quality, args.width, args.height)?;
  info!(
    "源图像: {} {}x{} {}",
    info.format, info.width, info.height, info.mode
  );

  let output = match args.output {
    Some(path) => path,
    None => {
      let original = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
      args.input.with_file_name(converted.file_name(&original))
    }
  };
  std::fs::write(&output, &converted.bytes).with_context(|| format!("写入 {} 失败", output.display()))?;

  info!(
    "已保存 {}: {} {}x{}, {}",
    output.display(),
    converted.format,
    converted.width,
    converted.height,
    converted.human_size()
  );
  Ok(())
}
