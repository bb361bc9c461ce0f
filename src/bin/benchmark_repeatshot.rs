// 该文件是 Anjian （安检） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理计时
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use anjian::{
  FromUrl, MODEL_INPUT_H, MODEL_INPUT_W,
  classify::ThreatClassifier,
  frame::Normalization,
  input::ImageFileInput,
  label::ClassLabels,
  model::ModelWrapper,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 对同一张图像重复推理，统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 类别名称文件
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 输入归一化方式
  #[arg(long, value_name = "MODE", default_value = "identity")]
  pub normalization: Normalization,
  /// 推理次数
  #[arg(long, value_name = "COUNT", default_value = "1000")]
  pub repeat: usize,
  /// 不计入平均值的预热次数
  #[arg(long, value_name = "COUNT", default_value = "2")]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("推理次数: {} (预热 {})", args.repeat, args.warmup);

  let input_image = ImageFileInput::from_url(&args.input)?;
  let model = ModelWrapper::load(&args.model, args.normalization)?;
  let classifier = ThreatClassifier::new(model, ClassLabels::load(&args.labels)?);
  let output = OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .with_warmup(args.warmup)
    .run_task(input_image.into_nhwc::<MODEL_INPUT_W, MODEL_INPUT_H>(), classifier, output)?;

  Ok(())
}
