// 该文件是 Anjian （安检） 项目的一部分。
// src/main.rs - 网页服务主程序
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
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use anjian::{
  classify::ThreatClassifier,
  config::Config,
  frame::Normalization,
  input::ResizeFilter,
  label::ClassLabels,
  model::ModelWrapper,
  server::{self, AppState},
};

/// Anjian X 光行李威胁识别服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 模型地址，如 onnx:///path/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,
  /// 类别名称文件 (.npy, .json, .txt)
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 监听地址
  #[arg(long, value_name = "ADDR")]
  pub bind: Option<String>,
  /// 监听端口
  #[arg(long, value_name = "PORT")]
  pub port: Option<u16>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,
  /// 输入归一化方式: identity, unit, symmetric, imagenet
  #[arg(long, value_name = "MODE")]
  pub normalization: Option<Normalization>,
  /// 缩放插值方式: nearest, bilinear, bicubic, lanczos
  #[arg(long, value_name = "FILTER")]
  pub resize_filter: Option<ResizeFilter>,
}

impl Args {
  /// 命令行参数覆盖配置文件
  fn into_config(self) -> Result<Config> {
    let mut config = match &self.config {
      Some(path) => Config::load(path).with_context(|| format!("读取配置文件 {} 失败", path.display()))?,
      None => Config::default(),
    };

    if let Some(model) = self.model {
      config.model.url = model.to_string();
    }
    if let Some(labels) = self.labels {
      config.model.labels = labels;
    }
    if let Some(bind) = self.bind {
      config.server.bind = bind;
    }
    if let Some(port) = self.port {
      config.server.port = port;
    }
    if let Some(threshold) = self.threshold {
      config.model.threshold = threshold;
    }
    if let Some(normalization) = self.normalization {
      config.model.normalization = normalization;
    }
    if let Some(filter) = self.resize_filter {
      config.model.resize_filter = filter;
    }

    config.validate()?;
    Ok(config)
  }
}

fn init_tracing(level: &str) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!("无法监听退出信号: {}", e);
    std::future::pending::<()>().await;
  }
  info!("收到退出信号，正在停止服务...");
}

#[tokio::main]
async fn main() -> Result<()> {
  let config = Args::parse().into_config()?;
  init_tracing(&config.logging.level);

  info!("Anjian X 光行李威胁识别服务");
  info!("模型地址: {}", config.model.url);
  info!("类别文件: {}", config.model.labels.display());
  info!("置信度阈值: {}", config.model.threshold);

  let model_url = Url::parse(&config.model.url).with_context(|| format!("无效的模型地址: {}", config.model.url))?;
  info!("正在加载模型...");
  let model = ModelWrapper::load(&model_url, config.model.normalization)?;
  let backend = model.backend();
  info!("模型加载完成，推理后端: {}", backend);

  let labels = ClassLabels::load(&config.model.labels)?;
  let classifier = ThreatClassifier::new(model, labels).with_filter(config.model.resize_filter);

  let state = Arc::new(
    AppState::new(Arc::new(classifier))
      .with_threshold(config.model.threshold)
      .with_max_upload_bytes(config.server.max_upload_bytes)
      .with_backend(backend),
  );

  let addr = config.socket_addr()?;
  let (bound, server) = warp::serve(server::routes(state))
    .try_bind_with_graceful_shutdown(addr, shutdown_signal())
    .with_context(|| format!("无法监听 {}", addr))?;
  info!("服务已启动: http://{}", bound);
  server.await;
  info!("服务已停止");

  Ok(())
}
