// 该文件是 Anjian （安检） 项目的一部分。
// src/config.rs - 配置文件
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

//! TOML 配置文件，所有字段都有默认值。
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8501
//! max_upload_bytes = 20971520
//!
//! [model]
//! url = "onnx:///opt/anjian/best_model_part2.onnx"
//! labels = "/opt/anjian/class_names_7classes.npy"
//! threshold = 0.3
//! normalization = "identity"
//! resize_filter = "bicubic"
//!
//! [logging]
//! level = "info"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{classify::CONFIDENCE_THRESHOLD, frame::Normalization, input::ResizeFilter};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub model: ModelConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub bind: String,
  pub port: u16,
  /// 单次上传的最大字节数
  pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: "127.0.0.1".to_string(),
      port: 8501,
      max_upload_bytes: 20 * 1024 * 1024,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
  /// 模型地址，如 `onnx:///path/model.onnx` 或 `rknn:///path/model.rknn`；
  /// `onnx:relative/model.onnx` 为相对于工作目录的路径
  pub url: String,
  pub labels: PathBuf,
  pub threshold: f32,
  pub normalization: Normalization,
  pub resize_filter: ResizeFilter,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      url: "onnx:saved_models/best_model_part2.onnx".to_string(),
      labels: PathBuf::from("saved_models/class_names_7classes.npy"),
      threshold: CONFIDENCE_THRESHOLD,
      normalization: Normalization::default(),
      resize_filter: ResizeFilter::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// trace, debug, info, warn, error；`RUST_LOG` 优先
  pub level: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
    }
  }
}

impl Config {
  pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml(&content)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.model.threshold) {
      return Err(ConfigError::Invalid(format!(
        "model.threshold 必须在 0 到 1 之间, 实际为 {}",
        self.model.threshold
      )));
    }
    if self.server.max_upload_bytes == 0 {
      return Err(ConfigError::Invalid(
        "server.max_upload_bytes 不能为 0".to_string(),
      ));
    }
    self.socket_addr()?;
    Ok(())
  }

  pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
    let ip: IpAddr = self
      .server
      .bind
      .parse()
      .map_err(|_| ConfigError::Invalid(format!("无效的监听地址: {}", self.server.bind)))?;
    Ok(SocketAddr::new(ip, self.server.port))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_usable() {
    let config = Config::default();
    assert_eq!(config.server.port, 8501);
    assert_eq!(config.model.threshold, 0.30);
    assert_eq!(config.model.normalization, Normalization::Identity);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn default_model_url_is_relative() {
    let url = url::Url::parse(&Config::default().model.url).unwrap();
    assert_eq!(url.scheme(), "onnx");
    assert_eq!(url.path(), "saved_models/best_model_part2.onnx");
  }

  #[test]
  fn partial_file_keeps_defaults() {
    let config = Config::from_toml(
      r#"
      [model]
      url = "rknn:///opt/model.rknn"
      normalization = "symmetric"
      resize_filter = "lanczos"
      "#,
    )
    .unwrap();
    assert_eq!(config.model.url, "rknn:///opt/model.rknn");
    assert_eq!(config.model.normalization, Normalization::Symmetric);
    assert_eq!(config.model.resize_filter, ResizeFilter::Lanczos);
    assert_eq!(config.server.bind, "127.0.0.1");
  }

  #[test]
  fn rejects_out_of_range_threshold() {
    let result = Config::from_toml("[model]\nthreshold = 1.5\n");
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
  }

  #[test]
  fn rejects_bad_bind_address() {
    let result = Config::from_toml("[server]\nbind = \"localhost:80\"\n");
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
  }

  #[test]
  fn rejects_malformed_toml() {
    assert!(matches!(
      Config::from_toml("[server\nport = 1"),
      Err(ConfigError::ParseError(_))
    ));
  }

  #[test]
  fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anjian.toml");
    std::fs::write(&path, "[server]\nport = 9000\n[logging]\nlevel = \"debug\"\n").unwrap();
    let config = Config::load(&path).unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.logging.level, "debug");
  }
}
