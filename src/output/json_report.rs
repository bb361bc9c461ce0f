// 该文件是 Anjian （安检） 项目的一部分。
// src/output/json_report.rs - JSON 报告文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classify::Classification,
  output::{Render, ScanReport, threshold_from_url},
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的阈值: {0}")]
  InvalidThreshold(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
}

pub struct JsonReportOutput {
  path: PathBuf,
  threshold: f32,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let threshold =
      threshold_from_url(url).map_err(|e| JsonReportError::InvalidThreshold(e.to_string()))?;

    Ok(JsonReportOutput {
      path: PathBuf::from(url.path()),
      threshold,
    })
  }
}

impl JsonReportOutput {
  pub fn new(path: impl Into<PathBuf>, threshold: f32) -> Self {
    Self {
      path: path.into(),
      threshold,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl<F> Render<F, Classification> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(&self, _frame: &F, result: &Classification) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let report = ScanReport::new(result, self.threshold);
    let file = std::fs::File::create(&self.path)?;
    serde_json::to_writer_pretty(file, &report)?;

    info!("保存报告到文件: {}", self.path.display());
    Ok(())
  }
}
