// 该文件是 Anjian （安检） 项目的一部分。
// src/output.rs - 输出定义
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

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classify::{CONFIDENCE_THRESHOLD, ClassScore, Classification, Verdict},
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod json_report;
mod log_report;
pub use self::json_report::{JsonReportError, JsonReportOutput};
pub use self::log_report::LogReportOutput;

/// 一次扫描的可序列化报告，命令行输出与 JSON 接口共用
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
  pub scanned_at: DateTime<Utc>,
  pub threshold: f32,
  pub verdict: Verdict,
  pub probabilities: Vec<ClassScore>,
}

impl ScanReport {
  pub fn new(classification: &Classification, threshold: f32) -> Self {
    Self {
      scanned_at: Utc::now(),
      threshold,
      verdict: classification.verdict(threshold),
      probabilities: classification.ranked().to_vec(),
    }
  }
}

// 从 URL 查询参数中读取阈值
fn threshold_from_url(url: &Url) -> Result<f32, OutputError> {
  match url.query_pairs().find(|(k, _)| k == "threshold") {
    Some((_, v)) => v
      .parse::<f32>()
      .ok()
      .filter(|t| (0.0..=1.0).contains(t))
      .ok_or_else(|| OutputError::InvalidThreshold(v.to_string())),
    None => Ok(CONFIDENCE_THRESHOLD),
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 报告输出错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[error("无效的阈值: {0}")]
  InvalidThreshold(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  LogReport(LogReportOutput),
  JsonReport(JsonReportOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogReportOutput::SCHEME => Ok(OutputWrapper::LogReport(LogReportOutput::from_url(url)?)),
      JsonReportOutput::SCHEME => Ok(OutputWrapper::JsonReport(JsonReportOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<F> Render<F, Classification> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &Classification) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogReport(output) => output.render_result(frame, result),
      OutputWrapper::JsonReport(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
