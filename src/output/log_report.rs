// 该文件是 Anjian （安检） 项目的一部分。
// src/output/log_report.rs - 日志输出
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

use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classify::{Classification, percent},
  output::{OutputError, Render, threshold_from_url},
};

/// 把判定结果与完整概率分布写入日志
pub struct LogReportOutput {
  threshold: f32,
}

impl FromUrlWithScheme for LogReportOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogReportOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(LogReportOutput {
      threshold: threshold_from_url(url)?,
    })
  }
}

impl<F> Render<F, Classification> for LogReportOutput {
  type Error = OutputError;

  fn render_result(&self, _frame: &F, result: &Classification) -> Result<(), Self::Error> {
    let verdict = result.verdict(self.threshold);
    if verdict.uncertain {
      warn!(
        "检测结果: {} (最接近: {}, 置信度 {}%)",
        verdict.label,
        verdict.predicted_class,
        percent(verdict.confidence)
      );
    } else {
      info!(
        "检测结果: {} [{} Risk] 置信度 {}%",
        verdict.label,
        verdict.risk.as_str(),
        percent(verdict.confidence)
      );
    }
    for score in result.ranked() {
      info!("  - {}: {}%", score.name, percent(score.probability));
    }
    Ok(())
  }
}
