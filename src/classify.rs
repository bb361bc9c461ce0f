// 该文件是 Anjian （安检） 项目的一部分。
// src/classify.rs - 威胁分类与置信度判定
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

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  ModelFrame,
  input::{InputError, ResizeFilter, frame_from_image},
  label::ClassLabels,
  model::{EXPECTED_CLASS_NUM, Model, Probabilities},
  threat::{self, RiskLevel},
};

/// 低于该置信度的结果显示为 `Not Known`
pub const CONFIDENCE_THRESHOLD: f32 = 0.30;
pub const NOT_KNOWN: &str = "Not Known";

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("{0}")]
  Input(#[from] InputError),
  #[error("Inference failed: {0}")]
  Model(Box<dyn std::error::Error + Send + Sync>),
  #[error("Model returned {actual} scores but {expected} class names are loaded")]
  OutputMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
  pub index: usize,
  pub name: String,
  pub probability: f32,
}

/// 一次推理的完整结果，类别按概率降序排列
#[derive(Debug, Clone)]
pub struct Classification {
  probabilities: Probabilities,
  ranked: Vec<ClassScore>,
}

impl Classification {
  pub fn new(probabilities: Probabilities, labels: &ClassLabels) -> Result<Self, ClassifyError> {
    if probabilities.len() != labels.len() {
      return Err(ClassifyError::OutputMismatch {
        expected: labels.len(),
        actual: probabilities.len(),
      });
    }

    let ranked = probabilities
      .ranked()
      .into_iter()
      .map(|index| ClassScore {
        index,
        name: labels.get(index).unwrap_or_default().to_string(),
        probability: probabilities.as_slice()[index],
      })
      .collect();

    Ok(Self {
      probabilities,
      ranked,
    })
  }

  pub fn probabilities(&self) -> &Probabilities {
    &self.probabilities
  }

  pub fn ranked(&self) -> &[ClassScore] {
    &self.ranked
  }

  pub fn top(&self) -> &ClassScore {
    // 构造时已保证非空
    &self.ranked[0]
  }

  pub fn verdict(&self, threshold: f32) -> Verdict {
    Verdict::decide(self.top(), threshold)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
  High,
  Medium,
  Low,
}

impl ConfidenceTier {
  pub fn of(confidence: f32) -> Self {
    if confidence >= 0.8 {
      ConfidenceTier::High
    } else if confidence >= 0.5 {
      ConfidenceTier::Medium
    } else {
      ConfidenceTier::Low
    }
  }

  pub fn color(&self) -> &'static str {
    match self {
      ConfidenceTier::High => "#22c55e",
      ConfidenceTier::Medium => "#eab308",
      ConfidenceTier::Low => "#ef4444",
    }
  }
}

/// 页面上展示的判定结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
  pub label: String,
  pub predicted_class: String,
  pub confidence: f32,
  pub uncertain: bool,
  pub risk: RiskLevel,
  pub risk_class: &'static str,
  pub description: String,
  pub confidence_tier: ConfidenceTier,
  /// 不确定时给出最接近的类别
  pub hint: Option<String>,
}

impl Verdict {
  pub fn decide(top: &ClassScore, threshold: f32) -> Self {
    let confidence = top.probability;
    let info = threat::lookup(&top.name);
    let tier = ConfidenceTier::of(confidence);

    if confidence < threshold {
      Verdict {
        label: NOT_KNOWN.to_string(),
        predicted_class: top.name.clone(),
        confidence,
        uncertain: true,
        risk: RiskLevel::Unknown,
        risk_class: RiskLevel::Unknown.css_class(),
        description: format!(
          "The model is not confident enough. Closest guess: {}.",
          top.name
        ),
        confidence_tier: tier,
        hint: Some(top.name.clone()),
      }
    } else {
      Verdict {
        label: top.name.clone(),
        predicted_class: top.name.clone(),
        confidence,
        uncertain: false,
        risk: info.risk,
        risk_class: info.risk.css_class(),
        description: info.description.to_string(),
        confidence_tier: tier,
        hint: None,
      }
    }
  }
}

/// 概率的百分数文本，保留一位小数
pub fn percent(probability: f32) -> String {
  format!("{:.1}", probability * 100.0)
}

/// 进度条宽度（整数百分比）
pub fn bar_width(probability: f32) -> u32 {
  (probability * 100.0).round().clamp(0.0, 100.0) as u32
}

/// 服务端使用的分类接口
pub trait Classifier: Send + Sync {
  fn labels(&self) -> &ClassLabels;
  fn classify(&self, image: &DynamicImage) -> Result<Classification, ClassifyError>;
}

pub struct ThreatClassifier<M> {
  model: M,
  labels: ClassLabels,
  filter: ResizeFilter,
}

impl<M, E> ThreatClassifier<M>
where
  M: Model<Input = ModelFrame, Output = Probabilities, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M, labels: ClassLabels) -> Self {
    if labels.len() != EXPECTED_CLASS_NUM {
      warn!(
        "类别数量为 {}, 与预期的 {} 不一致",
        labels.len(),
        EXPECTED_CLASS_NUM
      );
    }
    info!("已加载 {} 个类别: {:?}", labels.len(), labels.iter().collect::<Vec<_>>());
    Self {
      model,
      labels,
      filter: ResizeFilter::default(),
    }
  }

  pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
    self.filter = filter;
    self
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn classify_frame(&self, frame: &ModelFrame) -> Result<Classification, ClassifyError> {
    let now = std::time::Instant::now();
    let probabilities = self
      .model
      .infer(frame)
      .map_err(|e| ClassifyError::Model(Box::new(e)))?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());
    Classification::new(probabilities, &self.labels)
  }
}

impl<M, E> Model for ThreatClassifier<M>
where
  M: Model<Input = ModelFrame, Output = Probabilities, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  type Input = ModelFrame;
  type Output = Classification;
  type Error = ClassifyError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify_frame(input)
  }
}

impl<M, E> Classifier for ThreatClassifier<M>
where
  M: Model<Input = ModelFrame, Output = Probabilities, Error = E> + Send + Sync,
  E: std::error::Error + Send + Sync + 'static,
{
  fn labels(&self) -> &ClassLabels {
    &self.labels
  }

  fn classify(&self, image: &DynamicImage) -> Result<Classification, ClassifyError> {
    let frame: ModelFrame = frame_from_image(image, self.filter);
    self.classify_frame(&frame)
  }
}
