// 该文件是 Anjian （安检） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{FromUrl, ModelFrame, frame::Normalization};

#[cfg(not(any(feature = "onnx", feature = "rknpu")))]
compile_error!("至少需要启用一个推理后端: onnx 或 rknpu");

/// 模型预期的类别数
pub const EXPECTED_CLASS_NUM: usize = 7;

// 判断输出是否已是概率分布时的容差
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("不支持的模型方案: {0}")]
  SchemeMismatch(String),
  #[cfg(feature = "onnx")]
  #[error("ONNX Runtime 错误: {0}")]
  OnnxError(#[from] ort::Error),
  #[cfg(feature = "rknpu")]
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型输出为空")]
  EmptyOutput,
  #[error("模型输出包含非有限值")]
  NonFinite,
  #[error("推理会话锁已失效")]
  Poisoned,
}

/// 每个类别一个概率，非负且和为 1
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities {
  values: Box<[f32]>,
}

impl Probabilities {
  /// 由模型原始输出构造；若输出不是概率分布（如 logits），则做 softmax
  pub fn from_raw(raw: Vec<f32>) -> Result<Self, ModelError> {
    if raw.is_empty() {
      return Err(ModelError::EmptyOutput);
    }
    if raw.iter().any(|v| !v.is_finite()) {
      return Err(ModelError::NonFinite);
    }

    let sum: f32 = raw.iter().sum();
    let in_range = raw.iter().all(|&v| (-1e-6..=1.0 + 1e-6).contains(&v));
    let values = if in_range && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE {
      raw.into_iter().map(|v| v.max(0.0)).collect::<Vec<_>>()
    } else {
      debug!("模型输出不是概率分布 (和为 {}), 执行 softmax", sum);
      softmax(&raw)
    };

    Ok(Self {
      values: values.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.values
  }

  pub fn get(&self, index: usize) -> Option<f32> {
    self.values.get(index).copied()
  }

  pub fn sum(&self) -> f32 {
    self.values.iter().sum()
  }

  /// 最大概率的下标与取值，并列时取下标最小者
  pub fn top(&self) -> (usize, f32) {
    self
      .values
      .iter()
      .copied()
      .enumerate()
      .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best })
  }

  /// 按概率降序排列的下标
  pub fn ranked(&self) -> Vec<usize> {
    let mut indices = (0..self.values.len()).collect::<Vec<_>>();
    indices.sort_by(|&a, &b| self.values[b].total_cmp(&self.values[a]));
    indices
  }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::MIN, f32::max);
  let exps = logits.iter().map(|&v| (v - max).exp()).collect::<Vec<_>>();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|v| v / sum).collect()
}

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxModel, OnnxModelBuilder};

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnModel, RknnModelBuilder};

/// 按 URL 方案选择推理后端
pub enum ModelWrapper {
  #[cfg(feature = "onnx")]
  Onnx(OnnxModel),
  #[cfg(feature = "rknpu")]
  Rknn(RknnModel),
}

impl ModelWrapper {
  /// 加载模型；URL 未指定 `normalization` 参数时使用给定的默认值
  pub fn load(url: &Url, normalization: Normalization) -> Result<Self, ModelError> {
    match url.scheme() {
      #[cfg(feature = "onnx")]
      scheme if scheme == <OnnxModelBuilder as crate::FromUrlWithScheme>::SCHEME => {
        let model = OnnxModelBuilder::from_url(url)?
          .default_normalization(normalization)
          .build()?;
        Ok(ModelWrapper::Onnx(model))
      }
      #[cfg(feature = "rknpu")]
      scheme if scheme == <RknnModelBuilder as crate::FromUrlWithScheme>::SCHEME => {
        let _ = normalization;
        let model = RknnModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Rknn(model))
      }
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }

  pub fn backend(&self) -> &'static str {
    match self {
      #[cfg(feature = "onnx")]
      ModelWrapper::Onnx(_) => "ONNX Runtime",
      #[cfg(feature = "rknpu")]
      ModelWrapper::Rknn(_) => "RKNPU",
    }
  }
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::load(url, Normalization::default())
  }
}

impl Model for ModelWrapper {
  type Input = ModelFrame;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      #[cfg(feature = "onnx")]
      ModelWrapper::Onnx(model) => model.infer(input),
      #[cfg(feature = "rknpu")]
      ModelWrapper::Rknn(model) => model.infer(input),
    }
  }
}
