// 该文件是 Anjian （安检） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 分类模型
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

use std::sync::Mutex;

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, ModelFrame,
  frame::Normalization,
  model::{Model, ModelError, Probabilities},
};

const ONNX_NUM_INPUTS: usize = 1;
const ONNX_DEFAULT_THREADS: usize = 1;

pub struct OnnxModel {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  normalization: Normalization,
}

pub struct OnnxModelBuilder {
  model_path: String,
  normalization: Option<Normalization>,
  intra_threads: usize,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxModelBuilder {
      model_path: url.path().to_string(),
      normalization: None,
      intra_threads: ONNX_DEFAULT_THREADS,
    };

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "normalization" => {
          builder.normalization = Some(v.parse().map_err(ModelError::ModelPathError)?);
        }
        "threads" => {
          builder.intra_threads = v
            .parse()
            .map_err(|_| ModelError::ModelPathError(format!("无效的线程数: {}", v)))?;
        }
        _ => debug!("忽略未知的模型参数: {}={}", k, v),
      }
    }

    Ok(builder)
  }
}

impl OnnxModelBuilder {
  pub fn normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = Some(normalization);
    self
  }

  pub fn default_normalization(mut self, normalization: Normalization) -> Self {
    self.normalization.get_or_insert(normalization);
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads;
    self
  }

  pub fn build(self) -> Result<OnnxModel, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let size = std::fs::metadata(&self.model_path)?.len();
    debug!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(&self.model_path)?;

    if session.inputs.len() != ONNX_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(ModelError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      )));
    }

    let output = session.outputs.first().ok_or_else(|| {
      error!("模型没有输出");
      ModelError::ModelInvalid("模型没有输出".to_string())
    })?;

    let input_name = session.inputs[0].name.clone();
    let output_name = output.name.clone();
    debug!("模型输入: {} {:?}", input_name, session.inputs[0].input_type);
    debug!("模型输出: {} {:?}", output_name, output.output_type);

    let normalization = self.normalization.unwrap_or_default();
    info!("模型加载完成, 归一化方式: {:?}", normalization);

    Ok(OnnxModel {
      session: Mutex::new(session),
      input_name,
      output_name,
      normalization,
    })
  }
}

impl Model for OnnxModel {
  type Input = ModelFrame;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = input.to_tensor(self.normalization);
    let shape = tensor.shape().map(|d| d as i64).to_vec();
    let value = TensorRef::from_array_view((shape, tensor.as_slice()))?;

    let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![self.input_name.as_str() => value])?;

    debug!("获取模型输出");
    let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
    debug!("模型输出形状: {:?}", shape);

    Probabilities::from_raw(data.to_vec())
  }
}
