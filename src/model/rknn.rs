// 该文件是 Anjian （安检） 项目的一部分。
// src/model/rknn.rs - RKNPU 分类模型
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, ModelFrame,
  input::AsNhwcFrame,
  model::{Model, ModelError, Probabilities},
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_NUM_OUTPUTS: u32 = 1;

/// RKNN 模型在转换时已内置归一化，输入为 NHWC 排列的 u8 像素
pub struct RknnModel {
  context: Mutex<Context>,
}

pub struct RknnModelBuilder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnModelBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnModelBuilder {
      model_path: url.path().to_string(),
      flags: InitFlags::default(),
    })
  }
}

fn check_count(what: &str, expected: u32, actual: u32) -> Result<(), ModelError> {
  if expected != actual {
    error!("预期模型{}数量为 {}, 实际为 {}", what, expected, actual);
    return Err(ModelError::ModelInvalid(format!(
      "预期模型{}数量为 {}, 实际为 {}",
      what, expected, actual
    )));
  }
  Ok(())
}

impl RknnModelBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnModel, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(ModelError::ModelInvalid(format!("无法查询 SDK 版本: {}", e)));
      }
    }

    check_count("输入", RKNN_NUM_INPUTS, context.num_inputs()?)?;
    check_count("输出", RKNN_NUM_OUTPUTS, context.num_outputs()?)?;
    info!("模型加载完成");

    Ok(RknnModel {
      context: Mutex::new(context),
    })
  }
}

impl Model for RknnModel {
  type Input = ModelFrame;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let context = self.context.lock().map_err(|_| ModelError::Poisoned)?;

    debug!("设置模型输入");
    context.set_input(0, input.as_nhwc(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    context.run()?;

    debug!("获取模型输出");
    let output = context.get_outputs()?;
    let data = output.get_f32(0)?;

    Probabilities::from_raw(data.to_vec())
  }
}
