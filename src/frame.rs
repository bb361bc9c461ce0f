// 该文件是 Anjian （安检） 项目的一部分。
// src/frame.rs - NHWC 帧与张量定义
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::AsNhwcFrame;

pub const RGB_CHANNELS: usize = 3;

// ImageNet 均值与标准差（0-255 量纲）
const IMAGENET_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const IMAGENET_STD: [f32; 3] = [58.395, 57.12, 57.375];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 像素归一化方式，需与模型训练时一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
  /// 保持 [0, 255]，EfficientNet 系列的缩放层在模型内部
  #[default]
  Identity,
  /// 缩放到 [0, 1]
  Unit,
  /// 缩放到 [-1, 1]
  Symmetric,
  /// 按 ImageNet 均值与标准差标准化
  Imagenet,
}

impl Normalization {
  #[inline]
  pub fn apply(&self, value: u8, channel: usize) -> f32 {
    let v = value as f32;
    match self {
      Normalization::Identity => v,
      Normalization::Unit => v / 255.0,
      Normalization::Symmetric => v / 127.5 - 1.0,
      Normalization::Imagenet => (v - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
    }
  }
}

impl std::str::FromStr for Normalization {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "identity" | "none" => Ok(Normalization::Identity),
      "unit" => Ok(Normalization::Unit),
      "symmetric" => Ok(Normalization::Symmetric),
      "imagenet" => Ok(Normalization::Imagenet),
      other => Err(format!("未知的归一化方式: {}", other)),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub const LEN: usize = RGB_CHANNELS * W as usize * H as usize;

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let index = (y * self.width() + x) * RGB_CHANNELS;
    [self.data[index], self.data[index + 1], self.data[index + 2]]
  }

  /// 按给定方式归一化为 `f32` 张量，形状为 [1, H, W, 3]
  pub fn to_tensor(&self, normalization: Normalization) -> NhwcTensor<W, H> {
    let data = self
      .data
      .iter()
      .enumerate()
      .map(|(index, &value)| normalization.apply(value, index % RGB_CHANNELS))
      .collect::<Vec<_>>()
      .into_boxed_slice();
    NhwcTensor { data }
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbNhwcFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let data = vec![0u8; Self::LEN].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> AsMut<[u8]> for RgbNhwcFrame<W, H> {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

/// 归一化后的 NHWC 浮点张量，批大小固定为 1
#[derive(Debug, Clone)]
pub struct NhwcTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> NhwcTensor<W, H> {
  pub fn shape(&self) -> [usize; 4] {
    [1, H as usize, W as usize, RGB_CHANNELS]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}
