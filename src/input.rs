// 该文件是 Anjian （安检） 项目的一部分。
// src/input.rs - 图像输入
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

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

pub trait AsNhwcFrame<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[u8];
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputNhwc, InputError, frame_from_image};

/// 缩放到模型输入尺寸时使用的插值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
  Nearest,
  Bilinear,
  #[default]
  Bicubic,
  Lanczos,
}

impl From<ResizeFilter> for FilterType {
  fn from(filter: ResizeFilter) -> Self {
    match filter {
      ResizeFilter::Nearest => FilterType::Nearest,
      ResizeFilter::Bilinear => FilterType::Triangle,
      ResizeFilter::Bicubic => FilterType::CatmullRom,
      ResizeFilter::Lanczos => FilterType::Lanczos3,
    }
  }
}

impl std::str::FromStr for ResizeFilter {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nearest" => Ok(ResizeFilter::Nearest),
      "bilinear" | "triangle" => Ok(ResizeFilter::Bilinear),
      "bicubic" | "catmullrom" => Ok(ResizeFilter::Bicubic),
      "lanczos" | "lanczos3" => Ok(ResizeFilter::Lanczos),
      other => Err(format!("未知的插值方式: {}", other)),
    }
  }
}
