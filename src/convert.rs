// 该文件是 Anjian （安检） 项目的一部分。
// src/convert.rs - 图像格式转换
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

use std::io::Cursor;
use std::path::Path;

use image::{
  ColorType, DynamicImage, ImageFormat, Rgba, RgbaImage,
  codecs::jpeg::JpegEncoder,
  imageops::{self, FilterType},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::input::{ImageFileInput, InputError};

pub const DEFAULT_QUALITY: u8 = 95;
pub const MIN_QUALITY: u8 = 10;
pub const MAX_QUALITY: u8 = 100;
/// ICO 单边最大尺寸
pub const ICO_MAX_DIM: u32 = 256;
/// 缩放目标的最大像素数
pub const MAX_OUTPUT_PIXELS: u64 = 8192 * 8192;

/// 转换工具接受的源格式
pub const SOURCE_FORMATS: &[ImageFormat] = &[
  ImageFormat::Png,
  ImageFormat::Jpeg,
  ImageFormat::Bmp,
  ImageFormat::Gif,
  ImageFormat::Tiff,
  ImageFormat::WebP,
  ImageFormat::Ico,
];

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("{0}")]
  Input(#[from] InputError),
  #[error("Unsupported target format: {0}")]
  UnsupportedTarget(String),
  #[error("Quality must be between {MIN_QUALITY} and {MAX_QUALITY}, got {0}")]
  InvalidQuality(u32),
  #[error("Width and height must be at least 1 pixel")]
  InvalidSize,
  #[error("Requested size {width}x{height} exceeds the limit of {MAX_OUTPUT_PIXELS} pixels")]
  TooLarge { width: u32, height: u32 },
  #[error("Encoding failed: {0}")]
  Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetFormat {
  Png,
  Jpeg,
  Bmp,
  Gif,
  Tiff,
  Webp,
  Ico,
}

impl TargetFormat {
  pub const ALL: [TargetFormat; 7] = [
    TargetFormat::Png,
    TargetFormat::Jpeg,
    TargetFormat::Bmp,
    TargetFormat::Gif,
    TargetFormat::Tiff,
    TargetFormat::Webp,
    TargetFormat::Ico,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      TargetFormat::Png => "PNG",
      TargetFormat::Jpeg => "JPEG",
      TargetFormat::Bmp => "BMP",
      TargetFormat::Gif => "GIF",
      TargetFormat::Tiff => "TIFF",
      TargetFormat::Webp => "WEBP",
      TargetFormat::Ico => "ICO",
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      TargetFormat::Png => "png",
      TargetFormat::Jpeg => "jpg",
      TargetFormat::Bmp => "bmp",
      TargetFormat::Gif => "gif",
      TargetFormat::Tiff => "tiff",
      TargetFormat::Webp => "webp",
      TargetFormat::Ico => "ico",
    }
  }

  pub fn mime(&self) -> &'static str {
    match self {
      TargetFormat::Png => "image/png",
      TargetFormat::Jpeg => "image/jpeg",
      TargetFormat::Bmp => "image/bmp",
      TargetFormat::Gif => "image/gif",
      TargetFormat::Tiff => "image/tiff",
      TargetFormat::Webp => "image/webp",
      TargetFormat::Ico => "image/x-icon",
    }
  }

  pub fn image_format(&self) -> ImageFormat {
    match self {
      TargetFormat::Png => ImageFormat::Png,
      TargetFormat::Jpeg => ImageFormat::Jpeg,
      TargetFormat::Bmp => ImageFormat::Bmp,
      TargetFormat::Gif => ImageFormat::Gif,
      TargetFormat::Tiff => ImageFormat::Tiff,
      TargetFormat::Webp => ImageFormat::WebP,
      TargetFormat::Ico => ImageFormat::Ico,
    }
  }

  /// 是否支持质量参数
  pub fn has_quality(&self) -> bool {
    matches!(self, TargetFormat::Jpeg | TargetFormat::Webp)
  }

  // 不支持透明通道、需要铺白底的格式
  fn flattens_alpha(&self) -> bool {
    matches!(self, TargetFormat::Jpeg | TargetFormat::Bmp | TargetFormat::Ico)
  }
}

impl std::str::FromStr for TargetFormat {
  type Err = ConvertError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "png" => Ok(TargetFormat::Png),
      "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
      "bmp" => Ok(TargetFormat::Bmp),
      "gif" => Ok(TargetFormat::Gif),
      "tiff" | "tif" => Ok(TargetFormat::Tiff),
      "webp" => Ok(TargetFormat::Webp),
      "ico" => Ok(TargetFormat::Ico),
      other => Err(ConvertError::UnsupportedTarget(other.to_string())),
    }
  }
}

impl std::fmt::Display for TargetFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
  pub format: TargetFormat,
  pub quality: u8,
  pub resize: Option<(u32, u32)>,
}

impl ConvertOptions {
  pub fn new(format: TargetFormat) -> Self {
    Self {
      format,
      quality: DEFAULT_QUALITY,
      resize: None,
    }
  }

  pub fn quality(mut self, quality: u32) -> Result<Self, ConvertError> {
    if !(MIN_QUALITY as u32..=MAX_QUALITY as u32).contains(&quality) {
      return Err(ConvertError::InvalidQuality(quality));
    }
    self.quality = quality as u8;
    Ok(self)
  }

  pub fn resize(mut self, width: u32, height: u32) -> Result<Self, ConvertError> {
    check_output_size(width, height)?;
    self.resize = Some((width, height));
    Ok(self)
  }
}

// 缩放缓冲区按目标尺寸一次性分配，超大尺寸会直接耗尽内存
fn check_output_size(width: u32, height: u32) -> Result<(), ConvertError> {
  if width == 0 || height == 0 {
    return Err(ConvertError::InvalidSize);
  }
  if width as u64 * height as u64 > MAX_OUTPUT_PIXELS {
    return Err(ConvertError::TooLarge { width, height });
  }
  Ok(())
}

/// 源图像信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
  pub format: String,
  pub width: u32,
  pub height: u32,
  pub mode: String,
}

impl SourceInfo {
  pub fn of(image: &DynamicImage, format: Option<ImageFormat>) -> Self {
    Self {
      format: format
        .map(format_name)
        .unwrap_or_else(|| "Unknown".to_string()),
      width: image.width(),
      height: image.height(),
      mode: color_mode(image.color()).to_string(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Converted {
  pub format: TargetFormat,
  pub width: u32,
  pub height: u32,
  pub bytes: Vec<u8>,
}

impl Converted {
  pub fn file_size(&self) -> usize {
    self.bytes.len()
  }

  pub fn human_size(&self) -> String {
    human_size(self.bytes.len())
  }

  /// 下载文件名 `<原文件名>_converted.<扩展名>`
  pub fn file_name(&self, original: &str) -> String {
    let stem = Path::new(original)
      .file_stem()
      .and_then(|s| s.to_str())
      .filter(|s| !s.is_empty())
      .unwrap_or("image");
    format!("{}_converted.{}", stem, self.format.extension())
  }
}

fn format_name(format: ImageFormat) -> String {
  match format {
    ImageFormat::WebP => "WEBP".to_string(),
    other => format!("{:?}", other).to_uppercase(),
  }
}

fn color_mode(color: ColorType) -> &'static str {
  match color {
    ColorType::L8 | ColorType::L16 => "L",
    ColorType::La8 | ColorType::La16 => "LA",
    ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
    ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
    _ => "Unknown",
  }
}

pub fn human_size(size: usize) -> String {
  if size < 1024 {
    format!("{} B", size)
  } else if size < 1024 * 1024 {
    format!("{:.1} KB", size as f64 / 1024.0)
  } else {
    format!("{:.2} MB", size as f64 / (1024.0 * 1024.0))
  }
}

/// 解码上传内容并检查源格式
pub fn decode_source(bytes: &[u8]) -> Result<(DynamicImage, SourceInfo), ConvertError> {
  let input = ImageFileInput::from_bytes(bytes)?.accept(SOURCE_FORMATS)?;
  let format = input.format();
  let image = input.into_image().ok_or(InputError::Empty)?;
  let info = SourceInfo::of(&image, format);
  Ok((image, info))
}

/// 把带透明通道的图像铺在白底上
fn flatten_on_white(image: &DynamicImage) -> DynamicImage {
  let rgba = image.to_rgba8();
  let mut canvas = RgbaImage::from_pixel(rgba.width(), rgba.height(), Rgba([255, 255, 255, 255]));
  imageops::overlay(&mut canvas, &rgba, 0, 0);
  DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

// 统一到 8 位 RGB/RGBA，保证各编码器都能接受
fn to_eight_bit(image: DynamicImage) -> DynamicImage {
  match image {
    DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
    other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
    other => DynamicImage::ImageRgb8(other.to_rgb8()),
  }
}

pub fn convert_image(image: &DynamicImage, options: &ConvertOptions) -> Result<Converted, ConvertError> {
  let format = options.format;
  let mut out = image.clone();

  if let Some((width, height)) = options.resize {
    check_output_size(width, height)?;
    debug!("调整尺寸: {}x{} -> {}x{}", out.width(), out.height(), width, height);
    out = out.resize_exact(width, height, FilterType::Lanczos3);
  }

  out = if format.flattens_alpha() && out.color().has_alpha() {
    flatten_on_white(&out)
  } else {
    to_eight_bit(out)
  };

  if format == TargetFormat::Jpeg {
    out = DynamicImage::ImageRgb8(out.to_rgb8());
  }

  if format == TargetFormat::Ico {
    let max_dim = out.width().max(out.height());
    if max_dim > ICO_MAX_DIM {
      let scale = |side: u32| ((side as u64 * ICO_MAX_DIM as u64 / max_dim as u64) as u32).max(1);
      let (width, height) = (scale(out.width()), scale(out.height()));
      debug!("ICO 尺寸限制: 缩放到 {}x{}", width, height);
      out = out.resize_exact(width, height, FilterType::Lanczos3);
    }
  }

  let mut buf = Cursor::new(Vec::new());
  match format {
    TargetFormat::Jpeg => {
      let encoder = JpegEncoder::new_with_quality(&mut buf, options.quality);
      out.write_with_encoder(encoder)?;
    }
    other => out.write_to(&mut buf, other.image_format())?,
  }

  let converted = Converted {
    format,
    width: out.width(),
    height: out.height(),
    bytes: buf.into_inner(),
  };
  info!(
    "转换完成: {} {}x{}, {}",
    converted.format,
    converted.width,
    converted.height,
    converted.human_size()
  );
  Ok(converted)
}

/// 解码、转换一次完成
pub fn convert_bytes(bytes: &[u8], options: &ConvertOptions) -> Result<(SourceInfo, Converted), ConvertError> {
  let (image, info) = decode_source(bytes)?;
  debug!("源图像: {:?}", info);
  let converted = convert_image(&image, options)?;
  Ok((info, converted))
}

/// 表单或命令行的转换请求；只给出宽或高时另一边沿用源图像尺寸
pub fn convert_request(
  bytes: &[u8],
  format: TargetFormat,
  quality: Option<u32>,
  width: Option<u32>,
  height: Option<u32>,
) -> Result<(SourceInfo, Converted), ConvertError> {
  let mut options = ConvertOptions::new(format);
  if let Some(quality) = quality {
    options = options.quality(quality)?;
  }
  if let (Some(width), Some(height)) = (width, height) {
    check_output_size(width, height)?;
  }

  let (image, info) = decode_source(bytes)?;
  if width.is_some() || height.is_some() {
    options = options.resize(width.unwrap_or(info.width), height.unwrap_or(info.height))?;
  }
  let converted = convert_image(&image, &options)?;
  Ok((info, converted))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    })
  }

  fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
  }

  #[test]
  fn parses_target_formats() {
    assert_eq!("jpg".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
    assert_eq!("TIF".parse::<TargetFormat>().unwrap(), TargetFormat::Tiff);
    assert_eq!("WEBP".parse::<TargetFormat>().unwrap(), TargetFormat::Webp);
    assert!(matches!(
      "psd".parse::<TargetFormat>(),
      Err(ConvertError::UnsupportedTarget(_))
    ));
  }

  #[test]
  fn bmp_round_trip_preserves_pixels() {
    let original = DynamicImage::ImageRgb8(gradient(37, 21));
    let (_, bmp) =
      convert_bytes(&png_bytes(&original), &ConvertOptions::new(TargetFormat::Bmp)).unwrap();
    let (info, png) = convert_bytes(&bmp.bytes, &ConvertOptions::new(TargetFormat::Png)).unwrap();
    assert_eq!(info.format, "BMP");

    let decoded = image::load_from_memory(&png.bytes).unwrap().to_rgb8();
    assert_eq!(decoded, original.to_rgb8());
  }

  #[test]
  fn jpeg_round_trip_preserves_dimensions() {
    let original = DynamicImage::ImageRgb8(gradient(64, 48));
    let options = ConvertOptions::new(TargetFormat::Jpeg).quality(40).unwrap();
    let (_, jpeg) = convert_bytes(&png_bytes(&original), &options).unwrap();
    let decoded = image::load_from_memory(&jpeg.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
  }

  #[test]
  fn jpeg_flattens_alpha_on_white() {
    let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));
    let converted =
      convert_image(&transparent, &ConvertOptions::new(TargetFormat::Jpeg)).unwrap();
    let decoded = image::load_from_memory(&converted.bytes).unwrap().to_rgb8();
    let pixel = decoded.get_pixel(4, 4);
    assert!(pixel.0.iter().all(|&c| c > 245), "{:?}", pixel);
  }

  #[test]
  fn png_keeps_alpha() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 128])));
    let converted = convert_image(&image, &ConvertOptions::new(TargetFormat::Png)).unwrap();
    let decoded = image::load_from_memory(&converted.bytes).unwrap();
    assert!(decoded.color().has_alpha());
  }

  #[test]
  fn ico_is_limited_to_256_pixels() {
    let image = DynamicImage::ImageRgb8(gradient(600, 300));
    let converted = convert_image(&image, &ConvertOptions::new(TargetFormat::Ico)).unwrap();
    assert_eq!((converted.width, converted.height), (256, 128));
    let decoded = image::load_from_memory(&converted.bytes).unwrap();
    assert_eq!(decoded.width(), 256);
  }

  #[test]
  fn resize_is_applied_before_encoding() {
    let image = DynamicImage::ImageRgb8(gradient(50, 50));
    let options = ConvertOptions::new(TargetFormat::Gif).resize(20, 10).unwrap();
    let converted = convert_image(&image, &options).unwrap();
    let decoded = image::load_from_memory(&converted.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (20, 10));
  }

  #[test]
  fn every_target_format_encodes() {
    let image = DynamicImage::ImageRgb8(gradient(16, 16));
    for format in TargetFormat::ALL {
      let converted = convert_image(&image, &ConvertOptions::new(format)).unwrap();
      let guessed = image::guess_format(&converted.bytes).unwrap();
      assert_eq!(guessed, format.image_format(), "{}", format);
    }
  }

  #[test]
  fn rejects_invalid_options() {
    let options = ConvertOptions::new(TargetFormat::Jpeg);
    assert!(matches!(options.quality(5), Err(ConvertError::InvalidQuality(5))));
    assert!(matches!(options.quality(101), Err(ConvertError::InvalidQuality(101))));
    assert!(matches!(options.resize(0, 10), Err(ConvertError::InvalidSize)));
    assert!(options.resize(8192, 8192).is_ok());
    assert!(matches!(
      options.resize(8193, 8192),
      Err(ConvertError::TooLarge {
        width: 8193,
        height: 8192
      })
    ));
  }

  #[test]
  fn huge_resize_is_rejected_before_allocating() {
    let png = png_bytes(&DynamicImage::ImageRgb8(gradient(4, 4)));
    assert!(matches!(
      convert_request(&png, TargetFormat::Png, None, Some(1_000_000), Some(1_000_000)),
      Err(ConvertError::TooLarge { .. })
    ));
    // 只给一边时与源图像的另一边相乘
    assert!(matches!(
      convert_request(&png, TargetFormat::Png, None, Some(u32::MAX), None),
      Err(ConvertError::TooLarge { .. })
    ));

    let options = ConvertOptions {
      resize: Some((100_000, 100_000)),
      ..ConvertOptions::new(TargetFormat::Png)
    };
    assert!(matches!(
      convert_image(&DynamicImage::ImageRgb8(gradient(4, 4)), &options),
      Err(ConvertError::TooLarge { .. })
    ));
  }

  #[test]
  fn undecodable_upload_is_an_error() {
    let result = convert_bytes(b"\x89PNG\r\n\x1a\n broken", &ConvertOptions::new(TargetFormat::Png));
    assert!(matches!(result, Err(ConvertError::Input(_))));
  }

  #[test]
  fn reports_source_info_and_names() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255])));
    let (info, converted) =
      convert_bytes(&png_bytes(&image), &ConvertOptions::new(TargetFormat::Webp)).unwrap();
    assert_eq!(info.format, "PNG");
    assert_eq!((info.width, info.height), (3, 2));
    assert_eq!(info.mode, "RGBA");
    assert_eq!(converted.file_name("scan.final.png"), "scan.final_converted.webp");
    assert_eq!(converted.file_name(""), "image_converted.webp");
  }

  #[test]
  fn partial_resize_keeps_other_side() {
    let png = png_bytes(&DynamicImage::ImageRgb8(gradient(40, 30)));
    let (_, converted) = convert_request(&png, TargetFormat::Bmp, None, Some(20), None).unwrap();
    assert_eq!((converted.width, converted.height), (20, 30));
    let (_, untouched) = convert_request(&png, TargetFormat::Bmp, Some(80), None, None).unwrap();
    assert_eq!((untouched.width, untouched.height), (40, 30));
    assert!(matches!(
      convert_request(&png, TargetFormat::Jpeg, Some(9), None, None),
      Err(ConvertError::InvalidQuality(9))
    ));
  }

  #[test]
  fn human_sizes() {
    assert_eq!(human_size(512), "512 B");
    assert_eq!(human_size(1536), "1.5 KB");
    assert_eq!(human_size(3 * 1024 * 1024), "3.00 MB");
  }
}
