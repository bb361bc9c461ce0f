// 该文件是 Anjian （安检） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与上传内容输入
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

use image::{DynamicImage, ImageFormat, ImageReader, imageops};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame, input::ResizeFilter};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI scheme mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Could not decode image: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Unrecognized image format")]
  UnknownFormat,
  #[error("Unsupported image format {found}, expected one of: {expected}")]
  UnsupportedFormat { found: String, expected: String },
  #[error("Empty upload")]
  Empty,
}

pub struct ImageFileInput {
  image: Option<DynamicImage>,
  format: Option<ImageFormat>,
  filter: ResizeFilter,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemaMismatch);
    }

    let reader = ImageReader::open(url.path())?.with_guessed_format()?;
    let format = reader.format();
    let image = reader.decode()?;
    debug!("读取图像文件: {} ({:?})", url.path(), format);

    Ok(ImageFileInput {
      image: Some(image),
      format,
      filter: ResizeFilter::default(),
    })
  }
}

impl ImageFileInput {
  /// 从上传的字节内容解码图像，格式由文件头推断
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, InputError> {
    if bytes.is_empty() {
      return Err(InputError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format().ok_or(InputError::UnknownFormat)?;
    let image = reader.decode()?;
    debug!(
      "解码上传图像: {:?}, {}x{}",
      format,
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      image: Some(image),
      format: Some(format),
      filter: ResizeFilter::default(),
    })
  }

  /// 限定可接受的源格式
  pub fn accept(self, formats: &[ImageFormat]) -> Result<Self, InputError> {
    match self.format {
      Some(format) if formats.contains(&format) => Ok(self),
      found => Err(InputError::UnsupportedFormat {
        found: found
          .map(|f| format!("{:?}", f).to_uppercase())
          .unwrap_or_else(|| "unknown".to_string()),
        expected: formats
          .iter()
          .map(|f| format!("{:?}", f).to_uppercase())
          .collect::<Vec<_>>()
          .join(", "),
      }),
    }
  }

  pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
    self.filter = filter;
    self
  }

  pub fn format(&self) -> Option<ImageFormat> {
    self.format
  }

  pub fn image(&self) -> Option<&DynamicImage> {
    self.image.as_ref()
  }

  pub fn into_image(self) -> Option<DynamicImage> {
    self.image
  }

  pub fn into_nhwc<const W: u32, const H: u32>(self) -> ImageFileInputNhwc<W, H> {
    ImageFileInputNhwc { inner: self }
  }
}

pub struct ImageFileInputNhwc<const W: u32, const H: u32> {
  inner: ImageFileInput,
}

impl<const W: u32, const H: u32> Iterator for ImageFileInputNhwc<W, H> {
  type Item = RgbNhwcFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    let filter = self.inner.filter;
    self
      .inner
      .image
      .take()
      .map(|image| frame_from_image(&image, filter))
  }
}

/// 转为 RGB 并缩放到帧尺寸
pub fn frame_from_image<const W: u32, const H: u32>(
  image: &DynamicImage,
  filter: ResizeFilter,
) -> RgbNhwcFrame<W, H> {
  let rgb = image.to_rgb8();
  let resized = if rgb.dimensions() == (W, H) {
    rgb
  } else {
    imageops::resize(&rgb, W, H, filter.into())
  };

  let mut frame = RgbNhwcFrame::<W, H>::default();
  frame.as_mut().copy_from_slice(resized.as_raw());
  frame
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
  }

  #[test]
  fn decodes_png_bytes_and_reports_format() {
    let image = RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]));
    let input = ImageFileInput::from_bytes(&encode(&image, ImageFormat::Png)).unwrap();
    assert_eq!(input.format(), Some(ImageFormat::Png));
    assert_eq!(input.image().map(|i| i.width()), Some(8));
  }

  #[test]
  fn rejects_garbage_bytes() {
    let result = ImageFileInput::from_bytes(b"definitely not an image");
    assert!(matches!(result, Err(InputError::UnknownFormat)));
  }

  #[test]
  fn rejects_empty_upload() {
    assert!(matches!(
      ImageFileInput::from_bytes(&[]),
      Err(InputError::Empty)
    ));
  }

  #[test]
  fn rejects_truncated_png() {
    let image = RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]));
    let bytes = encode(&image, ImageFormat::Png);
    let result = ImageFileInput::from_bytes(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(InputError::ImageLoadError(_))));
  }

  #[test]
  fn accept_filters_formats() {
    let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
    let input = ImageFileInput::from_bytes(&encode(&image, ImageFormat::Gif)).unwrap();
    let err = input
      .accept(&[ImageFormat::Png, ImageFormat::Jpeg])
      .err()
      .unwrap();
    assert!(matches!(err, InputError::UnsupportedFormat { .. }));
    assert!(err.to_string().contains("GIF"));
  }

  #[test]
  fn resizes_into_model_frame() {
    let image = RgbImage::from_pixel(40, 20, Rgb([200, 100, 50]));
    let input = ImageFileInput::from_bytes(&encode(&image, ImageFormat::Bmp)).unwrap();
    let frames = input.into_nhwc::<8, 8>().collect::<Vec<_>>();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pixel(3, 3), [200, 100, 50]);
  }
}
