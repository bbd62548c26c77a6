// 该文件是 Kanjian （看见） 项目的一部分。
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

use std::path::Path;

use image::{ImageReader, RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use crate::model::BoundingBox;

mod selector;
pub use self::selector::{BoxSelector, parse_box};

#[derive(Error, Debug)]
pub enum ImageIoError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image decoding error: {0}")]
  DecodeError(image::ImageError),
  #[error("Image encoding error: {0}")]
  EncodeError(image::ImageError),
  #[error("Crop region {0:?} is empty after clamping to {1}x{2}")]
  EmptyRegion(BoundingBox, u32, u32),
}

impl ImageIoError {
  /// 由上传内容或裁剪参数导致的错误
  pub fn is_decode_error(&self) -> bool {
    matches!(
      self,
      ImageIoError::DecodeError(_) | ImageIoError::EmptyRegion(..)
    )
  }
}

/// 解码内存中的图像数据（上传文件），统一转换为 RGB
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageIoError> {
  let image = image::load_from_memory(bytes).map_err(ImageIoError::DecodeError)?;
  debug!("解码图像: {}x{}", image.width(), image.height());
  Ok(image.to_rgb8())
}

/// 从文件读取图像，统一转换为 RGB
pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, ImageIoError> {
  let image = ImageReader::open(path.as_ref())?
    .with_guessed_format()?
    .decode()
    .map_err(ImageIoError::DecodeError)?;
  Ok(image.to_rgb8())
}

/// 裁剪边界框区域，坐标截断为整数并限制在图像范围内
pub fn crop_region(image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage, ImageIoError> {
  let (x, y, w, h) = bbox
    .pixel_rect(image.width(), image.height())
    .ok_or(ImageIoError::EmptyRegion(*bbox, image.width(), image.height()))?;
  Ok(imageops::crop_imm(image, x, y, w, h).to_image())
}
