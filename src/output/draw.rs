// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 检测与分割结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  model::{BoundingBox, DetectResult, Mask},
  output::ColorSource,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_OFFSET: i32 = 20; // 标签位于边框上方的距离
const BOX_THICKNESS: i32 = 3;
const MASK_ALPHA: u8 = 128;

/// 检测结果边框颜色（红色）
pub const DETECTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// 查询结果边框颜色（绿色）
pub const QUERY_COLOR: Rgb<u8> = Rgb([0, 128, 0]);

// DejaVu Sans，许可见 assets/font-LICENSE.txt
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum FontError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxAnnotation {
  pub bbox: BoundingBox,
  pub caption: String,
  pub color: Rgb<u8>,
}

/// 待绘制的边框与掩码，按输入顺序绘制，掩码总在边框之下
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
  pub boxes: Vec<BoxAnnotation>,
  pub masks: Vec<Mask>,
}

impl Annotations {
  pub fn new() -> Self {
    Self::default()
  }

  /// 检测结果：红色边框，标签为置信度
  pub fn from_detections(result: &DetectResult) -> Self {
    let boxes = result
      .iter()
      .map(|item| BoxAnnotation {
        bbox: item.bbox,
        caption: format!("Score: {:.2}", item.score),
        color: DETECTION_COLOR,
      })
      .collect();
    Self {
      boxes,
      masks: Vec::new(),
    }
  }

  pub fn from_mask(mask: Mask) -> Self {
    Self {
      boxes: Vec::new(),
      masks: vec![mask],
    }
  }

  pub fn push_box(&mut self, bbox: BoundingBox, caption: impl Into<String>, color: Rgb<u8>) {
    self.boxes.push(BoxAnnotation {
      bbox,
      caption: caption.into(),
      color,
    });
  }

  pub fn push_mask(&mut self, mask: Mask) {
    self.masks.push(mask);
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty() && self.masks.is_empty()
  }
}

pub struct Draw {
  font: FontArc,
  font_size: f32,
  label_offset: i32,
  box_thickness: i32,
  mask_alpha: u8,
}

impl Default for Draw {
  /// 使用内嵌字体
  fn default() -> Self {
    let font = FontArc::try_from_slice(EMBEDDED_FONT).expect("无法加载嵌入的字体文件");

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_offset: LABEL_OFFSET,
      box_thickness: BOX_THICKNESS,
      mask_alpha: MASK_ALPHA,
    }
  }
}

impl Draw {
  /// 以字体文件替换内嵌字体
  pub fn with_font_path(path: impl AsRef<Path>) -> Result<Self, FontError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|_| FontError::InvalidFont(path.display().to_string()))?;
    info!("加载字体: {}", path.display());
    Ok(Self {
      font,
      ..Self::default()
    })
  }

  /// 在图像副本上先叠加掩码再绘制边框与标签，不修改输入图像
  pub fn compose(
    &self,
    image: &RgbImage,
    annotations: &Annotations,
    colors: &mut dyn ColorSource,
  ) -> RgbImage {
    let mut canvas = image.clone();

    for mask in &annotations.masks {
      let color = colors.next_color();
      self.blend_mask(&mut canvas, mask, color);
    }

    for annotation in &annotations.boxes {
      self.draw_box_with_label(&mut canvas, annotation);
    }

    debug!(
      "绘制完成: {} 个掩码, {} 个边框",
      annotations.masks.len(),
      annotations.boxes.len()
    );
    canvas
  }

  fn blend_mask(&self, image: &mut RgbImage, mask: &Mask, color: Rgb<u8>) {
    if mask.dimensions() != image.dimensions() {
      warn!(
        "掩码尺寸 {:?} 与图像尺寸 {:?} 不一致，跳过",
        mask.dimensions(),
        image.dimensions()
      );
      return;
    }

    let alpha = self.mask_alpha as u16;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
      if !mask.get(x, y) {
        continue;
      }
      for c in 0..3 {
        let blended = (pixel[c] as u16 * (255 - alpha) + color[c] as u16 * alpha + 127) / 255;
        pixel[c] = blended as u8;
      }
    }
  }

  fn draw_box_with_label(&self, image: &mut RgbImage, annotation: &BoxAnnotation) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let bbox = &annotation.bbox;
    // Clamp to image bounds
    let x_min = (bbox.x1.round() as i32).clamp(0, w - 1);
    let y_min = (bbox.y1.round() as i32).clamp(0, h - 1);
    let x_max = (bbox.x2.round() as i32).clamp(0, w - 1);
    let y_max = (bbox.y2.round() as i32).clamp(0, h - 1);

    // 边框向内加粗
    for t in 0..self.box_thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, annotation.color);
    }

    if annotation.caption.is_empty() {
      return;
    }

    // 标签位于边框上方，靠近图像顶部时贴住上边缘
    let label_y = (y_min - self.label_offset).max(0);
    draw_text_mut(
      image,
      annotation.color,
      x_min,
      label_y,
      PxScale::from(self.font_size),
      &self.font,
      &annotation.caption,
    );
  }
}
