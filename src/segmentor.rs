// 该文件是 Kanjian （看见） 项目的一部分。
// src/segmentor.rs - 可提示分割适配
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

use std::{sync::Arc, time::Instant};

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  detector::{DEFAULT_THRESHOLD, Detector},
  error::{KanjianError, Result},
  model::{BoundingBox, Mask, PointLabel, SegmentPrompt, SegmentationModel},
};

/// 文本分割的结果：找到目标时为掩码，否则原图不加遮罩
#[derive(Debug, Clone, PartialEq)]
pub enum Segmentation {
  Mask(Mask),
  NotFound,
}

impl Segmentation {
  pub fn mask(&self) -> Option<&Mask> {
    match self {
      Segmentation::Mask(mask) => Some(mask),
      Segmentation::NotFound => None,
    }
  }
}

#[derive(Clone)]
pub struct Segmentor {
  model: Arc<dyn SegmentationModel>,
  detector: Detector,
}

impl Segmentor {
  /// `detector` 用于文本提示先检测出边界框
  pub fn new(model: Arc<dyn SegmentationModel>, detector: Detector) -> Self {
    Self { model, detector }
  }

  pub fn segment_by_points(
    &self,
    image: &RgbImage,
    points: &[(f32, f32)],
    labels: &[PointLabel],
  ) -> Result<Mask> {
    if points.len() != labels.len() {
      return Err(KanjianError::InputMismatch {
        points: points.len(),
        labels: labels.len(),
      });
    }
    if points.is_empty() {
      return Err(KanjianError::invalid("至少需要一个提示点"));
    }
    if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
      return Err(KanjianError::invalid("提示点坐标无效"));
    }

    let prompt = SegmentPrompt::Points {
      points: points.to_vec(),
      labels: labels.to_vec(),
    };
    self.run(image, &prompt)
  }

  pub fn segment_by_box(&self, image: &RgbImage, bbox: &BoundingBox) -> Result<Mask> {
    self.run(image, &SegmentPrompt::Box(*bbox))
  }

  /// 先以固定阈值检测文本目标，取置信度最高的框进行分割
  pub fn segment_by_text(&self, image: &RgbImage, text: &str) -> Result<Segmentation> {
    let detections = self
      .detector
      .detect_by_text(image, text, DEFAULT_THRESHOLD)?;

    let Some(best) = detections.best() else {
      info!("未检测到 {:?}，返回原图", text);
      return Ok(Segmentation::NotFound);
    };

    debug!("以 {:?} (score {:.2}) 作为分割提示", best.bbox.to_array(), best.score);
    self.segment_by_box(image, &best.bbox).map(Segmentation::Mask)
  }

  fn run(&self, image: &RgbImage, prompt: &SegmentPrompt) -> Result<Mask> {
    let now = Instant::now();
    let mask = self.model.segment(image, prompt)?;
    debug!("分割耗时: {:.2?}", now.elapsed());

    if mask.dimensions() != image.dimensions() {
      return Err(KanjianError::MaskShape {
        mask_width: mask.width(),
        mask_height: mask.height(),
        image_width: image.width(),
        image_height: image.height(),
      });
    }
    info!("分割完成: {} 个掩码像素", mask.pixel_count());
    Ok(mask)
  }
}
