// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 检测与分割组合流程
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

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  detector::{DEFAULT_NMS_THRESHOLD, Detector},
  error::Result,
  input::{crop_region, load_image},
  model::{BoundingBox, DetectResult},
  output::{Annotations, ColorSource, Draw, draw::QUERY_COLOR},
  router::PromptRouter,
  segmentor::Segmentor,
};

/// 自由文本指令驱动的检测加分割
pub struct DetectSegmentPipeline {
  router: Arc<dyn PromptRouter>,
  detector: Detector,
  segmentor: Segmentor,
  draw: Arc<Draw>,
}

impl DetectSegmentPipeline {
  pub fn new(
    router: Arc<dyn PromptRouter>,
    detector: Detector,
    segmentor: Segmentor,
    draw: Arc<Draw>,
  ) -> Self {
    Self {
      router,
      detector,
      segmentor,
      draw,
    }
  }

  /// 路由指令，一次检测所有查询，并为每个查询取置信度最高的框
  ///
  /// 检测查询的框以绿色绘制，标签为查询文本；分割查询的框交给分割模型。
  /// 没有匹配任何规则时返回空标注。
  pub fn annotate(&self, image: &RgbImage, prompt: &str, threshold: f32) -> Result<Annotations> {
    let routed = self.router.route(prompt);
    let queries = routed.all_queries();
    if queries.is_empty() {
      info!("指令 {:?} 未匹配任何操作", prompt);
      return Ok(Annotations::new());
    }

    let detections = self
      .detector
      .detect_by_queries(image, &queries, threshold)?;

    let mut boxed: Vec<(&str, BoundingBox)> = Vec::new();
    let mut segmented: Vec<(&str, BoundingBox)> = Vec::new();
    for item in detections.iter() {
      let query = item.label.as_str();
      if routed.detect.iter().any(|q| q == query) && !boxed.iter().any(|(q, _)| *q == query) {
        boxed.push((query, item.bbox));
      }
      if routed.segment.iter().any(|q| q == query) && !segmented.iter().any(|(q, _)| *q == query)
      {
        segmented.push((query, item.bbox));
      }
    }

    let mut annotations = Annotations::new();
    for (_, bbox) in &segmented {
      annotations.push_mask(self.segmentor.segment_by_box(image, bbox)?);
    }
    for (query, bbox) in boxed {
      annotations.push_box(bbox, query, QUERY_COLOR);
    }

    info!(
      "组合流程: {} 个边框, {} 个掩码",
      annotations.boxes.len(),
      annotations.masks.len()
    );
    Ok(annotations)
  }

  pub fn run(
    &self,
    image: &RgbImage,
    prompt: &str,
    threshold: f32,
    colors: &mut dyn ColorSource,
  ) -> Result<RgbImage> {
    let annotations = self.annotate(image, prompt, threshold)?;
    Ok(self.draw.compose(image, &annotations, colors))
  }
}

/// 以示例图像或文本进行单样本检测
#[derive(Clone)]
pub struct OneShotPipeline {
  detector: Detector,
  nms_threshold: f32,
}

impl OneShotPipeline {
  pub fn new(detector: Detector) -> Self {
    Self {
      detector,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
    }
  }

  pub fn with_nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }

  /// 在同一图像中寻找与选框内容相似的目标
  pub fn same_image(
    &self,
    image: &RgbImage,
    bbox: &BoundingBox,
    threshold: f32,
  ) -> Result<DetectResult> {
    let query = crop_region(image, bbox)?;
    let result = self
      .detector
      .detect_by_example(image, &query, threshold, self.nms_threshold)?;
    if result.is_empty() {
      info!("未检测到相似目标");
    }
    Ok(result)
  }

  /// 参考图像只裁剪一次，目标图像在迭代时逐个加载
  pub fn cross_image<'a>(
    &'a self,
    reference: &RgbImage,
    bbox: &BoundingBox,
    targets: &'a [PathBuf],
    threshold: f32,
  ) -> Result<CrossImage<'a>> {
    let query = crop_region(reference, bbox)?;
    Ok(CrossImage {
      pipeline: self,
      query,
      targets: targets.iter(),
      threshold,
    })
  }

  pub fn text_prompt(&self, image: &RgbImage, query: &str, threshold: f32) -> Result<DetectResult> {
    self.detector.detect_by_text(image, query, threshold)
  }
}

/// 跨图像检测的单个目标结果
#[derive(Debug)]
pub struct TargetDetection {
  pub path: PathBuf,
  pub image: RgbImage,
  pub result: DetectResult,
}

pub struct CrossImage<'a> {
  pipeline: &'a OneShotPipeline,
  query: RgbImage,
  targets: std::slice::Iter<'a, PathBuf>,
  threshold: f32,
}

impl<'a> CrossImage<'a> {
  /// 只保留成功的目标，失败的已在迭代时记录
  pub fn successes(self) -> impl Iterator<Item = TargetDetection> + 'a {
    self.filter_map(Result::ok)
  }

  fn detect(&self, path: &Path) -> Result<TargetDetection> {
    let image = load_image(path)?;
    let result = self.pipeline.detector.detect_by_example(
      &image,
      &self.query,
      self.threshold,
      self.pipeline.nms_threshold,
    )?;
    Ok(TargetDetection {
      path: path.to_path_buf(),
      image,
      result,
    })
  }
}

impl Iterator for CrossImage<'_> {
  type Item = Result<TargetDetection>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.targets.next()?;
    let detection = self.detect(path);
    if let Err(e) = &detection {
      warn!("处理 {} 失败: {}", path.display(), e);
    }
    Some(detection)
  }
}
