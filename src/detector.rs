// 该文件是 Kanjian （看见） 项目的一部分。
// src/detector.rs - 开放词汇目标检测适配
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
  error::{KanjianError, Result},
  model::{DetectResult, DetectionModel},
};

pub const DEFAULT_THRESHOLD: f32 = 0.1;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.3;

/// 检测模型适配器：参数校验、阈值过滤与排序
#[derive(Clone)]
pub struct Detector {
  model: Arc<dyn DetectionModel>,
}

impl Detector {
  pub fn new(model: Arc<dyn DetectionModel>) -> Self {
    Self { model }
  }

  pub fn detect_by_text(
    &self,
    image: &RgbImage,
    query: &str,
    threshold: f32,
  ) -> Result<DetectResult> {
    self.detect_by_queries(image, &[query.to_string()], threshold)
  }

  /// 一次调用检测多个文本查询，结果标签为对应的查询文本
  pub fn detect_by_queries(
    &self,
    image: &RgbImage,
    queries: &[String],
    threshold: f32,
  ) -> Result<DetectResult> {
    check_threshold("threshold", threshold)?;
    if queries.is_empty() || queries.iter().any(|q| q.trim().is_empty()) {
      return Err(KanjianError::invalid("检测查询不能为空"));
    }

    let now = Instant::now();
    let result = self
      .model
      .detect_text(image, queries, threshold)?
      .filtered(threshold);
    debug!("文本检测耗时: {:.2?}", now.elapsed());
    info!(
      "文本检测 {:?} (阈值 {}): {} 个目标",
      queries,
      threshold,
      result.len()
    );
    Ok(result)
  }

  /// 以查询图像（裁剪出的示例）在目标图像中检测相似目标
  pub fn detect_by_example(
    &self,
    target: &RgbImage,
    query: &RgbImage,
    threshold: f32,
    nms_threshold: f32,
  ) -> Result<DetectResult> {
    check_threshold("threshold", threshold)?;
    check_threshold("nms_threshold", nms_threshold)?;
    if query.width() == 0 || query.height() == 0 {
      return Err(KanjianError::invalid("查询图像为空"));
    }

    let now = Instant::now();
    let result = self
      .model
      .detect_image(target, query, threshold, nms_threshold)?
      .filtered(threshold);
    debug!("示例检测耗时: {:.2?}", now.elapsed());
    info!("示例检测 (阈值 {}): {} 个目标", threshold, result.len());
    Ok(result)
  }
}

// 超出 [0, 1] 的阈值照常传递，只是过滤后可能为空
fn check_threshold(name: &str, value: f32) -> Result<()> {
  if value.is_nan() {
    return Err(KanjianError::invalid(format!("{} 不能为 NaN", name)));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, DetectItem, ModelError};
  use std::sync::Mutex;

  /// 返回固定候选框的模型，记录收到的阈值
  struct FixedModel {
    scores: Vec<f32>,
    seen: Mutex<Vec<f32>>,
  }

  impl FixedModel {
    fn new(scores: &[f32]) -> Arc<Self> {
      Arc::new(Self {
        scores: scores.to_vec(),
        seen: Mutex::new(Vec::new()),
      })
    }

    fn result(&self, label: &str) -> DetectResult {
      self
        .scores
        .iter()
        .enumerate()
        .map(|(i, &score)| DetectItem {
          bbox: BoundingBox::new(i as f32, 0.0, i as f32 + 5.0, 5.0),
          score,
          label: label.to_string(),
        })
        .collect()
    }
  }

  impl DetectionModel for FixedModel {
    fn detect_text(
      &self,
      _image: &RgbImage,
      queries: &[String],
      threshold: f32,
    ) -> Result<DetectResult, ModelError> {
      self.seen.lock().unwrap().push(threshold);
      Ok(self.result(&queries[0]))
    }

    fn detect_image(
      &self,
      _image: &RgbImage,
      _query: &RgbImage,
      threshold: f32,
      nms_threshold: f32,
    ) -> Result<DetectResult, ModelError> {
      self.seen.lock().unwrap().extend([threshold, nms_threshold]);
      Ok(self.result(""))
    }
  }

  struct FailingModel;

  impl DetectionModel for FailingModel {
    fn detect_text(&self, _: &RgbImage, _: &[String], _: f32) -> Result<DetectResult, ModelError> {
      Err(ModelError::Inference("device lost".into()))
    }

    fn detect_image(
      &self,
      _: &RgbImage,
      _: &RgbImage,
      _: f32,
      _: f32,
    ) -> Result<DetectResult, ModelError> {
      Err(ModelError::Inference("device lost".into()))
    }
  }

  #[test]
  fn text_detection_filters_monotonically() {
    let model = FixedModel::new(&[0.05, 0.8, 0.3, 0.1, 0.95]);
    let detector = Detector::new(model.clone());
    let image = RgbImage::new(16, 16);

    let mut previous = usize::MAX;
    for threshold in [0.0, 0.1, 0.3, 0.5, 0.9, 1.0] {
      let result = detector.detect_by_text(&image, "a cat", threshold).unwrap();
      assert!(result.iter().all(|i| i.score >= threshold));
      assert!(result.iter().all(|i| i.label == "a cat"));
      assert!(result.len() <= previous);
      previous = result.len();
    }
    assert_eq!(
      detector.detect_by_text(&image, "a cat", 0.1).unwrap().scores(),
      vec![0.95, 0.8, 0.3, 0.1]
    );
  }

  #[test]
  fn out_of_range_threshold_yields_empty_result() {
    let detector = Detector::new(FixedModel::new(&[0.99, 1.0]));
    let result = detector
      .detect_by_text(&RgbImage::new(4, 4), "a cat", 1.01)
      .unwrap();
    assert!(result.is_empty());
    assert!(result.boxes().is_empty());
    assert!(result.scores().is_empty());
  }

  #[test]
  fn invalid_arguments_are_rejected() {
    let detector = Detector::new(FixedModel::new(&[0.5]));
    let image = RgbImage::new(4, 4);
    let err = detector.detect_by_text(&image, "a cat", f32::NAN).unwrap_err();
    assert!(err.is_input_error());
    let err = detector.detect_by_text(&image, "  ", 0.1).unwrap_err();
    assert!(err.is_input_error());
    let err = detector
      .detect_by_example(&image, &RgbImage::new(0, 0), 0.1, 0.3)
      .unwrap_err();
    assert!(err.is_input_error());
  }

  #[test]
  fn example_detection_passes_nms_threshold_through() {
    let model = FixedModel::new(&[0.6, 0.2]);
    let detector = Detector::new(model.clone());
    let image = RgbImage::new(8, 8);
    let result = detector
      .detect_by_example(&image, &RgbImage::new(2, 2), 0.5, DEFAULT_NMS_THRESHOLD)
      .unwrap();
    assert_eq!(result.scores(), vec![0.6]);
    assert_eq!(*model.seen.lock().unwrap(), vec![0.5, DEFAULT_NMS_THRESHOLD]);
  }

  #[test]
  fn model_failures_propagate() {
    let detector = Detector::new(Arc::new(FailingModel));
    let err = detector
      .detect_by_text(&RgbImage::new(4, 4), "a cat", 0.1)
      .unwrap_err();
    assert!(matches!(err, KanjianError::Model(_)));
    assert!(!err.is_input_error());
  }
}
