// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型接口与数据类型
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

use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[cfg(feature = "remote_model")]
pub mod remote;
#[cfg(feature = "remote_model")]
pub use self::remote::{RemoteModel, RemoteModelBuilder, RemoteModelError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("模型响应无效: {0}")]
  InvalidResponse(String),
}

/// 开放词汇检测模型（OWL-ViT 一类），NMS 等后处理由模型自身完成
pub trait DetectionModel: Send + Sync {
  /// 以文本查询检测，结果标签为查询在 `queries` 中的文本
  fn detect_text(
    &self,
    image: &RgbImage,
    queries: &[String],
    threshold: f32,
  ) -> Result<DetectResult, ModelError>;

  /// 以示例图像检测（单样本检测）
  fn detect_image(
    &self,
    image: &RgbImage,
    query: &RgbImage,
    threshold: f32,
    nms_threshold: f32,
  ) -> Result<DetectResult, ModelError>;
}

/// 可提示分割模型（SAM 一类），每次调用只请求一个最佳掩码
pub trait SegmentationModel: Send + Sync {
  fn segment(&self, image: &RgbImage, prompt: &SegmentPrompt) -> Result<Mask, ModelError>;
}

/// 像素坐标下的边界框 [x1, y1, x2, y2]，保证 x1 <= x2, y1 <= y2
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  /// 任意两个对角点构造，自动规范化顺序
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self {
      x1: x1.min(x2),
      y1: y1.min(y2),
      x2: x1.max(x2),
      y2: y1.max(y2),
    }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn to_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }

  /// 截断为整数并限制在 `width`x`height` 内，返回 (x, y, w, h)；面积为零时返回 None
  pub fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
    let x1 = clamp(self.x1, width);
    let y1 = clamp(self.y1, height);
    let x2 = clamp(self.x2, width);
    let y2 = clamp(self.y2, height);
    if x2 <= x1 || y2 <= y1 {
      return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
  }
}

impl From<[f32; 4]> for BoundingBox {
  fn from(v: [f32; 4]) -> Self {
    BoundingBox::new(v[0], v[1], v[2], v[3])
  }
}

impl TryFrom<&[f32]> for BoundingBox {
  type Error = String;

  fn try_from(v: &[f32]) -> Result<Self, Self::Error> {
    let coords: [f32; 4] = v
      .try_into()
      .map_err(|_| format!("边界框需要 4 个坐标, 实际为 {}", v.len()))?;
    if coords.iter().any(|c| !c.is_finite()) {
      return Err(format!("边界框坐标无效: {:?}", coords));
    }
    Ok(BoundingBox::from(coords))
  }
}

impl Serialize for BoundingBox {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_array().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for BoundingBox {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let coords = Vec::<f32>::deserialize(deserializer)?;
    BoundingBox::try_from(coords.as_slice()).map_err(serde::de::Error::custom)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub bbox: BoundingBox,
  pub score: f32,
  pub label: String,
}

/// 一次检测调用的结果，按置信度降序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }

  /// 置信度最高的一项
  pub fn best(&self) -> Option<&DetectItem> {
    self
      .items
      .iter()
      .max_by(|a, b| a.score.total_cmp(&b.score))
  }

  pub fn boxes(&self) -> Vec<BoundingBox> {
    self.items.iter().map(|item| item.bbox).collect()
  }

  pub fn scores(&self) -> Vec<f32> {
    self.items.iter().map(|item| item.score).collect()
  }

  /// 仅保留 score >= threshold 的项，并按置信度降序排列
  pub fn filtered(self, threshold: f32) -> Self {
    let mut items: Vec<DetectItem> = self
      .items
      .into_vec()
      .into_iter()
      .filter(|item| item.score >= threshold)
      .collect();
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl FromIterator<DetectItem> for DetectResult {
  fn from_iter<I: IntoIterator<Item = DetectItem>>(iter: I) -> Self {
    Self {
      items: iter.into_iter().collect(),
    }
  }
}

/// 二值分割掩码，行优先存储
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
  width: u32,
  height: u32,
  data: Vec<bool>,
}

impl Mask {
  pub fn new(width: u32, height: u32, data: Vec<bool>) -> Result<Self, ModelError> {
    if data.len() != width as usize * height as usize {
      return Err(ModelError::InvalidResponse(format!(
        "掩码数据长度不匹配: 期望长度 {}, 实际长度 {}",
        width as usize * height as usize,
        data.len()
      )));
    }
    Ok(Self {
      width,
      height,
      data,
    })
  }

  pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
    let data = (0..height)
      .flat_map(|y| (0..width).map(move |x| (x, y)))
      .map(|(x, y)| f(x, y))
      .collect();
    Self {
      width,
      height,
      data,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn get(&self, x: u32, y: u32) -> bool {
    if x >= self.width || y >= self.height {
      return false;
    }
    self.data[(y * self.width + x) as usize]
  }

  pub fn pixel_count(&self) -> usize {
    self.data.iter().filter(|&&b| b).count()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLabel {
  Background = 0,
  Foreground = 1,
}

impl TryFrom<i64> for PointLabel {
  type Error = String;

  fn try_from(v: i64) -> Result<Self, Self::Error> {
    match v {
      0 => Ok(PointLabel::Background),
      1 => Ok(PointLabel::Foreground),
      other => Err(format!("提示点标签只能是 0 或 1, 实际为 {}", other)),
    }
  }
}

impl Serialize for PointLabel {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(*self as u8)
  }
}

impl<'de> Deserialize<'de> for PointLabel {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let v = i64::deserialize(deserializer)?;
    PointLabel::try_from(v).map_err(serde::de::Error::custom)
  }
}

/// 分割提示
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentPrompt {
  Points {
    points: Vec<(f32, f32)>,
    labels: Vec<PointLabel>,
  },
  Box(BoundingBox),
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(score: f32) -> DetectItem {
    DetectItem {
      bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
      score,
      label: String::new(),
    }
  }

  #[test]
  fn bounding_box_is_normalized() {
    let bbox = BoundingBox::new(30.0, 40.0, 10.0, 5.0);
    assert_eq!(bbox.to_array(), [10.0, 5.0, 30.0, 40.0]);
    assert!(bbox.x1 <= bbox.x2 && bbox.y1 <= bbox.y2);
  }

  #[test]
  fn bounding_box_from_json() {
    let bbox: BoundingBox = serde_json::from_str("[1, 2.5, 3, 4]").unwrap();
    assert_eq!(bbox, BoundingBox::new(1.0, 2.5, 3.0, 4.0));
    assert!(serde_json::from_str::<BoundingBox>("[1, 2, 3]").is_err());
    assert!(serde_json::from_str::<BoundingBox>("{\"x1\": 1}").is_err());
  }

  #[test]
  fn filtered_keeps_scores_above_threshold_in_order() {
    let result: DetectResult = [item(0.2), item(0.9), item(0.05), item(0.5)]
      .into_iter()
      .collect();
    for threshold in [0.0, 0.1, 0.2, 0.5, 0.9, 1.0, 1.01] {
      let filtered = result.clone().filtered(threshold);
      assert!(filtered.iter().all(|i| i.score >= threshold));
      let scores = filtered.scores();
      assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }
    assert_eq!(result.clone().filtered(0.2).scores(), vec![0.9, 0.5, 0.2]);
    assert!(result.filtered(1.01).is_empty());
  }

  #[test]
  fn best_picks_highest_score() {
    let result: DetectResult = [item(0.3), item(0.7), item(0.6)].into_iter().collect();
    assert_eq!(result.best().map(|i| i.score), Some(0.7));
    assert!(DetectResult::empty().best().is_none());
  }

  #[test]
  fn mask_length_is_checked() {
    assert!(Mask::new(2, 2, vec![true; 3]).is_err());
    let mask = Mask::new(2, 2, vec![true, false, false, true]).unwrap();
    assert!(mask.get(0, 0));
    assert!(!mask.get(1, 0));
    assert!(!mask.get(5, 5));
    assert_eq!(mask.pixel_count(), 2);
  }

  #[test]
  fn point_labels_only_accept_zero_and_one() {
    let labels: Vec<PointLabel> = serde_json::from_str("[1, 0]").unwrap();
    assert_eq!(labels, vec![PointLabel::Foreground, PointLabel::Background]);
    assert!(serde_json::from_str::<Vec<PointLabel>>("[2]").is_err());
  }
}
