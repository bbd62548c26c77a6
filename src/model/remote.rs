// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/remote.rs - 远程推理服务模型
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

use std::time::{Duration, Instant};

use image::RgbImage;
use reqwest::blocking::{
  Client,
  multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  model::{
    BoundingBox, DetectItem, DetectResult, DetectionModel, Mask, ModelError, SegmentPrompt,
    SegmentationModel,
  },
  output::encode_png,
};

const REMOTE_SCHEMES: [&str; 2] = ["http", "https"];

#[derive(Error, Debug)]
pub enum RemoteModelError {
  #[error("URI 方案不匹配: 期望 http 或 https, 实际为 '{0}'")]
  SchemeMismatch(String),
  #[error("HTTP 客户端错误: {0}")]
  ClientError(#[from] reqwest::Error),
}

impl From<reqwest::Error> for ModelError {
  fn from(err: reqwest::Error) -> Self {
    ModelError::Inference(err.to_string())
  }
}

pub struct RemoteModelBuilder {
  base: Url,
  timeout: Option<Duration>,
}

impl FromUrl for RemoteModelBuilder {
  type Error = RemoteModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if !REMOTE_SCHEMES.contains(&url.scheme()) {
      error!("URI scheme mismatch: found '{}'", url.scheme());
      return Err(RemoteModelError::SchemeMismatch(url.scheme().to_string()));
    }

    // 保证以 '/' 结尾，join 时才不会丢掉最后一段路径
    let mut base = url.clone();
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    Ok(RemoteModelBuilder {
      base,
      timeout: None,
    })
  }
}

impl RemoteModelBuilder {
  /// 默认不设超时，推理调用一旦开始就会等待完成
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn build(self) -> Result<RemoteModel, RemoteModelError> {
    info!("连接远程推理服务: {}", self.base);
    let client = Client::builder().timeout(self.timeout).build()?;
    Ok(RemoteModel {
      client,
      base: self.base,
    })
  }
}

/// 通过 HTTP 调用外部推理服务的 OWL-ViT / SAM 模型
pub struct RemoteModel {
  client: Client,
  base: Url,
}

impl RemoteModel {
  fn endpoint(&self, path: &str) -> Result<Url, ModelError> {
    self
      .base
      .join(path)
      .map_err(|e| ModelError::Inference(format!("无效的服务地址: {}", e)))
  }

  fn image_part(image: &RgbImage, name: &str) -> Result<Part, ModelError> {
    let bytes = encode_png(image).map_err(|e| ModelError::Inference(e.to_string()))?;
    Ok(
      Part::bytes(bytes)
        .file_name(format!("{}.png", name))
        .mime_str("image/png")?,
    )
  }

  fn post_detection(
    &self,
    path: &str,
    form: Form,
    queries: &[String],
  ) -> Result<DetectResult, ModelError> {
    let url = self.endpoint(path)?;
    let now = Instant::now();
    let response: DetectionResponse = self
      .client
      .post(url)
      .multipart(form)
      .send()?
      .error_for_status()?
      .json()?;
    debug!("远程检测完成，耗时: {:.2?}", now.elapsed());
    response.into_result(queries)
  }
}

impl DetectionModel for RemoteModel {
  fn detect_text(
    &self,
    image: &RgbImage,
    queries: &[String],
    threshold: f32,
  ) -> Result<DetectResult, ModelError> {
    let queries_json =
      serde_json::to_string(queries).map_err(|e| ModelError::Inference(e.to_string()))?;
    let form = Form::new()
      .part("image", Self::image_part(image, "image")?)
      .text("queries", queries_json)
      .text("threshold", threshold.to_string());
    self.post_detection("detect/text", form, queries)
  }

  fn detect_image(
    &self,
    image: &RgbImage,
    query: &RgbImage,
    threshold: f32,
    nms_threshold: f32,
  ) -> Result<DetectResult, ModelError> {
    let form = Form::new()
      .part("image", Self::image_part(image, "image")?)
      .part("query_image", Self::image_part(query, "query")?)
      .text("threshold", threshold.to_string())
      .text("nms_threshold", nms_threshold.to_string());
    self.post_detection("detect/image", form, &[])
  }
}

impl SegmentationModel for RemoteModel {
  fn segment(&self, image: &RgbImage, prompt: &SegmentPrompt) -> Result<Mask, ModelError> {
    let url = self.endpoint("segment")?;
    let form = Form::new()
      .part("image", Self::image_part(image, "image")?)
      .text("prompt", prompt_json(prompt).to_string())
      .text("multimask", "false");

    let now = Instant::now();
    let bytes = self
      .client
      .post(url)
      .multipart(form)
      .send()?
      .error_for_status()?
      .bytes()?;
    debug!("远程分割完成，耗时: {:.2?}", now.elapsed());
    decode_mask(&bytes)
  }
}

fn prompt_json(prompt: &SegmentPrompt) -> serde_json::Value {
  match prompt {
    SegmentPrompt::Points { points, labels } => json!({
      "points": points.iter().map(|&(x, y)| [x, y]).collect::<Vec<_>>(),
      "labels": labels,
    }),
    SegmentPrompt::Box(bbox) => json!({ "box": bbox }),
  }
}

/// 单通道 PNG，非零像素属于掩码
fn decode_mask(bytes: &[u8]) -> Result<Mask, ModelError> {
  let gray = image::load_from_memory(bytes)
    .map_err(|e| ModelError::InvalidResponse(format!("掩码图像无法解码: {}", e)))?
    .to_luma8();
  let (width, height) = gray.dimensions();
  Mask::new(width, height, gray.pixels().map(|p| p[0] > 0).collect())
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
  #[serde(default)]
  boxes: Vec<[f32; 4]>,
  #[serde(default)]
  scores: Vec<f32>,
  #[serde(default)]
  labels: Option<Vec<usize>>,
}

impl DetectionResponse {
  fn into_result(self, queries: &[String]) -> Result<DetectResult, ModelError> {
    if self.boxes.len() != self.scores.len() {
      return Err(ModelError::InvalidResponse(format!(
        "边界框数量 {} 与分数数量 {} 不一致",
        self.boxes.len(),
        self.scores.len()
      )));
    }
    if let Some(labels) = &self.labels
      && labels.len() != self.boxes.len()
    {
      return Err(ModelError::InvalidResponse(format!(
        "标签数量 {} 与边界框数量 {} 不一致",
        labels.len(),
        self.boxes.len()
      )));
    }

    let labels = self.labels.unwrap_or_default();
    self
      .boxes
      .into_iter()
      .zip(self.scores)
      .enumerate()
      .map(|(i, (bbox, score))| {
        let label = match labels.get(i) {
          Some(&idx) => queries.get(idx).cloned().ok_or_else(|| {
            ModelError::InvalidResponse(format!("标签索引 {} 超出查询数量 {}", idx, queries.len()))
          })?,
          None if queries.len() == 1 => queries[0].clone(),
          None => String::new(),
        };
        Ok(DetectItem {
          bbox: BoundingBox::from(bbox),
          score,
          label,
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::PointLabel;
  use image::{GrayImage, Luma};

  fn queries() -> Vec<String> {
    vec!["a cat".to_string(), "a dog".to_string()]
  }

  #[test]
  fn builder_requires_http_scheme() {
    let url = Url::parse("ftp://localhost/models").unwrap();
    assert!(matches!(
      RemoteModelBuilder::from_url(&url),
      Err(RemoteModelError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn builder_keeps_path_prefix() {
    let url = Url::parse("http://localhost:9000/v1").unwrap();
    let model = RemoteModelBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(
      model.endpoint("detect/text").unwrap().as_str(),
      "http://localhost:9000/v1/detect/text"
    );
  }

  #[test]
  fn detection_response_maps_label_indices_to_queries() {
    let response: DetectionResponse = serde_json::from_str(
      r#"{"boxes": [[1, 2, 3, 4], [5, 6, 7, 8]], "scores": [0.9, 0.4], "labels": [1, 0]}"#,
    )
    .unwrap();
    let result = response.into_result(&queries()).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.items[0].label, "a dog");
    assert_eq!(result.items[1].label, "a cat");
    assert_eq!(result.items[1].bbox, BoundingBox::new(5.0, 6.0, 7.0, 8.0));
  }

  #[test]
  fn detection_response_without_fields_is_empty() {
    let response: DetectionResponse = serde_json::from_str("{}").unwrap();
    assert!(response.into_result(&[]).unwrap().is_empty());
  }

  #[test]
  fn detection_response_rejects_mismatched_lengths() {
    let response: DetectionResponse =
      serde_json::from_str(r#"{"boxes": [[1, 2, 3, 4]], "scores": []}"#).unwrap();
    assert!(response.into_result(&queries()).is_err());

    let response: DetectionResponse =
      serde_json::from_str(r#"{"boxes": [[1, 2, 3, 4]], "scores": [0.5], "labels": [7]}"#)
        .unwrap();
    assert!(response.into_result(&queries()).is_err());
  }

  #[test]
  fn mask_png_is_thresholded_at_zero() {
    let gray = GrayImage::from_fn(4, 3, |x, _| Luma([if x < 2 { 0 } else { 255 }]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    gray.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    let mask = decode_mask(bytes.get_ref()).unwrap();
    assert_eq!(mask.dimensions(), (4, 3));
    assert_eq!(mask.pixel_count(), 6);
    assert!(mask.get(3, 2));
    assert!(!mask.get(0, 0));
  }

  #[test]
  fn prompt_json_layout() {
    let points = SegmentPrompt::Points {
      points: vec![(10.0, 20.0)],
      labels: vec![PointLabel::Foreground],
    };
    assert_eq!(
      prompt_json(&points),
      json!({"points": [[10.0, 20.0]], "labels": [1]})
    );
    let bbox = SegmentPrompt::Box(BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    assert_eq!(prompt_json(&bbox), json!({"box": [1.0, 2.0, 3.0, 4.0]}));
  }
}
