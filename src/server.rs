// 该文件是 Kanjian （看见） 项目的一部分。
// src/server.rs - HTTP 服务
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

//! 六个图像处理端点，均接收 multipart 表单并返回 PNG。
//!
//! 模型调用与图像编解码都是同步的，放在 `spawn_blocking` 线程上执行。
//! 输入校验失败返回 422，其余失败返回 500，响应体为纯文本错误信息。

use std::{collections::HashMap, sync::Arc};

use axum::{
  Router,
  body::Bytes,
  extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
  http::{StatusCode, header},
  response::{Html, IntoResponse, Response},
  routing::{get, post},
};
use image::RgbImage;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::{
  detector::{DEFAULT_NMS_THRESHOLD, DEFAULT_THRESHOLD, Detector},
  error::KanjianError,
  input::decode_image,
  model::{BoundingBox, DetectionModel, PointLabel, SegmentationModel},
  output::{Annotations, Draw, RandomColors, encode_png},
  pipeline::DetectSegmentPipeline,
  router::PromptRouter,
  segmentor::{Segmentation, Segmentor},
};

pub const DEFAULT_MAX_UPLOAD: usize = 32 * 1024 * 1024;

/// 以 MiB 为单位的上传上限换算为字节，过大时取 `usize::MAX`
pub fn upload_limit(max_upload_mb: Option<usize>) -> usize {
  max_upload_mb
    .map(|mb| mb.saturating_mul(1024 * 1024))
    .unwrap_or(DEFAULT_MAX_UPLOAD)
}

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// 各端点共享的只读状态
#[derive(Clone)]
pub struct AppState {
  detector: Detector,
  segmentor: Segmentor,
  pipeline: Arc<DetectSegmentPipeline>,
  draw: Arc<Draw>,
  color_seed: Option<u64>,
}

impl AppState {
  pub fn new(
    router: Arc<dyn PromptRouter>,
    detection: Arc<dyn DetectionModel>,
    segmentation: Arc<dyn SegmentationModel>,
    draw: Draw,
  ) -> Self {
    let detector = Detector::new(detection);
    let segmentor = Segmentor::new(segmentation, detector.clone());
    let draw = Arc::new(draw);
    let pipeline = Arc::new(DetectSegmentPipeline::new(
      router,
      detector.clone(),
      segmentor.clone(),
      draw.clone(),
    ));
    Self {
      detector,
      segmentor,
      pipeline,
      draw,
      color_seed: None,
    }
  }

  /// 固定掩码配色的随机种子，输出可复现
  pub fn with_color_seed(mut self, seed: u64) -> Self {
    self.color_seed = Some(seed);
    self
  }

  fn colors(&self) -> RandomColors {
    match self.color_seed {
      Some(seed) => RandomColors::seeded(seed),
      None => RandomColors::default(),
    }
  }
}

pub fn router(state: AppState, max_upload: usize) -> Router {
  Router::new()
    .route("/", get(index))
    .route("/health", get(health))
    .route("/detect-and-segment/", post(detect_and_segment))
    .route("/detect-from-text/", post(detect_from_text))
    .route("/detect-from-image-prompt/", post(detect_from_image_prompt))
    .route("/segment-with-points/", post(segment_with_points))
    .route("/segment-with-box/", post(segment_with_box))
    .route("/segment-with-text/", post(segment_with_text))
    .layer(DefaultBodyLimit::max(max_upload))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("缺少表单字段 {0}")]
  MissingField(&'static str),
  #[error("表单字段 {field} 无效: {reason}")]
  InvalidField { field: &'static str, reason: String },
  #[error("表单解析失败: {0}")]
  Multipart(#[from] MultipartError),
  #[error(transparent)]
  Kanjian(#[from] KanjianError),
  #[error("后台任务失败: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::MissingField(_) | ApiError::InvalidField { .. } => {
        StatusCode::UNPROCESSABLE_ENTITY
      }
      ApiError::Multipart(err) => err.status(),
      ApiError::Kanjian(err) if err.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Kanjian(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求处理失败: {}", self);
    } else {
      warn!("请求无效: {}", self);
    }
    (status, self.to_string()).into_response()
  }
}

/// 整个 multipart 表单，按字段名收集
struct Form {
  fields: HashMap<String, Bytes>,
}

impl Form {
  async fn collect(mut multipart: Multipart) -> Result<Self, ApiError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await? {
      let Some(name) = field.name().map(str::to_owned) else {
        continue;
      };
      let data = field.bytes().await?;
      fields.insert(name, data);
    }
    Ok(Self { fields })
  }

  fn bytes(&self, name: &'static str) -> Result<Bytes, ApiError> {
    self
      .fields
      .get(name)
      .cloned()
      .ok_or(ApiError::MissingField(name))
  }

  fn text(&self, name: &'static str) -> Result<String, ApiError> {
    let data = self.bytes(name)?;
    String::from_utf8(data.to_vec()).map_err(|e| ApiError::InvalidField {
      field: name,
      reason: e.to_string(),
    })
  }

  fn json<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, ApiError> {
    let data = self.bytes(name)?;
    serde_json::from_slice(&data).map_err(|e| ApiError::InvalidField {
      field: name,
      reason: e.to_string(),
    })
  }

  fn threshold(&self) -> Result<f32, ApiError> {
    let text = self.text("threshold")?;
    text.trim().parse().map_err(|_| ApiError::InvalidField {
      field: "threshold",
      reason: format!("无法解析为数值: {:?}", text),
    })
  }
}

/// 在阻塞线程上执行处理并编码为 PNG 响应
async fn render<F>(job: F) -> Result<Response, ApiError>
where
  F: FnOnce() -> Result<RgbImage, KanjianError> + Send + 'static,
{
  let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, KanjianError> {
    let image = job()?;
    Ok(encode_png(&image)?)
  })
  .await??;
  Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn index() -> Html<&'static str> {
  Html(INDEX_HTML)
}

async fn health() -> &'static str {
  "ok"
}

async fn detect_and_segment(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Response, ApiError> {
  let form = Form::collect(multipart).await?;
  let prompt = form.text("prompt")?;
  let image = form.bytes("image_file")?;

  render(move || {
    let image = decode_image(&image)?;
    state
      .pipeline
      .run(&image, &prompt, DEFAULT_THRESHOLD, &mut state.colors())
  })
  .await
}

async fn detect_from_text(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Response, ApiError> {
  let form = Form::collect(multipart).await?;
  let query = form.text("text_prompt")?;
  let image = form.bytes("image_file")?;
  let threshold = form.threshold()?;

  render(move || {
    let image = decode_image(&image)?;
    let result = state.detector.detect_by_text(&image, &query, threshold)?;
    let annotations = Annotations::from_detections(&result);
    Ok(state.draw.compose(&image, &annotations, &mut state.colors()))
  })
  .await
}

async fn detect_from_image_prompt(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Response, ApiError> {
  let form = Form::collect(multipart).await?;
  let target = form.bytes("target_image_file")?;
  let query = form.bytes("query_image_file")?;
  let threshold = form.threshold()?;

  render(move || {
    let target = decode_image(&target)?;
    let query = decode_image(&query)?;
    let result = state
      .detector
      .detect_by_example(&target, &query, threshold, DEFAULT_NMS_THRESHOLD)?;
    let annotations = Annotations::from_detections(&result);
    Ok(state.draw.compose(&target, &annotations, &mut state.colors()))
  })
  .await
}

async fn segment_with_points(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Response, ApiError> {
  let form = Form::collect(multipart).await?;
  let points: Vec<[f32; 2]> = form.json("points")?;
  let labels: Vec<PointLabel> = form.json("labels")?;
  let image = form.bytes("image_file")?;

  render(move || {
    let image = decode_image(&image)?;
    let points: Vec<(f32, f32)> = points.into_iter().map(|[x, y]| (x, y)).collect();
    let mask = state.segmentor.segment_by_points(&image, &points, &labels)?;
    let annotations = Annotations::from_mask(mask);
    Ok(state.draw.compose(&image, &annotations, &mut state.colors()))
  })
  .await
}

async fn segment_with_box(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Response, ApiError> {
  let form = Form::collect(multipart).await?;
  let bbox: BoundingBox = form.json("box")?;
  let image = form.bytes("image_file")?;

  render(move || {
    let image = decode_image(&image)?;
    let mask = state.segmentor.segment_by_box(&image, &bbox)?;
    let annotations = Annotations::from_mask(mask);
    Ok(state.draw.compose(&image, &annotations, &mut state.colors()))
  })
  .await
}

async fn segment_with_text(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<Response, ApiError> {
  let form = Form::collect(multipart).await?;
  let query = form.text("text_prompt")?;
  let image = form.bytes("image_file")?;

  render(move || {
    let image = decode_image(&image)?;
    match state.segmentor.segment_by_text(&image, &query)? {
      Segmentation::Mask(mask) => {
        let annotations = Annotations::from_mask(mask);
        Ok(state.draw.compose(&image, &annotations, &mut state.colors()))
      }
      Segmentation::NotFound => Ok(image),
    }
  })
  .await
}
