// 该文件是 Kanjian （看见） 项目的一部分。
// tests/one_shot_tests.rs - 单样本检测批处理流程测试
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

use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};

use kanjian::{
  detector::Detector,
  input::{BoxSelector, load_image},
  model::{BoundingBox, DetectItem, DetectResult, DetectionModel, ModelError},
  output::{Annotations, Draw, SequenceColors, draw::DETECTION_COLOR, save_image},
  pipeline::OneShotPipeline,
  utils::{annotated_path, list_images},
};

/// 在目标图像中把与查询同尺寸的左上角区域作为结果，记录查询尺寸
#[derive(Default)]
struct CornerMatcher {
  queries: Mutex<Vec<(u32, u32)>>,
}

impl DetectionModel for CornerMatcher {
  fn detect_text(&self, _: &RgbImage, _: &[String], _: f32) -> Result<DetectResult, ModelError> {
    Ok(DetectResult::empty())
  }

  fn detect_image(
    &self,
    _target: &RgbImage,
    query: &RgbImage,
    _: f32,
    _: f32,
  ) -> Result<DetectResult, ModelError> {
    self.queries.lock().unwrap().push(query.dimensions());
    Ok(
      [
        DetectItem {
          bbox: BoundingBox::new(1.0, 1.0, query.width() as f32, query.height() as f32),
          score: 0.6,
          label: String::new(),
        },
        DetectItem {
          bbox: BoundingBox::new(20.0, 20.0, 30.0, 30.0),
          score: 0.05,
          label: String::new(),
        },
      ]
      .into_iter()
      .collect(),
    )
  }
}

#[test]
fn batch_over_directory_writes_annotated_images() {
  let data = tempfile::tempdir().unwrap();
  let target_dir = data.path().join("target");
  let output_dir = data.path().join("output/annotated_images");
  std::fs::create_dir_all(&target_dir).unwrap();

  let reference_path = data.path().join("reference.png");
  RgbImage::from_pixel(40, 40, Rgb([50, 60, 70]))
    .save(&reference_path)
    .unwrap();
  for name in ["b.png", "a.jpg"] {
    RgbImage::from_pixel(32, 32, Rgb([240, 240, 240]))
      .save(target_dir.join(name))
      .unwrap();
  }
  std::fs::write(target_dir.join("readme.txt"), b"skip me").unwrap();

  let reference = load_image(&reference_path).unwrap();
  let mut prompt = Vec::new();
  let bbox = BoxSelector::new("5,5,17,13\n".as_bytes(), &mut prompt)
    .select_bbox(&reference)
    .unwrap()
    .unwrap();

  let targets = list_images(&target_dir).unwrap();
  assert_eq!(targets.len(), 2);

  let model = Arc::new(CornerMatcher::default());
  let pipeline = OneShotPipeline::new(Detector::new(model.clone()));
  let draw = Draw::default();
  let mut written = Vec::new();
  for target in pipeline
    .cross_image(&reference, &bbox, &targets, 0.1)
    .unwrap()
  {
    let target = target.unwrap();
    assert_eq!(target.result.len(), 1);
    let annotated = draw.compose(
      &target.image,
      &Annotations::from_detections(&target.result),
      &mut SequenceColors::hue_wheel(1),
    );
    let output = annotated_path(&output_dir, &target.path);
    save_image(&annotated, &output).unwrap();
    written.push(output);
  }

  assert_eq!(
    written,
    vec![
      output_dir.join("annotated_a.jpg"),
      output_dir.join("annotated_b.png")
    ]
  );
  let saved = load_image(&written[1]).unwrap();
  assert_eq!(saved.get_pixel(1, 5), &DETECTION_COLOR);
  assert_eq!(*model.queries.lock().unwrap(), vec![(12, 8), (12, 8)]);
}

#[test]
fn same_image_with_empty_result_leaves_image_untouched() {
  let image = RgbImage::from_fn(30, 30, |x, y| Rgb([x as u8 * 8, y as u8 * 8, 100]));
  let pipeline = OneShotPipeline::new(Detector::new(Arc::new(CornerMatcher::default())));
  let result = pipeline
    .same_image(&image, &BoundingBox::new(0.0, 0.0, 6.0, 6.0), 0.9)
    .unwrap();
  assert!(result.is_empty());

  let out = Draw::default().compose(
    &image,
    &Annotations::from_detections(&result),
    &mut SequenceColors::hue_wheel(1),
  );
  assert_eq!(out, image);
}
