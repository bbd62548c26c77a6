// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::{
  io::{self, BufRead, Write},
  path::Path,
  sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use args::{Args, Scenario};
use kanjian::{
  FromUrl,
  detector::Detector,
  input::{BoxSelector, load_image},
  model::{BoundingBox, DetectResult, RemoteModelBuilder},
  output::{Annotations, Draw, RandomColors, save_image},
  pipeline::OneShotPipeline,
  utils::{annotated_path, init_tracing},
};

fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();

  println!("Kanjian 单样本目标检测");
  println!("======================");
  println!("检测模型: {}", args.model);
  println!();

  let model = RemoteModelBuilder::from_url(&args.model)?.build()?;
  let pipeline = OneShotPipeline::new(Detector::new(Arc::new(model)));
  let draw = match &args.font {
    Some(path) => Draw::with_font_path(path)?,
    None => Draw::default(),
  };

  match args.scenario {
    Scenario::SameImage {
      image,
      bbox,
      threshold,
      output,
    } => {
      if !found(&image, "图像") {
        return Ok(());
      }
      let source = load_image(&image)?;
      let Some(bbox) = choose_box(bbox, &source)? else {
        println!("未选择边界框，终止");
        return Ok(());
      };

      let result = pipeline.same_image(&source, &bbox, threshold)?;
      report(&image, &result);
      render(&draw, &source, &result, &output)?;
    }
    Scenario::CrossImage {
      reference,
      targets,
      bbox,
      threshold,
      output_dir,
    } => {
      if !found(&reference, "参考图像") {
        return Ok(());
      }
      let source = load_image(&reference)?;
      let Some(bbox) = choose_box(bbox, &source)? else {
        println!("未选择边界框，终止");
        return Ok(());
      };

      // 失败的目标图像已记录日志，跳过
      let detections = pipeline.cross_image(&source, &bbox, &targets, threshold)?;
      for target in detections.successes() {
        report(&target.path, &target.result);
        let output = annotated_path(&output_dir, &target.path);
        render(&draw, &target.image, &target.result, &output)?;
      }
    }
    Scenario::Text {
      image,
      query,
      threshold,
      output,
    } => {
      if !found(&image, "图像") {
        return Ok(());
      }
      let query = match query {
        Some(query) => query,
        None => read_query()?,
      };
      let source = load_image(&image)?;
      let result = pipeline.text_prompt(&source, &query, threshold)?;
      report(&image, &result);
      render(&draw, &source, &result, &output)?;
    }
  }

  println!();
  println!("处理完成!");
  Ok(())
}

/// 文件不存在时打印提示，由调用方直接结束
fn found(path: &Path, what: &str) -> bool {
  if path.exists() {
    return true;
  }
  println!("错误: 未找到{} {}", what, path.display());
  false
}

fn choose_box(bbox: Option<BoundingBox>, image: &image::RgbImage) -> Result<Option<BoundingBox>> {
  match bbox {
    Some(bbox) => Ok(Some(bbox)),
    None => Ok(BoxSelector::stdin().select_bbox(image)?),
  }
}

fn read_query() -> Result<String> {
  print!("输入文本提示（例如 'a jar', 'cat', 'person'）: ");
  io::stdout().flush()?;
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim().to_string())
}

fn report(path: &Path, result: &DetectResult) {
  println!("{}: 检测到 {} 个对象", path.display(), result.len());
  for item in result.iter() {
    let [x1, y1, x2, y2] = item.bbox.to_array();
    println!(
      "  - {:.2}% at ({:.0}, {:.0}, {:.0}, {:.0})",
      item.score * 100.0,
      x1,
      y1,
      x2,
      y2
    );
  }
}

fn render(draw: &Draw, image: &image::RgbImage, result: &DetectResult, output: &Path) -> Result<()> {
  let annotations = Annotations::from_detections(result);
  let annotated = draw.compose(image, &annotations, &mut RandomColors::default());
  save_image(&annotated, output)?;
  info!("输出文件: {}", output.display());
  Ok(())
}
