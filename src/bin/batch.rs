// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/batch.rs - 批量单样本检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::PathBuf,
  sync::{Arc, atomic::Ordering},
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use kanjian::{
  FromUrl,
  detector::{DEFAULT_THRESHOLD, Detector},
  input::{BoxSelector, load_image, parse_box},
  model::{BoundingBox, RemoteModelBuilder},
  output::{Annotations, Draw, RandomColors, save_image},
  pipeline::OneShotPipeline,
  utils::{annotated_path, init_tracing, interrupt_flag, list_images},
};

/// 在参考图像上选定目标，在目录中的每张图像里寻找相似目标
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 包含查询目标的参考图像
  #[arg(long = "reference_image", value_name = "FILE")]
  pub reference_image: PathBuf,
  /// 待处理图像目录
  #[arg(long = "target_dir", default_value = "data/target", value_name = "DIR")]
  pub target_dir: PathBuf,
  /// 标注结果输出目录
  #[arg(long = "output_dir", default_value = "output/annotated_images", value_name = "DIR")]
  pub output_dir: PathBuf,
  /// 检测置信度阈值
  #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
  pub threshold: f32,
  /// 参考图像上的目标边界框 x1,y1,x2,y2，未指定时从标准输入读取
  #[arg(long = "reference_box", value_parser = parse_box, value_name = "BOX")]
  pub reference_box: Option<BoundingBox>,
  /// 检测模型服务地址
  #[arg(
    long,
    env = "KANJIAN_DETECTOR",
    default_value = "http://127.0.0.1:9000/",
    value_name = "URL"
  )]
  pub model: Url,
}

fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();

  if !args.reference_image.exists() {
    println!("错误: 未找到参考图像 {}", args.reference_image.display());
    return Ok(());
  }

  let reference = load_image(&args.reference_image)?;
  let bbox = match args.reference_box {
    Some(bbox) => bbox,
    None => match BoxSelector::stdin().select_bbox(&reference)? {
      Some(bbox) => bbox,
      None => {
        println!("未选择边界框，终止批处理");
        return Ok(());
      }
    },
  };

  let images = list_images(&args.target_dir).unwrap_or_else(|e| {
    warn!("无法读取目录 {}: {}", args.target_dir.display(), e);
    Vec::new()
  });
  if images.is_empty() {
    println!("目录 {} 中没有图像", args.target_dir.display());
    return Ok(());
  }
  std::fs::create_dir_all(&args.output_dir)?;

  println!("开始批处理 {} 张图像...", images.len());

  let model = RemoteModelBuilder::from_url(&args.model)?.build()?;
  let pipeline = OneShotPipeline::new(Detector::new(Arc::new(model)));
  let draw = Draw::default();
  let interrupted = interrupt_flag()?;

  let mut saved = 0usize;
  // 失败的图像已记录日志，跳过
  let mut targets = pipeline
    .cross_image(&reference, &bbox, &images, args.threshold)?
    .successes();
  loop {
    if interrupted.load(Ordering::SeqCst) {
      warn!("中断信号接收，停止批处理");
      break;
    }
    let Some(target) = targets.next() else {
      break;
    };

    let annotations = Annotations::from_detections(&target.result);
    let annotated = draw.compose(&target.image, &annotations, &mut RandomColors::default());
    let output = annotated_path(&args.output_dir, &target.path);
    save_image(&annotated, &output)?;
    println!("已保存标注图像: {}", output.display());
    saved += 1;
  }

  info!("批处理完成: {}/{} 张图像", saved, images.len());
  Ok(())
}
