// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use kanjian::{input::parse_box, model::BoundingBox};

/// Kanjian 单样本目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型服务地址
  #[arg(
    long,
    env = "KANJIAN_DETECTOR",
    default_value = "http://127.0.0.1:9000/",
    value_name = "URL",
    global = true
  )]
  pub model: Url,

  /// 标签字体文件，未指定时使用内嵌字体
  #[arg(long, value_name = "FILE", global = true)]
  pub font: Option<PathBuf>,

  #[command(subcommand)]
  pub scenario: Scenario,
}

#[derive(Subcommand, Debug)]
pub enum Scenario {
  /// 在图像中选定目标，寻找同一图像中的相似目标
  SameImage {
    #[arg(long, default_value = "data/target/jar.jpg", value_name = "FILE")]
    image: PathBuf,
    /// 目标边界框 x1,y1,x2,y2，未指定时从标准输入读取
    #[arg(long = "box", value_parser = parse_box, value_name = "BOX")]
    bbox: Option<BoundingBox>,
    #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
    threshold: f32,
    #[arg(long, default_value = "output/same_image.png", value_name = "OUTPUT")]
    output: PathBuf,
  },
  /// 在参考图像中选定目标，寻找其他图像中的相似目标
  CrossImage {
    #[arg(long, default_value = "data/reference/coke.jpeg", value_name = "FILE")]
    reference: PathBuf,
    /// 目标图像，可指定多次
    #[arg(long = "target", default_value = "data/target/test.jpg", value_name = "FILE")]
    targets: Vec<PathBuf>,
    /// 参考图像上的边界框 x1,y1,x2,y2，未指定时从标准输入读取
    #[arg(long = "box", value_parser = parse_box, value_name = "BOX")]
    bbox: Option<BoundingBox>,
    #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
    threshold: f32,
    #[arg(long, default_value = "output", value_name = "DIR")]
    output_dir: PathBuf,
  },
  /// 以文本描述检测目标
  Text {
    #[arg(long, default_value = "data/target/jar.jpg", value_name = "FILE")]
    image: PathBuf,
    /// 文本提示，未指定时从标准输入读取
    #[arg(long, value_name = "TEXT")]
    query: Option<String>,
    #[arg(long, default_value = "0.1", value_name = "THRESHOLD")]
    threshold: f32,
    #[arg(long, default_value = "output/text_prompt.png", value_name = "OUTPUT")]
    output: PathBuf,
  },
}
