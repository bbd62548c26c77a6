// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/server.rs - HTTP 服务入口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  model::{DetectionModel, RemoteModelBuilder, SegmentationModel},
  output::Draw,
  router::RuleRouter,
  server::{self, AppState},
  utils::init_tracing,
};

/// Kanjian 检测与分割服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, env = "KANJIAN_BIND", default_value = "0.0.0.0:8000")]
  pub bind: SocketAddr,
  /// 检测模型服务地址
  #[arg(long, env = "KANJIAN_DETECTOR", value_name = "URL")]
  pub detector: Url,
  /// 分割模型服务地址，默认与检测模型相同
  #[arg(long, env = "KANJIAN_SEGMENTOR", value_name = "URL")]
  pub segmentor: Option<Url>,
  /// 标签字体文件，未指定时使用内嵌字体
  #[arg(long, env = "KANJIAN_FONT", value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 上传大小上限（MiB）
  #[arg(long, env = "KANJIAN_MAX_UPLOAD_MB", value_name = "MB")]
  pub max_upload_mb: Option<usize>,
}

fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();

  info!("监听地址: {}", args.bind);
  info!("检测模型: {}", args.detector);

  // 阻塞客户端须在异步运行时之外创建
  let detection = Arc::new(RemoteModelBuilder::from_url(&args.detector)?.build()?);
  let segmentation: Arc<dyn SegmentationModel> = match &args.segmentor {
    Some(url) if *url != args.detector => {
      info!("分割模型: {}", url);
      Arc::new(RemoteModelBuilder::from_url(url)?.build()?)
    }
    _ => detection.clone(),
  };
  let detection: Arc<dyn DetectionModel> = detection;

  let draw = match &args.font {
    Some(path) => Draw::with_font_path(path)?,
    None => Draw::default(),
  };

  let max_upload = server::upload_limit(args.max_upload_mb);

  let state = AppState::new(Arc::new(RuleRouter::default()), detection, segmentation, draw);
  let app = server::router(state.clone(), max_upload);

  let runtime = tokio::runtime::Runtime::new()?;
  runtime.block_on(async move {
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!("服务已启动: http://{}", listener.local_addr()?);
    axum::serve(listener, app)
      .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("收到中断信号，准备退出...");
      })
      .await?;
    anyhow::Ok(())
  })?;

  drop(runtime);
  drop(state);
  info!("服务已停止");
  Ok(())
}
