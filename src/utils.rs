// 该文件是 Kanjian （看见） 项目的一部分。
// src/utils.rs - 通用工具
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 初始化日志，`RUST_LOG` 未设置时使用 info 级别
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 安装 Ctrl-C 处理器，返回中断标志；再过 30 秒仍未退出则强制结束
pub fn interrupt_flag() -> Result<Arc<AtomicBool>, ctrlc::Error> {
  let flag = Arc::new(AtomicBool::new(false));
  let handler_flag = flag.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handler_flag.store(true, Ordering::SeqCst);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(flag)
}

const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// 目录下所有 jpg/png 文件，按文件名排序
pub fn list_images(dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
  let mut images = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    if !path.is_file() {
      continue;
    }
    let matched = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
    if matched {
      images.push(path);
    }
  }
  images.sort();
  Ok(images)
}

/// `annotated_<文件名>`，放在输出目录下
pub fn annotated_path(output_dir: impl AsRef<Path>, source: &Path) -> PathBuf {
  let name = source
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  output_dir.as_ref().join(format!("annotated_{}", name))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lists_only_images_sorted() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.jpg", "c.JPG", "notes.txt", "d.jpeg"] {
      std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    std::fs::create_dir(dir.path().join("e.png")).unwrap();

    let names: Vec<_> = list_images(dir.path())
      .unwrap()
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["a.jpg", "b.png", "c.JPG"]);
  }

  #[test]
  fn missing_directory_is_an_error() {
    assert!(list_images("/nonexistent/kanjian/targets").is_err());
  }

  #[test]
  fn annotated_name() {
    assert_eq!(
      annotated_path("out/annotated_images", Path::new("data/target/jar.jpg")),
      PathBuf::from("out/annotated_images/annotated_jar.jpg")
    );
  }
}
