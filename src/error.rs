// 该文件是 Kanjian （看见） 项目的一部分。
// src/error.rs - 错误定义
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

use thiserror::Error;

use crate::{input::ImageIoError, model::ModelError};

#[derive(Error, Debug)]
pub enum KanjianError {
  #[error("图像错误: {0}")]
  Image(#[from] ImageIoError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("提示点数量与标签数量不一致: {points} 个点, {labels} 个标签")]
  InputMismatch { points: usize, labels: usize },
  #[error("输入无效: {0}")]
  InvalidInput(String),
  #[error("掩码尺寸 {mask_width}x{mask_height} 与图像尺寸 {image_width}x{image_height} 不一致")]
  MaskShape {
    mask_width: u32,
    mask_height: u32,
    image_width: u32,
    image_height: u32,
  },
}

impl KanjianError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    KanjianError::InvalidInput(msg.into())
  }

  /// 是否为调用方输入导致的错误（而非模型或内部故障）
  pub fn is_input_error(&self) -> bool {
    match self {
      KanjianError::InputMismatch { .. } | KanjianError::InvalidInput(_) => true,
      KanjianError::Image(err) => err.is_decode_error(),
      KanjianError::Model(_) | KanjianError::MaskShape { .. } => false,
    }
  }
}

pub type Result<T, E = KanjianError> = std::result::Result<T, E>;
