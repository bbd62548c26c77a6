// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/color.rs - 掩码颜色来源
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

use image::Rgb;
use rand::{Rng, SeedableRng, rngs::StdRng};

pub trait ColorSource {
  fn next_color(&mut self) -> Rgb<u8>;
}

/// 随机颜色，每个掩码取一次
pub struct RandomColors {
  rng: StdRng,
}

impl Default for RandomColors {
  fn default() -> Self {
    Self {
      rng: StdRng::from_entropy(),
    }
  }
}

impl RandomColors {
  pub fn seeded(seed: u64) -> Self {
    Self {
      rng: StdRng::seed_from_u64(seed),
    }
  }
}

impl ColorSource for RandomColors {
  fn next_color(&mut self) -> Rgb<u8> {
    Rgb([
      self.rng.gen_range(0..255),
      self.rng.gen_range(0..255),
      self.rng.gen_range(0..255),
    ])
  }
}

/// 按固定序列循环取色
pub struct SequenceColors {
  colors: Vec<Rgb<u8>>,
  index: usize,
}

impl SequenceColors {
  pub fn new(colors: Vec<Rgb<u8>>) -> Self {
    Self { colors, index: 0 }
  }

  /// 在色相环上均匀取 `n` 种颜色
  pub fn hue_wheel(n: usize) -> Self {
    let colors = (0..n.max(1))
      .map(|i| hsv_to_rgb((i as f32 / n.max(1) as f32) * 360.0, 0.8, 0.9))
      .collect();
    Self::new(colors)
  }
}

impl ColorSource for SequenceColors {
  fn next_color(&mut self) -> Rgb<u8> {
    if self.colors.is_empty() {
      return Rgb([255, 0, 0]);
    }
    let color = self.colors[self.index % self.colors.len()];
    self.index = self.index.wrapping_add(1);
    color
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
