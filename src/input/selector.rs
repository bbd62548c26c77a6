// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/selector.rs - 交互式边界框选择
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

use std::io::{self, BufRead, Write};

use image::RgbImage;
use tracing::info;

use crate::model::BoundingBox;

// 过小的选框视为误操作
const MIN_SPAN: f32 = 5.0;

/// 解析 "x1,y1,x2,y2" 或 "x1 y1 x2 y2"
pub fn parse_box(text: &str) -> Result<BoundingBox, String> {
  let coords = text
    .split(|c: char| c == ',' || c.is_whitespace())
    .filter(|s| !s.is_empty())
    .map(|s| {
      s.parse::<f32>()
        .map_err(|_| format!("无法解析坐标 '{}'", s))
    })
    .collect::<Result<Vec<_>, _>>()?;
  BoundingBox::try_from(coords.as_slice())
}

/// 从文本输入读取参考图像上的边界框
pub struct BoxSelector<R, W> {
  reader: R,
  writer: W,
}

impl BoxSelector<io::StdinLock<'static>, io::Stdout> {
  pub fn stdin() -> Self {
    Self::new(io::stdin().lock(), io::stdout())
  }
}

impl<R: BufRead, W: Write> BoxSelector<R, W> {
  pub fn new(reader: R, writer: W) -> Self {
    Self { reader, writer }
  }

  /// 读取一个有效选框；空行或输入结束表示放弃选择
  pub fn select_bbox(&mut self, image: &RgbImage) -> io::Result<Option<BoundingBox>> {
    let (width, height) = image.dimensions();
    loop {
      write!(
        self.writer,
        "在 {}x{} 的参考图像上输入目标边界框 x1,y1,x2,y2（回车放弃）: ",
        width, height
      )?;
      self.writer.flush()?;

      let mut line = String::new();
      if self.reader.read_line(&mut line)? == 0 {
        return Ok(None);
      }
      let line = line.trim();
      if line.is_empty() {
        return Ok(None);
      }

      let bbox = match parse_box(line) {
        Ok(bbox) => bbox,
        Err(e) => {
          writeln!(self.writer, "{}", e)?;
          continue;
        }
      };

      let bbox = BoundingBox::new(
        bbox.x1.clamp(0.0, width as f32),
        bbox.y1.clamp(0.0, height as f32),
        bbox.x2.clamp(0.0, width as f32),
        bbox.y2.clamp(0.0, height as f32),
      );
      if bbox.width() < MIN_SPAN || bbox.height() < MIN_SPAN {
        writeln!(self.writer, "选框过小（至少 {} 像素），请重新输入", MIN_SPAN)?;
        continue;
      }

      info!("选择的边界框: {:?}", bbox.to_array());
      return Ok(Some(bbox));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn select(input: &str) -> Option<BoundingBox> {
    let image = RgbImage::new(100, 80);
    let mut out = Vec::new();
    BoxSelector::new(input.as_bytes(), &mut out)
      .select_bbox(&image)
      .unwrap()
  }

  #[test]
  fn parses_both_separators() {
    assert_eq!(
      parse_box("1,2, 30 40").unwrap(),
      BoundingBox::new(1.0, 2.0, 30.0, 40.0)
    );
    assert!(parse_box("1,2,3").is_err());
    assert!(parse_box("a,b,c,d").is_err());
  }

  #[test]
  fn empty_line_aborts() {
    assert_eq!(select("\n"), None);
    assert_eq!(select(""), None);
  }

  #[test]
  fn retries_until_valid_and_clamps() {
    let bbox = select("oops\n1,1,2,2\n90,70,10,150\n").unwrap();
    assert_eq!(bbox, BoundingBox::new(10.0, 70.0, 90.0, 80.0));
  }
}
