// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/overlay.rs - 检测结果叠加层
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

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{info, trace};

use crate::frame::{PixelRect, Size};

// 部分叠加后端要求缓冲区宽度为 32 的倍数、高度为 16 的倍数
const BUFFER_WIDTH_ALIGN: u32 = 32;
const BUFFER_HEIGHT_ALIGN: u32 = 16;

pub const DEFAULT_COLOR: Rgba<u8> = Rgba([0xFF, 0, 0, 0xFF]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const DEFAULT_FONT_SIZE: f32 = 22.0;
const LINE_SPACING: f32 = 4.0;
const CANVAS_WEIGHT: f32 = 0.5;
const FRAME_WEIGHT: f32 = 0.5;

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("无法读取字体文件 {path}: {source}")]
  FontIo {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
  #[error("帧尺寸 {actual} 与显示尺寸 {expected} 不一致")]
  FrameSize { expected: Size, actual: Size },
}

/// 叠加层。
///
/// 持有一块与显示分辨率对齐（宽 32、高 16 的倍数）的 RGBA 画布，进程内只创建一次。
/// 每帧先 [`Overlay::clear`]，再绘制检测框与文字，最后 [`Overlay::compose`]
/// 与原始帧按固定权重混合。只有显示分辨率范围内的区域会被清空和合成。
pub struct Overlay {
  size: Size,
  canvas: RgbaImage,
  font: Option<FontArc>,
  scale: PxScale,
  default_color: Rgba<u8>,
}

impl Overlay {
  pub fn new(size: Size) -> Self {
    let buffer = size.aligned(BUFFER_WIDTH_ALIGN, BUFFER_HEIGHT_ALIGN);
    trace!("创建叠加层画布: 显示 {}, 缓冲区 {}", size, buffer);
    Self {
      size,
      canvas: RgbaImage::from_pixel(buffer.width, buffer.height, TRANSPARENT),
      font: None,
      scale: PxScale::from(DEFAULT_FONT_SIZE),
      default_color: DEFAULT_COLOR,
    }
  }

  pub fn with_font(mut self, font: FontArc, font_size: f32) -> Self {
    self.font = Some(font);
    self.scale = PxScale::from(font_size);
    self
  }

  pub fn with_default_color(mut self, color: Rgba<u8>) -> Self {
    self.default_color = color;
    self
  }

  pub fn load_font(path: &Path) -> Result<FontArc, OverlayError> {
    info!("加载字体: {}", path.display());
    let data = std::fs::read(path).map_err(|source| OverlayError::FontIo {
      path: path.display().to_string(),
      source,
    })?;
    FontArc::try_from_vec(data).map_err(|e| OverlayError::InvalidFont(e.to_string()))
  }

  /// 显示分辨率
  pub fn size(&self) -> Size {
    self.size
  }

  /// 画布实际分配的尺寸
  pub fn buffer_size(&self) -> Size {
    Size::new(self.canvas.width(), self.canvas.height())
  }

  pub fn canvas(&self) -> &RgbaImage {
    &self.canvas
  }

  pub fn clear(&mut self) {
    let rect = Rect::at(0, 0).of_size(self.size.width, self.size.height);
    draw_filled_rect_mut(&mut self.canvas, rect, TRANSPARENT);
  }

  /// 绘制空心矩形，两个角点都包含在内；超出显示范围的部分被裁掉
  pub fn draw_box(&mut self, rect: PixelRect, outline: Option<Rgba<u8>>) {
    let color = outline.unwrap_or(self.default_color);
    let PixelRect { x1, y1, x2, y2 } = rect.normalized();

    for x in x1..=x2 {
      self.put_visible(x, y1, color);
      self.put_visible(x, y2, color);
    }
    for y in y1..=y2 {
      self.put_visible(x1, y, color);
      self.put_visible(x2, y, color);
    }
  }

  /// 以 `position` 为左上角绘制文字，`\n` 换行
  pub fn draw_text(&mut self, position: (i32, i32), text: &str, color: Option<Rgba<u8>>) {
    let Some(font) = self.font.as_ref() else {
      trace!("未加载字体，跳过文字: {:?}", text);
      return;
    };
    let color = color.unwrap_or(self.default_color);
    let line_height = font.as_scaled(self.scale).height() + LINE_SPACING;

    let (x, y) = position;
    for (index, line) in text.split('\n').enumerate() {
      let line_y = y + (index as f32 * line_height).round() as i32;
      draw_text_mut(&mut self.canvas, color, x, line_y, self.scale, font, line);
    }
  }

  /// 按 0.5 / 0.5 权重混合画布与原始帧，逐通道四舍六入五成双并饱和
  pub fn compose(&self, base: &RgbImage) -> Result<RgbImage, OverlayError> {
    let actual = Size::of(base);
    if actual != self.size {
      return Err(OverlayError::FrameSize {
        expected: self.size,
        actual,
      });
    }

    Ok(ImageBuffer::from_fn(self.size.width, self.size.height, |x, y| {
      let frame = base.get_pixel(x, y);
      let canvas = self.canvas.get_pixel(x, y);
      Rgb([
        blend(frame[0], canvas[0]),
        blend(frame[1], canvas[1]),
        blend(frame[2], canvas[2]),
      ])
    }))
  }

  fn put_visible(&mut self, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < self.size.width && (y as u32) < self.size.height {
      self.canvas.put_pixel(x as u32, y as u32, color);
    }
  }
}

fn blend(frame: u8, canvas: u8) -> u8 {
  let value = FRAME_WEIGHT * frame as f32 + CANVAS_WEIGHT * canvas as f32;
  value.round_ties_even().clamp(0.0, 255.0) as u8
}
