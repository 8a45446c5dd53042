// 该文件是 Qianli （千里眼） 项目的一部分。
// src/frame.rs - 帧几何与预处理
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

use std::fmt;

use image::{ImageBuffer, RgbImage, imageops};
use tracing::trace;

/// 图像尺寸（宽 x 高，单位像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  /// 将宽高分别向上取整到 `width_align` 与 `height_align` 的倍数
  pub const fn aligned(self, width_align: u32, height_align: u32) -> Self {
    Self {
      width: round_up(self.width, width_align),
      height: round_up(self.height, height_align),
    }
  }

  pub fn of(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self { width, height }
  }

  pub const fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

impl fmt::Display for Size {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

/// 将 `value` 向上取整为 `n` 的倍数
pub const fn round_up(value: u32, n: u32) -> u32 {
  n * value.div_ceil(n)
}

/// 绝对像素坐标矩形，(x1, y1) 与 (x2, y2) 为对角，均包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl PixelRect {
  pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 保证 (x1, y1) 为左上角
  pub fn normalized(self) -> Self {
    Self {
      x1: self.x1.min(self.x2),
      y1: self.y1.min(self.y2),
      x2: self.x1.max(self.x2),
      y2: self.y1.max(self.y2),
    }
  }
}

/// 帧变换器：原始帧 -> 模型输入帧
///
/// 固定两步：先绕中心旋转 180°（保留全部像素），再以最近邻插值缩放到模型输入尺寸。
/// 不持有任何跨帧状态。
#[derive(Debug, Clone, Copy)]
pub struct FrameTransformer {
  target: Size,
}

impl FrameTransformer {
  pub fn new(target: Size) -> Self {
    Self { target }
  }

  pub fn target(&self) -> Size {
    self.target
  }

  pub fn transform(&self, raw: &RgbImage) -> RgbImage {
    self.to_model_input(&self.orient(raw))
  }

  /// 第一步：旋转到显示方向，尺寸不变。叠加层合成在这一帧上。
  pub fn orient(&self, raw: &RgbImage) -> RgbImage {
    rotate_bound_180(raw)
  }

  /// 第二步：将已旋转的帧缩放到模型输入尺寸
  pub fn to_model_input(&self, oriented: &RgbImage) -> RgbImage {
    trace!("变换帧 {} -> {}", Size::of(oriented), self.target);
    resize_nearest(oriented, self.target)
  }
}

/// 绕中心旋转 180°。
///
/// 180° 旋转后的外接矩形与原图相同，因此无需扩展画布。
pub fn rotate_bound_180(image: &RgbImage) -> RgbImage {
  imageops::rotate180(image)
}

/// 最近邻缩放，源坐标为 `floor(dst * src_len / dst_len)`
pub fn resize_nearest(image: &RgbImage, size: Size) -> RgbImage {
  let source = Size::of(image);
  if source == size {
    return image.clone();
  }
  if source.is_empty() {
    return RgbImage::new(size.width, size.height);
  }

  ImageBuffer::from_fn(size.width, size.height, |x, y| {
    let sx = nearest_index(x, source.width, size.width);
    let sy = nearest_index(y, source.height, size.height);
    *image.get_pixel(sx, sy)
  })
}

fn nearest_index(dst: u32, src_len: u32, dst_len: u32) -> u32 {
  let index = (dst as u64 * src_len as u64) / dst_len as u64;
  index.min(src_len as u64 - 1) as u32
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]))
  }

  #[test]
  fn round_up_aligns_to_blocks() {
    assert_eq!(round_up(640, 32), 640);
    assert_eq!(round_up(480, 16), 480);
    assert_eq!(round_up(100, 32), 128);
    assert_eq!(round_up(100, 16), 112);
    assert_eq!(round_up(0, 16), 0);
    assert_eq!(Size::new(100, 100).aligned(32, 16), Size::new(128, 112));
  }

  #[test]
  fn rotation_keeps_bounds_and_flips_both_axes() {
    let image = gradient(4, 3);
    let rotated = rotate_bound_180(&image);
    assert_eq!(rotated.dimensions(), (4, 3));
    assert_eq!(rotated.get_pixel(0, 0), image.get_pixel(3, 2));
    assert_eq!(rotated.get_pixel(3, 2), image.get_pixel(0, 0));
    assert_eq!(rotated.get_pixel(1, 0), image.get_pixel(2, 2));
  }

  #[test]
  fn nearest_downscale_picks_floor_samples() {
    let image = gradient(4, 4);
    let resized = resize_nearest(&image, Size::new(2, 2));
    assert_eq!(resized.get_pixel(0, 0), image.get_pixel(0, 0));
    assert_eq!(resized.get_pixel(1, 0), image.get_pixel(2, 0));
    assert_eq!(resized.get_pixel(0, 1), image.get_pixel(0, 2));
    assert_eq!(resized.get_pixel(1, 1), image.get_pixel(2, 2));
  }

  #[test]
  fn nearest_upscale_duplicates_pixels() {
    let image = gradient(2, 1);
    let resized = resize_nearest(&image, Size::new(4, 2));
    assert_eq!(resized.get_pixel(0, 0), image.get_pixel(0, 0));
    assert_eq!(resized.get_pixel(1, 1), image.get_pixel(0, 0));
    assert_eq!(resized.get_pixel(2, 0), image.get_pixel(1, 0));
    assert_eq!(resized.get_pixel(3, 1), image.get_pixel(1, 0));
  }

  #[test]
  fn transform_rotates_then_resizes() {
    let transformer = FrameTransformer::new(Size::new(3, 3));
    let image = gradient(6, 6);
    let out = transformer.transform(&image);
    assert_eq!(Size::of(&out), Size::new(3, 3));
    // 输出左上角来自旋转后 (0,0)，即原图右下角
    assert_eq!(out.get_pixel(0, 0), image.get_pixel(5, 5));
    assert_eq!(out.get_pixel(1, 0), image.get_pixel(3, 5));
  }

  #[test]
  fn orient_then_model_input_matches_transform() {
    let transformer = FrameTransformer::new(Size::new(4, 3));
    let image = gradient(8, 6);
    let oriented = transformer.orient(&image);
    assert_eq!(Size::of(&oriented), Size::new(8, 6));
    assert_eq!(oriented.get_pixel(0, 0), image.get_pixel(7, 5));
    assert_eq!(
      transformer.to_model_input(&oriented),
      transformer.transform(&image)
    );
  }

  #[test]
  fn transform_is_stateless() {
    let transformer = FrameTransformer::new(Size::new(5, 4));
    let image = gradient(10, 8);
    assert_eq!(transformer.transform(&image), transformer.transform(&image));
  }

  #[test]
  fn pixel_rect_normalizes_corners() {
    let rect = PixelRect::new(10, 20, 5, 2).normalized();
    assert_eq!(rect, PixelRect::new(5, 2, 10, 20));
  }
}
