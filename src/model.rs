// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model.rs - 检测模型
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

use image::RgbImage;
use thiserror::Error;

use crate::config::DetectorConfig;
use crate::frame::{PixelRect, Size};

mod decode;
pub use self::decode::{RawOutputs, decode_detections, input_size_from_dims, validate_output_dims};

#[cfg(feature = "tflite_backend")]
mod tflite;
#[cfg(feature = "tflite_backend")]
pub use self::tflite::TfliteDetector;

/// 归一化检测框，相对模型输入帧，取值 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub ymin: f32,
  pub xmin: f32,
  pub ymax: f32,
  pub xmax: f32,
}

impl BoundingBox {
  pub const fn new(ymin: f32, xmin: f32, ymax: f32, xmax: f32) -> Self {
    Self {
      ymin,
      xmin,
      ymax,
      xmax,
    }
  }

  /// 映射到显示帧的绝对像素坐标。x 乘以宽度，y 乘以高度，截断取整。
  pub fn to_pixel_rect(&self, display: Size) -> PixelRect {
    let width = display.width as f32;
    let height = display.height as f32;
    PixelRect {
      x1: (self.xmin * width) as i32,
      y1: (self.ymin * height) as i32,
      x2: (self.xmax * width) as i32,
      y2: (self.ymax * height) as i32,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bounding_box: BoundingBox,
  pub class_id: u32,
  pub score: f32,
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型加载错误 {path}: {reason}")]
  ModelLoad { path: String, reason: String },
  #[error("模型无效: {0}")]
  InvalidModel(String),
  #[error("输入尺寸不匹配: 期望 {expected}, 实际 {actual}")]
  Shape { expected: Size, actual: Size },
  #[error("推理错误: {0}")]
  Inference(String),
}

/// 检测后端能力接口。
///
/// 后端必须满足的外部约定：模型恰有一个 (1, H, W, 3) 输入，以及按
/// [boxes, classes, scores, count] 顺序排列的四个输出。
pub trait Detector {
  fn load(config: &DetectorConfig) -> Result<Self, DetectorError>
  where
    Self: Sized;

  /// 模型要求的输入分辨率
  fn input_size(&self) -> Size;

  /// 单次同步推理。`image` 必须与 [`Detector::input_size`] 一致。
  fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

pub fn check_input_shape(image: &RgbImage, expected: Size) -> Result<(), DetectorError> {
  let actual = Size::of(image);
  if actual != expected {
    return Err(DetectorError::Shape { expected, actual });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rescale_truncates_to_display_pixels() {
    let bbox = BoundingBox::new(0.1, 0.2, 0.5, 0.6);
    let rect = bbox.to_pixel_rect(Size::new(640, 480));
    assert_eq!(rect, PixelRect::new(128, 48, 384, 240));
  }

  #[test]
  fn rescale_truncates_not_rounds() {
    let bbox = BoundingBox::new(0.0, 0.0999, 0.999, 0.5);
    let rect = bbox.to_pixel_rect(Size::new(100, 100));
    assert_eq!(rect.x1, 9);
    assert_eq!(rect.y2, 99);
  }

  #[test]
  fn shape_check_reports_sizes() {
    let image = RgbImage::new(10, 8);
    assert!(check_input_shape(&image, Size::new(10, 8)).is_ok());
    match check_input_shape(&image, Size::new(300, 300)) {
      Err(DetectorError::Shape { expected, actual }) => {
        assert_eq!(expected, Size::new(300, 300));
        assert_eq!(actual, Size::new(10, 8));
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }
}
