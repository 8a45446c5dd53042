// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/decode.rs - 检测输出解码
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

use tracing::{debug, error, trace};

use crate::frame::Size;
use crate::model::{BoundingBox, Detection, DetectorError};

const NUM_OUTPUTS: usize = 4;
const BOX_COORDS: usize = 4;

/// 检测后处理算子的四个并行输出
#[derive(Debug, Clone, Copy)]
pub struct RawOutputs<'a> {
  /// (N, 4)，每行 [ymin, xmin, ymax, xmax]
  pub boxes: &'a [f32],
  pub classes: &'a [f32],
  pub scores: &'a [f32],
  pub count: f32,
}

/// 取前 `count` 项并按索引组合，只保留 `score >= threshold` 的结果，保持模型原始顺序
pub fn decode_detections(outputs: &RawOutputs, threshold: f32) -> Vec<Detection> {
  let available = (outputs.boxes.len() / BOX_COORDS)
    .min(outputs.classes.len())
    .min(outputs.scores.len());
  let count = (outputs.count as usize).min(available);
  if (outputs.count as usize) > available {
    debug!(
      "模型报告 {} 个结果，但输出只包含 {} 项",
      outputs.count, available
    );
  }

  let mut detections = Vec::with_capacity(count);
  for index in 0..count {
    let score = outputs.scores[index];
    if score < threshold {
      continue;
    }
    let b = &outputs.boxes[index * BOX_COORDS..(index + 1) * BOX_COORDS];
    let class_id = outputs.classes[index].max(0.0) as u32;
    trace!(
      "检测 {}: 类别 {} 分数 {:.3} 框 {:?}",
      index, class_id, score, b
    );
    detections.push(Detection {
      bounding_box: BoundingBox::new(b[0], b[1], b[2], b[3]),
      class_id,
      score,
    });
  }
  detections
}

/// 从输入张量形状 (1, H, W, 3) 得出模型输入分辨率
pub fn input_size_from_dims(dims: &[usize]) -> Result<Size, DetectorError> {
  match dims {
    [1, height, width, 3] if *height > 0 && *width > 0 => {
      Ok(Size::new(*width as u32, *height as u32))
    }
    _ => {
      error!("输入张量形状应为 (1, H, W, 3)，实际为 {:?}", dims);
      Err(DetectorError::InvalidModel(format!(
        "输入张量形状应为 (1, H, W, 3)，实际为 {:?}",
        dims
      )))
    }
  }
}

/// 校验输出张量形状是否符合 [boxes, classes, scores, count] 约定，返回候选数量 N
pub fn validate_output_dims(dims: &[Vec<usize>]) -> Result<usize, DetectorError> {
  if dims.len() != NUM_OUTPUTS {
    return Err(invalid(format!(
      "预期模型输出数量为 {}, 实际为 {}",
      NUM_OUTPUTS,
      dims.len()
    )));
  }

  let boxes = &dims[0];
  if boxes.last() != Some(&BOX_COORDS) {
    return Err(invalid(format!(
      "输出 0 应为检测框 (N, 4)，实际形状 {:?}",
      boxes
    )));
  }
  let candidates = element_count(boxes) / BOX_COORDS;

  for (index, name) in [(1, "类别"), (2, "分数")] {
    let len = element_count(&dims[index]);
    if len != candidates {
      return Err(invalid(format!(
        "输出 {} 应为{} (N = {})，实际形状 {:?}",
        index, name, candidates, dims[index]
      )));
    }
  }

  if element_count(&dims[3]) != 1 {
    return Err(invalid(format!(
      "输出 3 应为检测数量标量，实际形状 {:?}",
      dims[3]
    )));
  }

  debug!("模型输出校验通过，候选数量 {}", candidates);
  Ok(candidates)
}

fn element_count(dims: &[usize]) -> usize {
  dims.iter().product()
}

fn invalid(msg: String) -> DetectorError {
  error!("{}", msg);
  DetectorError::InvalidModel(msg)
}

#[cfg(test)]
mod tests {
  use super::*;

  const BOXES: [f32; 12] = [
    0.1, 0.2, 0.5, 0.6, //
    0.0, 0.0, 1.0, 1.0, //
    0.3, 0.3, 0.4, 0.4,
  ];

  #[test]
  fn filters_below_threshold_in_model_order() {
    let outputs = RawOutputs {
      boxes: &BOXES,
      classes: &[0.0, 1.0, 2.0],
      scores: &[0.9, 0.3, 0.5],
      count: 3.0,
    };
    let detections = decode_detections(&outputs, 0.4);
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].score, 0.9);
    assert_eq!(detections[0].class_id, 0);
    assert_eq!(detections[1].score, 0.5);
    assert_eq!(detections[1].class_id, 2);
    assert_eq!(
      detections[1].bounding_box,
      BoundingBox::new(0.3, 0.3, 0.4, 0.4)
    );
    assert!(detections.iter().all(|d| d.score >= 0.4));
  }

  #[test]
  fn score_equal_to_threshold_is_kept() {
    let outputs = RawOutputs {
      boxes: &BOXES[..4],
      classes: &[3.0],
      scores: &[0.4],
      count: 1.0,
    };
    assert_eq!(decode_detections(&outputs, 0.4).len(), 1);
  }

  #[test]
  fn only_first_count_entries_are_used() {
    let outputs = RawOutputs {
      boxes: &BOXES,
      classes: &[0.0, 1.0, 2.0],
      scores: &[0.9, 0.8, 0.7],
      count: 2.0,
    };
    assert_eq!(decode_detections(&outputs, 0.0).len(), 2);
  }

  #[test]
  fn count_is_clamped_to_available_entries() {
    let outputs = RawOutputs {
      boxes: &BOXES,
      classes: &[0.0, 1.0, 2.0],
      scores: &[0.9, 0.8, 0.7],
      count: 10.0,
    };
    assert_eq!(decode_detections(&outputs, 0.0).len(), 3);

    let outputs = RawOutputs {
      count: -1.0,
      ..outputs
    };
    assert!(decode_detections(&outputs, 0.0).is_empty());
  }

  #[test]
  fn input_dims_give_width_and_height() {
    assert_eq!(
      input_size_from_dims(&[1, 300, 320, 3]).unwrap(),
      Size::new(320, 300)
    );
    assert!(input_size_from_dims(&[1, 300, 300, 1]).is_err());
    assert!(input_size_from_dims(&[300, 300, 3]).is_err());
  }

  #[test]
  fn ssd_postprocess_outputs_validate() {
    let dims = vec![vec![1, 10, 4], vec![1, 10], vec![1, 10], vec![1]];
    assert_eq!(validate_output_dims(&dims).unwrap(), 10);
  }

  #[test]
  fn reordered_outputs_are_rejected() {
    let dims = vec![vec![1, 10], vec![1, 10, 4], vec![1, 10], vec![1]];
    assert!(matches!(
      validate_output_dims(&dims),
      Err(DetectorError::InvalidModel(_))
    ));

    let dims = vec![vec![1, 10, 4], vec![1, 10], vec![1], vec![1, 10]];
    assert!(validate_output_dims(&dims).is_err());
  }

  #[test]
  fn wrong_output_count_is_rejected() {
    let dims = vec![vec![1, 10, 4], vec![1, 10], vec![1, 10]];
    assert!(validate_output_dims(&dims).is_err());
  }
}
