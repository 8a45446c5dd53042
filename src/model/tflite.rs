// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/tflite.rs - TensorFlow Lite 检测后端
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
use tflite::context::ElementKind;
use tflite::ops::builtin::BuiltinOpResolver;
use tflite::{FlatBufferModel, Interpreter, InterpreterBuilder};
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::frame::Size;
use crate::model::{
  Detection, Detector, DetectorError, RawOutputs, check_input_shape, decode_detections,
  input_size_from_dims, validate_output_dims,
};

/// 输入张量的元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
  /// 量化模型，直接写入 RGB 字节
  UInt8,
  /// 浮点模型，归一化到 [-1, 1]
  Float32,
}

pub struct TfliteDetector<'a> {
  interpreter: Interpreter<'a, BuiltinOpResolver>,
  input_size: Size,
  input_kind: InputKind,
  threshold: f32,
}

impl From<tflite::Error> for DetectorError {
  fn from(err: tflite::Error) -> Self {
    DetectorError::Inference(err.to_string())
  }
}

fn load_error(config: &DetectorConfig, err: impl ToString) -> DetectorError {
  DetectorError::ModelLoad {
    path: config.model_path.display().to_string(),
    reason: err.to_string(),
  }
}

impl<'a> Detector for TfliteDetector<'a> {
  fn load(config: &DetectorConfig) -> Result<Self, DetectorError> {
    info!("加载模型文件: {}", config.model_path.display());
    let model = FlatBufferModel::build_from_file(&config.model_path)
      .map_err(|e| load_error(config, e))?;
    let resolver = BuiltinOpResolver::default();
    let builder = InterpreterBuilder::new(model, resolver).map_err(|e| load_error(config, e))?;
    let mut interpreter = builder.build().map_err(|e| load_error(config, e))?;
    interpreter.set_num_threads(config.num_threads as i32);
    interpreter
      .allocate_tensors()
      .map_err(|e| load_error(config, e))?;

    let inputs = interpreter.get_input_details()?;
    if inputs.len() != 1 {
      return Err(DetectorError::InvalidModel(format!(
        "预期模型输入数量为 1, 实际为 {}",
        inputs.len()
      )));
    }
    let input_size = input_size_from_dims(&inputs[0].dims)?;
    let input_kind = match inputs[0].element_kind {
      ElementKind::kTfLiteUInt8 => InputKind::UInt8,
      ElementKind::kTfLiteFloat32 => InputKind::Float32,
      other => {
        return Err(DetectorError::InvalidModel(format!(
          "不支持的输入类型: {:?}",
          other
        )));
      }
    };

    let outputs = interpreter.get_output_details()?;
    let output_dims: Vec<Vec<usize>> = outputs.iter().map(|info| info.dims.clone()).collect();
    let candidates = validate_output_dims(&output_dims)?;
    for info in &outputs {
      debug!("模型输出 {}: {:?}", info.name, info.dims);
    }

    info!(
      "模型加载完成: 输入 {} ({:?}), 最多 {} 个候选, 阈值 {}",
      input_size, input_kind, candidates, config.threshold
    );

    Ok(Self {
      interpreter,
      input_size,
      input_kind,
      threshold: config.threshold,
    })
  }

  fn input_size(&self) -> Size {
    self.input_size
  }

  fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    check_input_shape(image, self.input_size)?;
    let pixels = image.as_raw();

    let input_index = self.interpreter.inputs()[0];
    match self.input_kind {
      InputKind::UInt8 => {
        let data: &mut [u8] = self.interpreter.tensor_data_mut(input_index)?;
        if data.len() != pixels.len() {
          return Err(DetectorError::Inference(format!(
            "输入张量长度 {} 与图像数据长度 {} 不一致",
            data.len(),
            pixels.len()
          )));
        }
        data.copy_from_slice(pixels);
      }
      InputKind::Float32 => {
        let data: &mut [f32] = self.interpreter.tensor_data_mut(input_index)?;
        if data.len() != pixels.len() {
          return Err(DetectorError::Inference(format!(
            "输入张量长度 {} 与图像数据长度 {} 不一致",
            data.len(),
            pixels.len()
          )));
        }
        for (dst, &src) in data.iter_mut().zip(pixels) {
          *dst = (src as f32 - 127.5) / 127.5;
        }
      }
    }

    self.interpreter.invoke()?;

    let outputs = self.interpreter.outputs().to_vec();
    let boxes: &[f32] = self.interpreter.tensor_data(outputs[0])?;
    let classes: &[f32] = self.interpreter.tensor_data(outputs[1])?;
    let scores: &[f32] = self.interpreter.tensor_data(outputs[2])?;
    let count: &[f32] = self.interpreter.tensor_data(outputs[3])?;

    let raw = RawOutputs {
      boxes,
      classes,
      scores,
      count: count.first().copied().unwrap_or(0.0),
    };
    let detections = decode_detections(&raw, self.threshold);
    debug!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }
}
