// 该文件是 Qianli （千里眼） 项目的一部分。
// src/config.rs - 运行配置
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

//! 启动时构建一次、之后只读的配置。
//!
//! 来源优先级：内置默认值 < JSON 配置文件 < 命令行参数。

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::frame::Size;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置文件解析错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub detector: DetectorConfig,
  pub display: DisplayConfig,
  pub overlay: OverlayConfig,
  pub robot: RobotPins,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub model_path: PathBuf,
  pub label_path: PathBuf,
  /// 低于该分数的检测结果会被丢弃
  pub threshold: f32,
  pub num_threads: u32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      model_path: PathBuf::from("pretrained_models/detect.tflite"),
      label_path: PathBuf::from("pretrained_models/coco_labels.txt"),
      threshold: 0.4,
      num_threads: 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
  pub width: u32,
  pub height: u32,
  /// 目标采集帧率
  pub fps: u32,
}

impl DisplayConfig {
  pub fn size(&self) -> Size {
    Size::new(self.width, self.height)
  }
}

impl Default for DisplayConfig {
  fn default() -> Self {
    Self {
      width: 640,
      height: 480,
      fps: 3,
    }
  }
}

impl fmt::Display for DisplayConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
  pub font_path: PathBuf,
  pub font_size: f32,
}

impl Default for OverlayConfig {
  fn default() -> Self {
    Self {
      font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf"),
      font_size: 22.0,
    }
  }
}

/// 机器人执行器引脚（BCM 编号）。检测流程不使用这些值，仅随配置携带。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RobotPins {
  #[serde(alias = "r_wheel_p")]
  pub right_wheel_forward: u8,
  #[serde(alias = "r_wheel_m")]
  pub right_wheel_backward: u8,
  #[serde(alias = "l_wheel_p")]
  pub left_wheel_forward: u8,
  #[serde(alias = "l_wheel_m")]
  pub left_wheel_backward: u8,
  #[serde(alias = "srf_trig")]
  pub ultrasonic_trigger: u8,
  #[serde(alias = "srf_echo")]
  pub ultrasonic_echo: u8,
  pub servo: u8,
}

impl Default for RobotPins {
  fn default() -> Self {
    Self {
      right_wheel_forward: 12,
      right_wheel_backward: 16,
      left_wheel_forward: 20,
      left_wheel_backward: 21,
      ultrasonic_trigger: 23,
      ultrasonic_echo: 24,
      servo: 18,
    }
  }
}

impl AppConfig {
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    info!("读取配置文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&text)
  }

  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.display.size().is_empty() {
      return Err(ConfigError::Invalid(format!(
        "显示分辨率不能为 0: {}",
        self.display.size()
      )));
    }
    if self.display.fps == 0 {
      return Err(ConfigError::Invalid("采集帧率不能为 0".to_string()));
    }
    if !(0.0..=1.0).contains(&self.detector.threshold) {
      return Err(ConfigError::Invalid(format!(
        "置信度阈值必须在 0.0 - 1.0 之间: {}",
        self.detector.threshold
      )));
    }
    if self.overlay.font_size <= 0.0 {
      return Err(ConfigError::Invalid(format!(
        "字体大小必须为正数: {}",
        self.overlay.font_size
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_robot_setup() {
    let config = AppConfig::default();
    assert_eq!(config.detector.threshold, 0.4);
    assert_eq!(config.display.size(), Size::new(640, 480));
    assert_eq!(config.display.fps, 3);
    assert_eq!(config.robot.servo, 18);
    assert_eq!(config.robot.ultrasonic_echo, 24);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let config =
      AppConfig::from_json(r#"{ "detector": { "threshold": 0.6 }, "display": { "width": 320 } }"#)
        .unwrap();
    assert_eq!(config.detector.threshold, 0.6);
    assert_eq!(
      config.detector.model_path,
      PathBuf::from("pretrained_models/detect.tflite")
    );
    assert_eq!(config.display.size(), Size::new(320, 480));
  }

  #[test]
  fn robot_pins_accept_short_names() {
    let config = AppConfig::from_json(r#"{ "robot": { "r_wheel_p": 5, "srf_trig": 6 } }"#).unwrap();
    assert_eq!(config.robot.right_wheel_forward, 5);
    assert_eq!(config.robot.ultrasonic_trigger, 6);
    assert_eq!(config.robot.left_wheel_forward, 20);
  }

  #[test]
  fn validate_rejects_bad_values() {
    let mut config = AppConfig::default();
    config.detector.threshold = 1.5;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = AppConfig::default();
    config.display.height = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = AppConfig::default();
    config.display.fps = 0;
    assert!(config.validate().is_err());
  }

  #[test]
  fn malformed_json_is_parse_error() {
    assert!(matches!(
      AppConfig::from_json("{ detector: "),
      Err(ConfigError::Parse(_))
    ));
  }
}
