// 该文件是 Qianli （千里眼） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use qianli::config::{AppConfig, ConfigError};

/// Qianli 实时目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 配置文件，命令行参数优先于文件中的值
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// TFLite 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: Option<PathBuf>,

  /// 标签文件路径
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// 显示宽度
  #[arg(long, value_name = "WIDTH")]
  pub width: Option<u32>,

  /// 显示高度
  #[arg(long, value_name = "HEIGHT")]
  pub height: Option<u32>,

  /// 目标采集帧率
  #[arg(long, value_name = "FPS")]
  pub fps: Option<u32>,

  /// 推理线程数
  #[arg(long, value_name = "THREADS")]
  pub threads: Option<u32>,

  /// 叠加文字使用的等宽字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 摄像头来源，例如 v4l:///dev/video0、image:///frames/?loop
  #[arg(long, value_name = "SOURCE", default_value = "v4l:///dev/video0")]
  pub camera: Url,

  /// 显示目标，例如 window://、folder:///tmp/record、image:///tmp/latest.png
  #[arg(long, value_name = "OUTPUT", default_value = "window://")]
  pub display: Url,

  /// 处理指定帧数后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub max_frames: Option<u64>,
}

impl Args {
  /// 默认值 < 配置文件 < 命令行
  pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => AppConfig::from_file(path)?,
      None => AppConfig::default(),
    };
    self.apply(&mut config);
    config.validate()?;
    Ok(config)
  }

  fn apply(&self, config: &mut AppConfig) {
    if let Some(model) = &self.model {
      config.detector.model_path = model.clone();
    }
    if let Some(labels) = &self.labels {
      config.detector.label_path = labels.clone();
    }
    if let Some(threshold) = self.threshold {
      config.detector.threshold = threshold;
    }
    if let Some(threads) = self.threads {
      config.detector.num_threads = threads;
    }
    if let Some(width) = self.width {
      config.display.width = width;
    }
    if let Some(height) = self.height {
      config.display.height = height;
    }
    if let Some(fps) = self.fps {
      config.display.fps = fps;
    }
    if let Some(font) = &self.font {
      config.overlay.font_path = font.clone();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flags_override_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qianli.json");
    std::fs::write(
      &path,
      r#"{"detector": {"threshold": 0.6}, "display": {"width": 320, "height": 240}}"#,
    )
    .unwrap();

    let args = Args::parse_from([
      "qianli",
      "--config",
      path.to_str().unwrap(),
      "--width",
      "800",
      "--max-frames",
      "10",
    ]);
    let config = args.load_config().unwrap();
    assert_eq!(config.detector.threshold, 0.6);
    assert_eq!((config.display.width, config.display.height), (800, 240));
    assert_eq!(config.display.fps, 3);
    assert_eq!(args.max_frames, Some(10));
    assert_eq!(args.camera.as_str(), "v4l:///dev/video0");
  }

  #[test]
  fn default_sources_resolve_with_default_features() {
    use qianli::{FromUrl, input::InputWrapper, output::OutputWrapper};

    let args = Args::parse_from(["qianli"]);
    let config = args.load_config().unwrap();
    assert!(matches!(
      InputWrapper::from_url(&args.camera, &config.display),
      Ok(InputWrapper::V4l(_))
    ));
    assert!(matches!(
      OutputWrapper::from_url(&args.display, &config.display),
      Ok(OutputWrapper::GStreamerWindow(_))
    ));
  }

  #[test]
  fn invalid_override_is_rejected() {
    let args = Args::parse_from(["qianli", "--threshold", "1.5"]);
    assert!(matches!(args.load_config(), Err(ConfigError::Invalid(_))));
  }
}
