// 该文件是 Qianli （千里眼） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use qianli::{
  config::AppConfig,
  input::ImageFileCamera,
  label::LabelTable,
  model::{Detector, TfliteDetector},
  output::{Overlay, SaveImageFileDisplay},
  task::{Pipeline, StopSignal},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[arg(long, value_name = "MODEL")]
  pub model: PathBuf,
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 输入图像，缩放到显示分辨率后处理
  #[arg(long, value_name = "IMAGE")]
  pub input: PathBuf,
  /// 输出图像
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let mut config = AppConfig::default();
  config.detector.model_path = args.model;
  config.detector.label_path = args.labels;
  if let Some(font) = args.font {
    config.overlay.font_path = font;
  }
  config.validate()?;

  let labels = LabelTable::load(&config.detector.label_path)?;
  let detector = TfliteDetector::load(&config.detector)?;

  let mut overlay = Overlay::new(config.display.size());
  match Overlay::load_font(&config.overlay.font_path) {
    Ok(font) => overlay = overlay.with_font(font, config.overlay.font_size),
    Err(e) => warn!("{}，不绘制文字", e),
  }

  let mut camera = ImageFileCamera::new(&args.input, config.display.size());
  let mut display = SaveImageFileDisplay::new(&args.output);
  let (_tx, stop) = StopSignal::channel();

  let mut pipeline = Pipeline::new(detector, labels, overlay).with_max_frames(Some(1));
  let report = pipeline.run(&mut camera, &mut display, &stop)?;
  info!(
    "检测到 {} 个目标, 推理耗时 {}, 结果保存到 {}",
    report.detections,
    report.latency,
    display.path().display()
  );

  Ok(())
}
