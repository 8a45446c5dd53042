// 该文件是 Qianli （千里眼） 项目的一部分。
// src/main.rs - 实时检测主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use qianli::{
  FromUrl,
  input::InputWrapper,
  label::LabelTable,
  model::{Detector, TfliteDetector},
  output::{Overlay, OutputWrapper},
  task::{Pipeline, StopSignal},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.load_config()?;

  info!("模型文件路径: {}", config.detector.model_path.display());
  info!("标签文件路径: {}", config.detector.label_path.display());
  info!("置信度阈值: {}", config.detector.threshold);
  info!("显示: {}", config.display);
  info!("摄像头: {}", args.camera);
  info!("输出: {}", args.display);
  info!("机器人引脚: {:?}", config.robot);

  let labels = LabelTable::load(&config.detector.label_path)?;
  info!("标签加载完成, 共 {} 个", labels.len());
  let detector = TfliteDetector::load(&config.detector)?;
  info!("模型加载完成, 输入尺寸 {}", detector.input_size());

  let font = Overlay::load_font(&config.overlay.font_path)?;
  let overlay = Overlay::new(config.display.size()).with_font(font, config.overlay.font_size);

  let mut camera = InputWrapper::from_url(&args.camera, &config.display)?;
  let mut display = OutputWrapper::from_url(&args.display, &config.display)?;
  let stop = StopSignal::from_ctrlc().context("无法设置 Ctrl-C 处理器")?;

  let mut pipeline = Pipeline::new(detector, labels, overlay).with_max_frames(args.max_frames);
  let report = pipeline.run(&mut camera, &mut display, &stop)?;

  info!(
    "任务完成 ({:?}): {} 帧, {} 个目标",
    report.stop_reason, report.frames, report.detections
  );
  Ok(())
}
