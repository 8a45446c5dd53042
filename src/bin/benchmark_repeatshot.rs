// 该文件是 Qianli （千里眼） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 单帧重复推理基准
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

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

use qianli::{
  config::DetectorConfig,
  frame::FrameTransformer,
  input::{CameraSource, ImageFileCamera},
  model::{Detector, TfliteDetector},
  task::repeat_inference,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// TFLite 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: PathBuf,
  /// 输入图像
  #[arg(long, value_name = "IMAGE")]
  pub input: PathBuf,
  /// 重复次数
  #[arg(long, default_value_t = 1000)]
  pub times: usize,
  /// 不计入统计的预热次数
  #[arg(long, default_value_t = 2)]
  pub warmup: usize,
  #[arg(long, default_value_t = 1)]
  pub threads: u32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  if args.times <= args.warmup {
    return Err(anyhow!(
      "重复次数 {} 必须大于预热次数 {}",
      args.times,
      args.warmup
    ));
  }

  let config = DetectorConfig {
    model_path: args.model.clone(),
    num_threads: args.threads,
    ..DetectorConfig::default()
  };
  let mut detector = TfliteDetector::load(&config)?;
  let size = detector.input_size();

  let mut camera = ImageFileCamera::new(&args.input, size);
  camera.open()?;
  let raw = camera.read()?.ok_or_else(|| anyhow!("没有输入帧"))?;
  camera.close();
  let frame = FrameTransformer::new(size).transform(&raw);

  info!("输入帧获取成功，开始推理 {} 次...", args.times);
  let stats = repeat_inference(&mut detector, &frame, args.times, args.warmup)?;
  warn!("推理耗时: {}", stats);

  Ok(())
}
