// 该文件是 Qianli （千里眼） 项目的一部分。
// src/task.rs - 检测流水线驱动
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

//! # 流水线驱动
//!
//! 单线程顺序循环：采集 → 变换 → 推理（计时）→ 绘制 → 合成 → 显示。
//! 停止信号只在每一轮渲染之后检查；推理期间不响应。
//! 摄像头与显示在所有退出路径上各释放一次。

use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use std::{fmt, thread};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
  frame::FrameTransformer,
  input::{CameraSource, CaptureError},
  label::LabelTable,
  model::{Detection, Detector, DetectorError},
  output::{DisplayError, DisplaySink, Overlay, OverlayError},
};

/// 推理耗时文字的左上角位置
pub const LATENCY_POSITION: (i32, i32) = (5, 0);

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("采集错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("检测错误: {0}")]
  Detector(#[from] DetectorError),
  #[error("显示错误: {0}")]
  Display(#[from] DisplayError),
  #[error("叠加层错误: {0}")]
  Overlay(#[from] OverlayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
  Init,
  Running,
  Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  UserRequested,
  FrameLimit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
  count: u32,
  total: Duration,
  min: Option<Duration>,
  max: Option<Duration>,
}

impl LatencyStats {
  pub fn record(&mut self, elapsed: Duration) {
    self.count += 1;
    self.total += elapsed;
    self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
    self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
  }

  pub fn count(&self) -> u32 {
    self.count
  }

  pub fn mean(&self) -> Option<Duration> {
    (self.count > 0).then(|| self.total / self.count)
  }

  pub fn min(&self) -> Option<Duration> {
    self.min
  }

  pub fn max(&self) -> Option<Duration> {
    self.max
  }
}

impl fmt::Display for LatencyStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.mean(), self.min, self.max) {
      (Some(mean), Some(min), Some(max)) => write!(
        f,
        "平均 {:.2?} / 最小 {:.2?} / 最大 {:.2?}",
        mean, min, max
      ),
      _ => write!(f, "无数据"),
    }
  }
}

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
  pub frames: u64,
  pub detections: u64,
  pub latency: LatencyStats,
  pub stop_reason: Option<StopReason>,
}

/// 用户停止信号。
///
/// 由 Ctrl-C 或任意 [`Sender`] 触发，驱动在每一轮渲染后非阻塞地检查一次。
pub struct StopSignal {
  rx: Receiver<()>,
}

impl StopSignal {
  pub fn channel() -> (Sender<()>, Self) {
    let (tx, rx) = channel();
    (tx, Self { rx })
  }

  /// 安装 Ctrl-C 处理器。收到信号 30 秒后仍未退出则强制结束进程。
  pub fn from_ctrlc() -> Result<Self, ctrlc::Error> {
    let (tx, signal) = Self::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(signal)
  }

  pub fn requested(&self) -> bool {
    self.rx.try_recv().is_ok()
  }
}

/// 只计量 `f` 本身的单调时钟耗时
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
  let start = Instant::now();
  let value = f();
  (value, start.elapsed())
}

/// 将检测结果画到叠加层：外框加两行文字 `标签\n分数`
pub fn annotate_detections(overlay: &mut Overlay, detections: &[Detection], labels: &LabelTable) {
  let display = overlay.size();
  for detection in detections {
    let rect = detection.bounding_box.to_pixel_rect(display);
    let name = labels.display_name(detection.class_id);
    trace!(
      "目标 {} ({}) {:.2} @ {:?}",
      name, detection.class_id, detection.score, rect
    );
    overlay.draw_box(rect, None);
    overlay.draw_text(
      (rect.x1, rect.y1),
      &format!("{}\n{:.2}", name, detection.score),
      None,
    );
  }
}

struct CameraGuard<'a, C: CameraSource>(&'a mut C);

impl<C: CameraSource> Drop for CameraGuard<'_, C> {
  fn drop(&mut self) {
    self.0.close();
  }
}

struct DisplayGuard<'a, S: DisplaySink>(&'a mut S);

impl<S: DisplaySink> Drop for DisplayGuard<'_, S> {
  fn drop(&mut self) {
    self.0.close();
  }
}

pub struct Pipeline<D: Detector> {
  detector: D,
  labels: LabelTable,
  transformer: FrameTransformer,
  overlay: Overlay,
  max_frames: Option<u64>,
  state: DriverState,
  report: RunReport,
}

impl<D: Detector> Pipeline<D> {
  /// 检测器与标签表已加载；叠加层尺寸即显示分辨率
  pub fn new(detector: D, labels: LabelTable, overlay: Overlay) -> Self {
    let transformer = FrameTransformer::new(detector.input_size());
    Self {
      detector,
      labels,
      transformer,
      overlay,
      max_frames: None,
      state: DriverState::Init,
      report: RunReport::default(),
    }
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn state(&self) -> DriverState {
    self.state
  }

  pub fn report(&self) -> &RunReport {
    &self.report
  }

  pub fn overlay(&self) -> &Overlay {
    &self.overlay
  }

  /// 运行主循环直到用户停止、达到帧数上限或发生致命错误。
  ///
  /// 输入源耗尽以 [`CaptureError::EndOfStream`] 结束。
  pub fn run<C, S>(
    &mut self,
    camera: &mut C,
    display: &mut S,
    stop: &StopSignal,
  ) -> Result<RunReport, PipelineError>
  where
    C: CameraSource,
    S: DisplaySink,
  {
    self.report = RunReport::default();
    let result = self.run_inner(camera, display, stop);
    self.state = DriverState::Stopped;

    match &result {
      Ok(reason) => info!("任务结束: {:?}", reason),
      Err(e) => warn!("任务因错误结束: {}", e),
    }
    info!(
      "共处理 {} 帧, {} 个目标, 推理耗时 {}",
      self.report.frames, self.report.detections, self.report.latency
    );

    result.map(|reason| {
      self.report.stop_reason = Some(reason);
      self.report.clone()
    })
  }

  fn run_inner<C, S>(
    &mut self,
    camera: &mut C,
    display: &mut S,
    stop: &StopSignal,
  ) -> Result<StopReason, PipelineError>
  where
    C: CameraSource,
    S: DisplaySink,
  {
    camera.open()?;
    let camera = CameraGuard(camera);
    display.open()?;
    let display = DisplayGuard(display);

    self.state = DriverState::Running;
    info!("开始任务...");

    loop {
      let raw = camera.0.read()?.ok_or(CaptureError::EndOfStream)?;
      let composed = self.step(&raw)?;
      display.0.show(&composed)?;

      if self.max_frames.is_some_and(|n| self.report.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", self.report.frames);
        return Ok(StopReason::FrameLimit);
      }
      if stop.requested() || display.0.stop_requested() {
        warn!("收到停止请求，退出任务循环");
        return Ok(StopReason::UserRequested);
      }
    }
  }

  /// 处理一帧并返回合成画面。检测框位于旋转后的坐标系，因此合成在旋转后的帧上。
  pub fn step(&mut self, raw: &RgbImage) -> Result<RgbImage, PipelineError> {
    let oriented = self.transformer.orient(raw);
    let frame = self.transformer.to_model_input(&oriented);
    let (detections, elapsed) = timed(|| self.detector.detect(&frame));
    let detections = detections?;
    let latency_ms = elapsed.as_secs_f64() * 1000.0;

    self.report.frames += 1;
    self.report.detections += detections.len() as u64;
    self.report.latency.record(elapsed);
    info!(
      "第 {} 帧: {} 个目标, 推理耗时 {:.1}ms",
      self.report.frames,
      detections.len(),
      latency_ms
    );

    self.overlay.clear();
    annotate_detections(&mut self.overlay, &detections, &self.labels);
    self
      .overlay
      .draw_text(LATENCY_POSITION, &format!("{:.1}ms", latency_ms), None);

    Ok(self.overlay.compose(&oriented)?)
  }
}

/// 对同一帧重复推理，跳过前 `warmup` 次后统计耗时
pub fn repeat_inference<D: Detector>(
  detector: &mut D,
  frame: &RgbImage,
  times: usize,
  warmup: usize,
) -> Result<LatencyStats, DetectorError> {
  let mut stats = LatencyStats::default();
  for i in 0..times {
    let (result, elapsed) = timed(|| detector.detect(frame));
    let detections = result?;
    debug!("({})推理完成，{} 个目标，耗时: {:.2?}", i, detections.len(), elapsed);
    if i >= warmup {
      stats.record(elapsed);
    }
  }
  Ok(stats)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::DetectorConfig;
  use crate::frame::Size;
  use crate::model::BoundingBox;
  use image::{Rgb, Rgba};

  struct FixedDetector {
    size: Size,
    detections: Vec<Detection>,
  }

  impl Detector for FixedDetector {
    fn load(_config: &DetectorConfig) -> Result<Self, DetectorError> {
      Ok(Self {
        size: Size::new(4, 4),
        detections: Vec::new(),
      })
    }

    fn input_size(&self) -> Size {
      self.size
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
      crate::model::check_input_shape(image, self.size)?;
      Ok(self.detections.clone())
    }
  }

  fn person() -> Detection {
    Detection {
      bounding_box: BoundingBox::new(0.1, 0.2, 0.5, 0.6),
      class_id: 0,
      score: 0.9,
    }
  }

  #[test]
  fn latency_stats_track_extremes() {
    let mut stats = LatencyStats::default();
    assert_eq!(stats.mean(), None);
    for ms in [30, 10, 20] {
      stats.record(Duration::from_millis(ms));
    }
    assert_eq!(stats.count(), 3);
    assert_eq!(stats.mean(), Some(Duration::from_millis(20)));
    assert_eq!(stats.min(), Some(Duration::from_millis(10)));
    assert_eq!(stats.max(), Some(Duration::from_millis(30)));
  }

  #[test]
  fn timed_returns_value() {
    let (value, elapsed) = timed(|| 7);
    assert_eq!(value, 7);
    assert!(elapsed < Duration::from_secs(1));
  }

  #[test]
  fn stop_signal_fires_once_per_send() {
    let (tx, signal) = StopSignal::channel();
    assert!(!signal.requested());
    tx.send(()).unwrap();
    assert!(signal.requested());
    assert!(!signal.requested());
    drop(tx);
    assert!(!signal.requested());
  }

  #[test]
  fn annotations_land_at_rescaled_box() {
    let mut overlay = Overlay::new(Size::new(640, 480));
    let labels = LabelTable::parse("0 person\n").unwrap();
    annotate_detections(&mut overlay, &[person()], &labels);

    let red = Rgba([255, 0, 0, 255]);
    assert_eq!(*overlay.canvas().get_pixel(128, 48), red);
    assert_eq!(*overlay.canvas().get_pixel(384, 240), red);
    assert_eq!(*overlay.canvas().get_pixel(200, 100), Rgba([0, 0, 0, 0]));
  }

  #[test]
  fn step_blends_overlay_over_oriented_frame() {
    let detector = FixedDetector {
      size: Size::new(4, 4),
      detections: vec![person()],
    };
    let mut pipeline = Pipeline::new(detector, LabelTable::default(), Overlay::new(Size::new(10, 10)));
    let raw = RgbImage::from_pixel(10, 10, Rgb([100, 100, 100]));

    let composed = pipeline.step(&raw).unwrap();
    assert_eq!(composed.dimensions(), (10, 10));
    // 外框左上角 (2, 1)
    assert_eq!(*composed.get_pixel(2, 1), Rgb([178, 50, 50]));
    assert_eq!(*composed.get_pixel(9, 9), Rgb([50, 50, 50]));
    assert_eq!(pipeline.report().frames, 1);
    assert_eq!(pipeline.report().detections, 1);
    assert_eq!(pipeline.state(), DriverState::Init);
  }

  #[test]
  fn repeat_inference_skips_warmup() {
    let mut detector = FixedDetector::load(&DetectorConfig::default()).unwrap();
    let frame = RgbImage::new(4, 4);
    let stats = repeat_inference(&mut detector, &frame, 5, 2).unwrap();
    assert_eq!(stats.count(), 3);
  }

  #[test]
  fn repeat_inference_propagates_shape_error() {
    let mut detector = FixedDetector::load(&DetectorConfig::default()).unwrap();
    let frame = RgbImage::new(3, 4);
    assert!(matches!(
      repeat_inference(&mut detector, &frame, 3, 0),
      Err(DetectorError::Shape { .. })
    ));
  }
}
