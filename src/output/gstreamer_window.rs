// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/gstreamer_window.rs - GStreamer 窗口显示
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

//! # GStreamer 窗口显示
//!
//! 通过 `appsrc ! videoconvert ! autovideosink` 将合成画面显示在本地窗口。
//! 关闭窗口或管道出错时，[`DisplaySink::stop_requested`] 返回 `true`。
//!
//! ## URL Scheme
//!
//! `window://`，可选参数 `sink` 指定显示元素，例如
//! `window://?sink=ximagesink`。

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::DisplayConfig,
  output::{DisplayError, DisplaySink},
};

const DEFAULT_SINK: &str = "autovideosink";

pub struct GStreamerWindow {
  sink: String,
  width: u32,
  height: u32,
  fps: u32,
  pipeline: Option<(gst::Pipeline, gst_app::AppSrc)>,
  frame_count: u64,
}

impl FromUrlWithScheme for GStreamerWindow {
  const SCHEME: &'static str = "window";
}

impl FromUrl for GStreamerWindow {
  type Error = DisplayError;

  fn from_url(url: &Url, display: &DisplayConfig) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DisplayError::SchemeMismatch(url.scheme().to_string()));
    }

    let sink = url
      .query_pairs()
      .find(|(k, _)| k == "sink")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_SINK.to_string());

    Ok(Self {
      sink,
      width: display.width,
      height: display.height,
      fps: display.fps,
      pipeline: None,
      frame_count: 0,
    })
  }
}

fn backend<E: std::fmt::Display>(e: E) -> DisplayError {
  DisplayError::Backend(e.to_string())
}

impl DisplaySink for GStreamerWindow {
  fn open(&mut self) -> Result<(), DisplayError> {
    gst::init().map_err(backend)?;

    let description = format!(
      "appsrc name=src is-live=true ! videoconvert ! {} sync=false",
      self.sink
    );
    info!("创建显示管道: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(backend)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| DisplayError::Backend("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or_else(|| DisplayError::Backend("找不到 appsrc 元素".to_string()))?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| DisplayError::Backend("无法转换为 appsrc".to_string()))?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", self.width as i32)
      .field("height", self.height as i32)
      .field("framerate", gst::Fraction::new(self.fps as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing).map_err(backend)?;
    info!("显示窗口已打开: {}x{}", self.width, self.height);

    self.pipeline = Some((pipeline, appsrc));
    Ok(())
  }

  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
    let (_, appsrc) = self.pipeline.as_ref().ok_or(DisplayError::NotOpen)?;

    let frame_duration = 1_000_000_000 / self.fps.max(1) as u64;
    let mut buffer = gst::Buffer::from_mut_slice(frame.as_raw().clone());
    if let Some(buffer_ref) = buffer.get_mut() {
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.frame_count * frame_duration,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }

    appsrc
      .push_buffer(buffer)
      .map_err(|e| DisplayError::Backend(format!("推送缓冲区失败: {:?}", e)))?;
    self.frame_count += 1;
    Ok(())
  }

  fn stop_requested(&mut self) -> bool {
    let Some((pipeline, _)) = self.pipeline.as_ref() else {
      return false;
    };
    let Some(bus) = pipeline.bus() else {
      return false;
    };

    match bus.pop_filtered(&[gst::MessageType::Eos, gst::MessageType::Error]) {
      Some(message) => {
        match message.view() {
          gst::MessageView::Error(err) => warn!("显示管道错误: {}", err.error()),
          _ => info!("显示窗口已关闭"),
        }
        true
      }
      None => false,
    }
  }

  fn close(&mut self) {
    if let Some((pipeline, appsrc)) = self.pipeline.take() {
      let _ = appsrc.end_of_stream();
      if let Err(e) = pipeline.set_state(gst::State::Null) {
        warn!("停止显示管道失败: {}", e);
      }
      info!("显示窗口关闭，共显示 {} 帧", self.frame_count);
    }
  }
}
