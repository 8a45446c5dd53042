// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output.rs - 叠加层与显示输出
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
use url::Url;

use crate::FromUrl;
#[cfg(any(
  feature = "save_image_file",
  feature = "directory_record",
  feature = "gstreamer_output"
))]
use crate::FromUrlWithScheme;
use crate::config::DisplayConfig;

pub mod overlay;
pub use self::overlay::{Overlay, OverlayError};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::SaveImageFileDisplay;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::DirectoryRecordDisplay;

#[cfg(feature = "gstreamer_output")]
mod gstreamer_window;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_window::GStreamerWindow;

#[derive(Error, Debug)]
pub enum DisplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("显示输出尚未打开")]
  NotOpen,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("显示后端错误: {0}")]
  Backend(String),
}

/// 显示输出。
///
/// `open` 与 `close` 由流水线成对调用，每次运行各一次。
pub trait DisplaySink {
  fn open(&mut self) -> Result<(), DisplayError>;

  /// 展示一帧已合成的画面
  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

  /// 自上次查询以来是否收到停止请求，不阻塞
  fn stop_requested(&mut self) -> bool;

  fn close(&mut self);
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFile(SaveImageFileDisplay),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordDisplay),
  #[cfg(feature = "gstreamer_output")]
  GStreamerWindow(GStreamerWindow),
}

impl FromUrl for OutputWrapper {
  type Error = DisplayError;

  #[allow(unused_variables)]
  fn from_url(url: &Url, display: &DisplayConfig) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileDisplay::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileDisplay::from_url(url, display)?,
      )),
      #[cfg(feature = "directory_record")]
      DirectoryRecordDisplay::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordDisplay::from_url(url, display)?,
      )),
      #[cfg(feature = "gstreamer_output")]
      GStreamerWindow::SCHEME => Ok(OutputWrapper::GStreamerWindow(
        GStreamerWindow::from_url(url, display)?,
      )),
      other => Err(DisplayError::SchemeMismatch(other.to_string())),
    }
  }
}

impl DisplaySink for OutputWrapper {
  fn open(&mut self) -> Result<(), DisplayError> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output.open(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.open(),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerWindow(output) => output.open(),
    }
  }

  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output.show(frame),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.show(frame),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerWindow(output) => output.show(frame),
    }
  }

  fn stop_requested(&mut self) -> bool {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output.stop_requested(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.stop_requested(),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerWindow(output) => output.stop_requested(),
    }
  }

  fn close(&mut self) {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output.close(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.close(),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerWindow(output) => output.close(),
    }
  }
}
