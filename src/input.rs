// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input.rs - 摄像头输入
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
#[cfg(any(feature = "read_image_file", feature = "v4l_input"))]
use crate::FromUrlWithScheme;
use crate::config::DisplayConfig;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::ImageFileCamera;

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::V4lCamera;

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开输入源 {source_name}: {reason}")]
  Open { source_name: String, reason: String },
  #[error("输入源已结束")]
  EndOfStream,
  #[error("输入源尚未打开")]
  NotOpen,
  #[error("设备错误: {0}")]
  Device(String),
  #[error("帧解码错误: {0}")]
  Decode(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
}

/// 摄像头输入源，产出显示分辨率的 RGB 帧。
///
/// `open` 与 `close` 由流水线成对调用，每次运行各一次。
pub trait CameraSource {
  fn open(&mut self) -> Result<(), CaptureError>;

  /// 读取一帧；输入源耗尽时返回 `Ok(None)`
  fn read(&mut self) -> Result<Option<RgbImage>, CaptureError>;

  fn close(&mut self);
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileCamera),
  #[cfg(feature = "v4l_input")]
  V4l(V4lCamera),
}

impl FromUrl for InputWrapper {
  type Error = CaptureError;

  #[allow(unused_variables)]
  fn from_url(url: &Url, display: &DisplayConfig) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "read_image_file")]
      ImageFileCamera::SCHEME => Ok(InputWrapper::ImageFile(ImageFileCamera::from_url(
        url, display,
      )?)),
      #[cfg(feature = "v4l_input")]
      V4lCamera::SCHEME => Ok(InputWrapper::V4l(V4lCamera::from_url(url, display)?)),
      other => Err(CaptureError::SchemeMismatch(other.to_string())),
    }
  }
}

impl CameraSource for InputWrapper {
  fn open(&mut self) -> Result<(), CaptureError> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.open(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.open(),
    }
  }

  fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.read(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.read(),
    }
  }

  fn close(&mut self) {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.close(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.close(),
    }
  }
}
