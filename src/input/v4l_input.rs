// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/v4l_input.rs - V4L2 摄像头输入
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

use std::pin::Pin;

use image::{RgbImage, imageops::FilterType};
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

use crate::{
  FromUrl, FromUrlWithScheme,
  config::DisplayConfig,
  frame::Size,
  input::{CameraSource, CaptureError},
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const BUFFER_COUNT: u32 = 4;

/// V4L2 摄像头，按显示分辨率与帧率配置设备。
/// 设备无法提供显示分辨率时，帧会被缩放到显示分辨率。
///
/// `v4l:///dev/video0`，可选参数 `fourcc` 指定像素格式（RGB3、YUYV、MJPG），默认 YUYV。
pub struct V4lCamera {
  device_path: String,
  display: Size,
  // 设备实际协商出的分辨率
  width: u32,
  height: u32,
  fps: u32,
  fourcc: FourCC,
  // stream 引用 device，必须先于 device 释放
  stream: Option<Stream<'static>>,
  device: Option<Pin<Box<Device>>>,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = CaptureError;

  fn from_url(url: &Url, display: &DisplayConfig) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CaptureError::SchemeMismatch(url.scheme().to_string()));
    }

    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let fourcc = match url.query_pairs().find(|(k, _)| k == "fourcc") {
      Some((_, v)) => {
        let code: [u8; 4] = v
          .as_bytes()
          .try_into()
          .map_err(|_| CaptureError::Device(format!("无效的像素格式: {}", v)))?;
        FourCC::new(&code)
      }
      None => FourCC::new(b"YUYV"),
    };

    Ok(Self {
      device_path,
      display: display.size(),
      width: display.width,
      height: display.height,
      fps: display.fps,
      fourcc,
      stream: None,
      device: None,
    })
  }
}

fn device_error<E: std::fmt::Display>(e: E) -> CaptureError {
  CaptureError::Device(e.to_string())
}

/// 将 YUYV 转换为 RGB，每 4 字节产出两个像素
pub(crate) fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  let convert = |y: f32, u: f32, v: f32| {
    [
      (y + 1.402 * v).clamp(0.0, 255.0) as u8,
      (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
      (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
  };

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    rgb.extend_from_slice(&convert(chunk[0] as f32, u, v));
    rgb.extend_from_slice(&convert(chunk[2] as f32, u, v));
  }

  rgb
}

impl V4lCamera {
  fn decode(&self, data: &[u8]) -> Result<RgbImage, CaptureError> {
    let image = self.decode_raw(data)?;
    if Size::of(&image) == self.display {
      return Ok(image);
    }
    Ok(image::imageops::resize(
      &image,
      self.display.width,
      self.display.height,
      FilterType::Triangle,
    ))
  }

  fn decode_raw(&self, data: &[u8]) -> Result<RgbImage, CaptureError> {
    let raw = match &self.fourcc.repr {
      b"RGB3" => data.to_vec(),
      b"YUYV" => yuyv_to_rgb(data, self.width, self.height),
      b"MJPG" => {
        let image = image::load_from_memory(data)?.to_rgb8();
        if image.dimensions() != (self.width, self.height) {
          return Err(CaptureError::Decode(format!(
            "MJPG 帧尺寸 {}x{} 与设备不一致",
            image.width(),
            image.height()
          )));
        }
        return Ok(image);
      }
      other => {
        return Err(CaptureError::Decode(format!(
          "不支持的像素格式: {}",
          String::from_utf8_lossy(other)
        )));
      }
    };

    RgbImage::from_raw(self.width, self.height, raw)
      .ok_or_else(|| CaptureError::Decode("帧数据长度不足".to_string()))
  }
}

impl CameraSource for V4lCamera {
  fn open(&mut self) -> Result<(), CaptureError> {
    let device = Box::pin(Device::with_path(&self.device_path).map_err(|e| {
      CaptureError::Open {
        source_name: self.device_path.clone(),
        reason: e.to_string(),
      }
    })?);

    let requested = Format::new(self.width, self.height, self.fourcc);
    let format = device.set_format(&requested).map_err(device_error)?;
    if format.fourcc != self.fourcc {
      return Err(CaptureError::Open {
        source_name: self.device_path.clone(),
        reason: format!("设备不支持像素格式 {}", self.fourcc),
      });
    }
    if (format.width, format.height) != (self.width, self.height) {
      warn!(
        "设备分辨率 {}x{} 与请求的 {} 不一致，帧将缩放到显示分辨率",
        format.width, format.height, self.display
      );
      self.width = format.width;
      self.height = format.height;
    }

    if let Err(e) = device.set_params(&Parameters::with_fps(self.fps)) {
      warn!("无法设置帧率 {}: {}", self.fps, e);
    }

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；
    // stream 总是在 device 之前释放（见 close 与 Drop）。
    let device_ref: &Device = &device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute::<&Device, &'static Device>(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, BUFFER_COUNT)
        .map_err(device_error)?
    };

    info!(
      "摄像头已打开: {} {}x{}@{} {}",
      self.device_path, self.width, self.height, self.fps, self.fourcc
    );
    self.device = Some(device);
    self.stream = Some(stream);
    Ok(())
  }

  fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
    let stream = self.stream.as_mut().ok_or(CaptureError::NotOpen)?;
    let (buffer, meta) = stream.next().map_err(device_error)?;
    let used = (meta.bytesused as usize).min(buffer.len());
    let data = if used == 0 { buffer } else { &buffer[..used] };
    debug!("捕获帧 #{}: {} 字节", meta.sequence, data.len());

    // 借用 stream 的缓冲区期间不能再借用 self，先拷贝
    let data = data.to_vec();
    self.decode(&data).map(Some)
  }

  fn close(&mut self) {
    self.stream.take();
    if self.device.take().is_some() {
      info!("摄像头关闭: {}", self.device_path);
    }
  }
}

impl Drop for V4lCamera {
  fn drop(&mut self) {
    self.stream.take();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_grey_converts_to_grey() {
    let rgb = yuyv_to_rgb(&[128, 128, 64, 128], 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn url_selects_device_and_format() {
    let url = Url::parse("v4l:///dev/video2?fourcc=MJPG").unwrap();
    let camera = V4lCamera::from_url(&url, &DisplayConfig::default()).unwrap();
    assert_eq!(camera.device_path, "/dev/video2");
    assert_eq!(&camera.fourcc.repr, b"MJPG");
    assert_eq!((camera.width, camera.height, camera.fps), (640, 480, 3));
  }

  #[test]
  fn rgb3_frame_must_be_complete() {
    let url = Url::parse("v4l:///dev/video0?fourcc=RGB3").unwrap();
    let display = DisplayConfig {
      width: 2,
      height: 2,
      fps: 3,
    };
    let camera = V4lCamera::from_url(&url, &display).unwrap();
    assert!(camera.decode(&[0; 12]).is_ok());
    assert!(matches!(camera.decode(&[0; 6]), Err(CaptureError::Decode(_))));
  }

  #[test]
  fn frames_from_other_device_size_are_resized() {
    let url = Url::parse("v4l:///dev/video0?fourcc=RGB3").unwrap();
    let display = DisplayConfig {
      width: 4,
      height: 2,
      fps: 3,
    };
    let mut camera = V4lCamera::from_url(&url, &display).unwrap();
    // 设备协商为 2x1
    camera.width = 2;
    camera.height = 1;
    let frame = camera.decode(&[10, 20, 30, 10, 20, 30]).unwrap();
    assert_eq!(frame.dimensions(), (4, 2));
    assert!(frame.pixels().all(|p| *p == image::Rgb([10, 20, 30])));
  }
}
