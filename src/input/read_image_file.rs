// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage, imageops::FilterType};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::DisplayConfig,
  frame::Size,
  input::{CameraSource, CaptureError},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 以图像文件模拟摄像头。
///
/// URL 指向单个文件时产出一帧；指向目录时按文件名顺序产出目录内所有图像。
/// 读完后报告输入结束，除非带有 `loop` 参数（`image:///frames/?loop`）。
pub struct ImageFileCamera {
  path: PathBuf,
  size: Size,
  looping: bool,
  files: Vec<PathBuf>,
  pending: Option<VecDeque<PathBuf>>,
}

impl FromUrlWithScheme for ImageFileCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileCamera {
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

    let looping = url.query_pairs().any(|(k, _)| k == "loop");
    Ok(Self::new(url.path(), display.size()).with_loop(looping))
  }
}

impl ImageFileCamera {
  pub fn new(path: impl AsRef<Path>, size: Size) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      size,
      looping: false,
      files: Vec::new(),
      pending: None,
    }
  }

  pub fn with_loop(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  fn list_files(&self) -> Result<Vec<PathBuf>, CaptureError> {
    if !self.path.is_dir() {
      return Ok(vec![self.path.clone()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&self.path)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
      if is_image {
        files.push(path);
      }
    }
    files.sort();
    Ok(files)
  }

  fn load(&self, path: &Path) -> Result<RgbImage, CaptureError> {
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    let (width, height) = image.dimensions();
    if (width, height) == (self.size.width, self.size.height) {
      return Ok(image);
    }
    debug!(
      "缩放 {} 从 {}x{} 到 {}",
      path.display(),
      width,
      height,
      self.size
    );
    Ok(image::imageops::resize(
      &image,
      self.size.width,
      self.size.height,
      FilterType::Triangle,
    ))
  }
}

impl CameraSource for ImageFileCamera {
  fn open(&mut self) -> Result<(), CaptureError> {
    let files = self.list_files()?;
    if files.is_empty() {
      return Err(CaptureError::Open {
        source_name: self.path.display().to_string(),
        reason: "没有可读取的图像文件".to_string(),
      });
    }
    info!(
      "图像输入已打开: {} ({} 个文件)",
      self.path.display(),
      files.len()
    );
    self.pending = Some(files.iter().cloned().collect());
    self.files = files;
    Ok(())
  }

  fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
    let pending = self.pending.as_mut().ok_or(CaptureError::NotOpen)?;
    if pending.is_empty() && self.looping {
      pending.extend(self.files.iter().cloned());
    }
    match pending.pop_front() {
      Some(path) => self.load(&path).map(Some),
      None => Ok(None),
    }
  }

  fn close(&mut self) {
    self.pending = None;
    info!("图像输入关闭: {}", self.path.display());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn write_frames(dir: &Path, count: u8) {
    for i in 0..count {
      RgbImage::from_pixel(8, 6, Rgb([i, i, i]))
        .save(dir.join(format!("frame-{:02}.png", i)))
        .unwrap();
    }
    std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
  }

  #[test]
  fn directory_replays_in_name_order_then_ends() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 3);

    let mut camera = ImageFileCamera::new(dir.path(), Size::new(8, 6));
    camera.open().unwrap();
    for i in 0..3u8 {
      let frame = camera.read().unwrap().unwrap();
      assert_eq!(*frame.get_pixel(0, 0), Rgb([i, i, i]));
    }
    assert!(camera.read().unwrap().is_none());
    camera.close();
  }

  #[test]
  fn frames_are_resized_to_display() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 1);

    let mut camera = ImageFileCamera::new(dir.path(), Size::new(16, 12));
    camera.open().unwrap();
    let frame = camera.read().unwrap().unwrap();
    assert_eq!(frame.dimensions(), (16, 12));
  }

  #[test]
  fn loop_restarts_sequence() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 2);

    let mut camera = ImageFileCamera::new(dir.path(), Size::new(8, 6)).with_loop(true);
    camera.open().unwrap();
    for _ in 0..5 {
      assert!(camera.read().unwrap().is_some());
    }
  }

  #[test]
  fn read_before_open_fails() {
    let mut camera = ImageFileCamera::new("/nonexistent", Size::new(8, 6));
    assert!(matches!(camera.read(), Err(CaptureError::NotOpen)));
  }

  #[test]
  fn empty_directory_cannot_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = ImageFileCamera::new(dir.path(), Size::new(8, 6));
    assert!(matches!(camera.open(), Err(CaptureError::Open { .. })));
  }

  #[test]
  fn url_query_enables_loop() {
    let url = Url::parse("image:///frames/?loop").unwrap();
    let camera = ImageFileCamera::from_url(&url, &DisplayConfig::default()).unwrap();
    assert!(camera.looping);
    assert_eq!(camera.size, Size::new(640, 480));
  }
}
