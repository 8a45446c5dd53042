// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Local};
use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::DisplayConfig,
  output::{DisplayError, DisplaySink},
};

/// 按日期分目录保存每一帧合成画面：`<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.png`
pub struct DirectoryRecordDisplay {
  directory: PathBuf,
  frame_counter: u16,
  written: u64,
}

impl FromUrlWithScheme for DirectoryRecordDisplay {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordDisplay {
  type Error = DisplayError;

  fn from_url(url: &Url, _display: &DisplayConfig) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DisplayError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(Self::new(url.path()))
  }
}

impl DirectoryRecordDisplay {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      frame_counter: 0,
      written: 0,
    }
  }

  fn frame_path(&mut self, now: DateTime<Local>) -> Result<PathBuf, DisplayError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    self.frame_counter = self.frame_counter.wrapping_add(1);
    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_counter
    )))
  }
}

impl DisplaySink for DirectoryRecordDisplay {
  fn open(&mut self) -> Result<(), DisplayError> {
    std::fs::create_dir_all(&self.directory)?;
    info!("记录合成画面到目录: {}", self.directory.display());
    Ok(())
  }

  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
    let path = self.frame_path(Local::now())?;
    frame.save(&path)?;
    self.written += 1;
    debug!("保存帧: {}", path.display());
    Ok(())
  }

  fn stop_requested(&mut self) -> bool {
    false
  }

  fn close(&mut self) {
    info!(
      "目录记录关闭: {}, 共 {} 帧",
      self.directory.display(),
      self.written
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn count_png(dir: &std::path::Path) -> usize {
    let mut total = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        total += count_png(&path);
      } else if path.extension().is_some_and(|ext| ext == "png") {
        total += 1;
      }
    }
    total
  }

  #[test]
  fn records_every_frame_under_date_folders() {
    let dir = tempfile::tempdir().unwrap();
    let mut display = DirectoryRecordDisplay::new(dir.path());
    display.open().unwrap();
    for _ in 0..3 {
      display.show(&RgbImage::new(2, 2)).unwrap();
    }
    display.close();

    assert_eq!(count_png(dir.path()), 3);
    let year = Local::now().year().to_string();
    assert!(dir.path().join(year).is_dir());
  }

  #[test]
  fn frame_names_carry_counter() {
    let dir = tempfile::tempdir().unwrap();
    let mut display = DirectoryRecordDisplay::new(dir.path());
    let now = Local::now();
    let first = display.frame_path(now).unwrap();
    let second = display.frame_path(now).unwrap();
    assert_ne!(first, second);
    assert!(first.to_string_lossy().ends_with("-0001.png"));
    assert!(second.to_string_lossy().ends_with("-0002.png"));
  }
}
