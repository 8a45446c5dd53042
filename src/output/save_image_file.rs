// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::DisplayConfig,
  output::{DisplayError, DisplaySink},
};

/// 将最新一帧合成画面覆盖写入同一个图像文件
pub struct SaveImageFileDisplay {
  path: PathBuf,
  written: u64,
}

impl FromUrlWithScheme for SaveImageFileDisplay {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileDisplay {
  type Error = DisplayError;

  fn from_url(url: &Url, _display: &DisplayConfig) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DisplayError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(Self::new(url.path()))
  }
}

impl SaveImageFileDisplay {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      written: 0,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl DisplaySink for SaveImageFileDisplay {
  fn open(&mut self) -> Result<(), DisplayError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    info!("输出图像文件: {}", self.path.display());
    Ok(())
  }

  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
    frame.save(&self.path)?;
    self.written += 1;
    debug!("保存图像到文件: {}", self.path.display());
    Ok(())
  }

  fn stop_requested(&mut self) -> bool {
    false
  }

  fn close(&mut self) {
    info!("图像输出关闭，共写入 {} 帧", self.written);
  }
}
