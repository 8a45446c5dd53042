// 该文件是 Qianli （千里眼） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件第 {line} 行格式错误: {reason}")]
  Format { line: usize, reason: String },
}

/// 类别 id 到标签文本的映射，加载后不可变
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  labels: HashMap<u32, String>,
}

impl LabelTable {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let bytes = std::fs::read(path).map_err(|source| LabelError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let text = String::from_utf8(bytes).map_err(|e| {
      let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
      let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
      LabelError::Format {
        line,
        reason: "不是有效的 UTF-8 文本".to_string(),
      }
    })?;

    let table = Self::parse(&text)?;
    info!("标签加载完成，共 {} 项", table.len());
    Ok(table)
  }

  /// 逐行解析。带数字前缀的行使用显式 id，其余行使用行号（从 0 开始）。
  /// 重复的 id 以最后一次出现为准。
  pub fn parse(text: &str) -> Result<Self, LabelError> {
    let mut labels = HashMap::new();

    for (row, line) in text.lines().enumerate() {
      let (head, rest) = split_line(line);
      let (id, label) = match rest {
        Some(rest) if is_numeric_id(head) => {
          let id = head.parse::<u32>().map_err(|e| LabelError::Format {
            line: row + 1,
            reason: format!("类别 id {} 无效: {}", head, e),
          })?;
          (id, rest)
        }
        _ => (row as u32, line.trim()),
      };

      if let Some(previous) = labels.insert(id, label.to_string()) {
        debug!("类别 {} 被覆盖: {} -> {}", id, previous, label);
      }
    }

    Ok(Self { labels })
  }

  pub fn get(&self, id: u32) -> Option<&str> {
    self.labels.get(&id).map(String::as_str)
  }

  /// 用于显示的名称；未知 id 显示为数字本身
  pub fn display_name(&self, id: u32) -> String {
    self
      .get(id)
      .map(str::to_string)
      .unwrap_or_else(|| id.to_string())
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

fn is_separator(c: char) -> bool {
  c == ':' || c.is_whitespace()
}

fn is_numeric_id(s: &str) -> bool {
  !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

// 在第一段冒号/空白处切成至多两部分
fn split_line(line: &str) -> (&str, Option<&str>) {
  let line = line.trim();
  match line.find(is_separator) {
    Some(start) => (
      &line[..start],
      Some(line[start..].trim_start_matches(is_separator)),
    ),
    None => (line, None),
  }
}
