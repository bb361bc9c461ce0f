// 该文件是 Anjian （安检） 项目的一部分。
// src/label.rs - 类别名称加载
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

//! 类别名称与模型输出按下标一一对应。
//!
//! 支持三种文件：
//! - `.npy`：一维 NumPy 字符串数组（`<U`/`>U` UTF-32 或 `|S` 字节串）
//! - `.json`：字符串数组
//! - `.txt`：每行一个名称

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("类别文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("NPY 文件格式错误: {0}")]
  NpyFormat(String),
  #[error("不支持的 NPY 数据类型: {0}（请保存为 Unicode 字符串数组）")]
  UnsupportedDtype(String),
  #[error("JSON 类别文件错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("不支持的类别文件扩展名: {0}")]
  UnknownExtension(String),
  #[error("类别列表为空")]
  Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
  names: Box<[String]>,
}

/// 去掉数据集前缀，例如 `Class 10_Battery` -> `Battery`
pub fn clean_class_name(raw: &str) -> String {
  match raw.split_once('_') {
    Some((_, name)) => name.to_string(),
    None => raw.to_string(),
  }
}

impl ClassLabels {
  pub fn new<I, S>(raw_names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let names = raw_names
      .into_iter()
      .map(|n| clean_class_name(n.as_ref().trim()))
      .collect::<Vec<_>>();
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self {
      names: names.into_boxed_slice(),
    })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let extension = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase())
      .unwrap_or_default();

    let bytes = std::fs::read(path)?;
    let labels = match extension.as_str() {
      "npy" => Self::new(parse_npy_strings(&bytes)?),
      "json" => Self::new(serde_json::from_slice::<Vec<String>>(&bytes)?),
      "txt" => Self::new(
        String::from_utf8_lossy(&bytes)
          .lines()
          .filter(|l| !l.trim().is_empty()),
      ),
      other => Err(LabelError::UnknownExtension(other.to_string())),
    }?;
    debug!("类别列表: {:?}", labels.names);
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

/// 解析一维 NumPy 字符串数组
pub fn parse_npy_strings(bytes: &[u8]) -> Result<Vec<String>, LabelError> {
  if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
    return Err(LabelError::NpyFormat("缺少 NPY 文件头".to_string()));
  }

  let major = bytes[6];
  let (header_len, header_start) = match major {
    1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
    2 | 3 => {
      if bytes.len() < 12 {
        return Err(LabelError::NpyFormat("文件头被截断".to_string()));
      }
      (
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
        12,
      )
    }
    v => return Err(LabelError::NpyFormat(format!("未知版本 {}", v))),
  };

  let data_start = header_start + header_len;
  let header = bytes
    .get(header_start..data_start)
    .ok_or_else(|| LabelError::NpyFormat("文件头被截断".to_string()))?;
  let header = String::from_utf8_lossy(header);

  let descr = header_value(&header, "descr")
    .map(|v| v.trim_matches(|c| c == '\'' || c == '"').to_string())
    .ok_or_else(|| LabelError::NpyFormat("缺少 descr 字段".to_string()))?;
  if header_value(&header, "fortran_order").is_some_and(|v| v.starts_with("True")) {
    return Err(LabelError::NpyFormat("不支持 Fortran 顺序".to_string()));
  }
  let count = parse_shape(&header)?;

  let (kind, width) = descr.split_at(descr.len().min(2));
  let width: usize = width
    .parse()
    .map_err(|_| LabelError::UnsupportedDtype(descr.clone()))?;
  let item_size = match kind {
    "<U" | ">U" => width * 4,
    "|S" => width,
    _ => return Err(LabelError::UnsupportedDtype(descr.clone())),
  };

  let data = &bytes[data_start..];
  if data.len() < item_size * count {
    return Err(LabelError::NpyFormat(format!(
      "数据长度不足: 需要 {} 字节, 实际 {} 字节",
      item_size * count,
      data.len()
    )));
  }

  let names = data
    .chunks_exact(item_size.max(1))
    .take(count)
    .map(|item| match kind {
      "|S" => String::from_utf8_lossy(item)
        .trim_end_matches('\0')
        .to_string(),
      _ => item
        .chunks_exact(4)
        .map(|c| {
          let code = if kind == "<U" {
            u32::from_le_bytes([c[0], c[1], c[2], c[3]])
          } else {
            u32::from_be_bytes([c[0], c[1], c[2], c[3]])
          };
          char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect::<String>()
        .trim_end_matches('\0')
        .to_string(),
    })
    .collect();

  Ok(names)
}

// 取出 `'key': value` 中的 value 文本，直到下一个顶层逗号
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
  let pattern = format!("'{}':", key);
  let start = header.find(&pattern)? + pattern.len();
  let rest = header[start..].trim_start();
  let mut depth = 0;
  for (i, c) in rest.char_indices() {
    match c {
      '(' => depth += 1,
      ')' => depth -= 1,
      ',' | '}' if depth == 0 => return Some(rest[..i].trim()),
      _ => {}
    }
  }
  Some(rest.trim())
}

fn parse_shape(header: &str) -> Result<usize, LabelError> {
  let shape = header_value(header, "shape")
    .ok_or_else(|| LabelError::NpyFormat("缺少 shape 字段".to_string()))?;
  let dims = shape
    .trim_matches(|c| c == '(' || c == ')')
    .split(',')
    .map(str::trim)
    .filter(|d| !d.is_empty())
    .map(|d| d.parse::<usize>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|_| LabelError::NpyFormat(format!("无法解析 shape: {}", shape)))?;

  match dims.as_slice() {
    [n] => Ok(*n),
    _ => Err(LabelError::NpyFormat(format!(
      "类别数组必须是一维, 实际 shape: {}",
      shape
    ))),
  }
}
