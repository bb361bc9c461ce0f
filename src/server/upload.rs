// 该文件是 Anjian （安检） 项目的一部分。
// src/server/upload.rs - 表单上传
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
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::TryStreamExt;
use tracing::debug;
use warp::multipart::FormData;

use super::ServerError;

/// 文件字段的名称
pub const FILE_FIELD: &str = "file";

/// 读完的 multipart 表单：一个文件加若干文本字段
#[derive(Debug, Default)]
pub struct Upload {
  file_name: Option<String>,
  file: Option<Bytes>,
  fields: HashMap<String, String>,
}

impl Upload {
  /// 按顺序读完每个部分，下一部分开始前必须读完上一部分
  pub async fn collect(form: FormData) -> Result<Self, warp::Error> {
    let parts: Vec<(String, Option<String>, Bytes)> = form
      .and_then(|part| async move {
        let name = part.name().to_string();
        let file_name = part.filename().map(str::to_string);
        let data = part
          .stream()
          .try_fold(BytesMut::new(), |mut acc, buf| async move {
            acc.put(buf);
            Ok(acc)
          })
          .await?;
        Ok::<_, warp::Error>((name, file_name, data.freeze()))
      })
      .try_collect()
      .await?;

    let mut upload = Upload::default();
    for (name, file_name, data) in parts {
      if name == FILE_FIELD {
        debug!("收到上传文件: {:?}, {} 字节", file_name, data.len());
        upload.file_name = file_name;
        upload.file = Some(data);
      } else {
        upload
          .fields
          .insert(name, String::from_utf8_lossy(&data).into_owned());
      }
    }
    Ok(upload)
  }

  /// 上传的文件内容；浏览器未选择文件时会提交一个空的文件部分
  pub fn file(&self) -> Result<Bytes, ServerError> {
    match (&self.file, self.file_name.as_deref()) {
      (Some(data), Some(name)) if data.is_empty() && name.is_empty() => Err(ServerError::MissingFile),
      (Some(data), _) => Ok(data.clone()),
      (None, _) => Err(ServerError::MissingFile),
    }
  }

  pub fn file_name(&self) -> &str {
    self.file_name.as_deref().unwrap_or("image")
  }

  /// 去掉首尾空白后的非空字段
  pub fn field(&self, name: &str) -> Option<&str> {
    self
      .fields
      .get(name)
      .map(|v| v.trim())
      .filter(|v| !v.is_empty())
  }

  pub fn parse_field<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ServerError> {
    match self.field(name) {
      Some(value) => value
        .parse::<T>()
        .map(Some)
        .map_err(|_| ServerError::InvalidField {
          field: name,
          value: value.to_string(),
        }),
      None => Ok(None),
    }
  }

  #[cfg(test)]
  pub fn from_parts(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Self {
    Upload {
      file_name: file.map(|(name, _)| name.to_string()),
      file: file.map(|(_, data)| Bytes::copy_from_slice(data)),
      fields: fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_browser_file_part_is_missing() {
    let upload = Upload::from_parts(Some(("", b"")), &[]);
    assert!(matches!(upload.file(), Err(ServerError::MissingFile)));
    assert!(matches!(
      Upload::default().file(),
      Err(ServerError::MissingFile)
    ));
  }

  #[test]
  fn named_empty_file_is_passed_through() {
    let upload = Upload::from_parts(Some(("scan.png", b"")), &[]);
    assert!(upload.file().unwrap().is_empty());
    assert_eq!(upload.file_name(), "scan.png");
  }

  #[test]
  fn parses_optional_fields() {
    let upload = Upload::from_parts(None, &[("quality", " 80 "), ("width", ""), ("height", "abc")]);
    assert_eq!(upload.parse_field::<u32>("quality").unwrap(), Some(80));
    assert_eq!(upload.parse_field::<u32>("width").unwrap(), None);
    assert_eq!(upload.parse_field::<u32>("missing").unwrap(), None);
    assert!(matches!(
      upload.parse_field::<u32>("height"),
      Err(ServerError::InvalidField { field: "height", .. })
    ));
  }
}
