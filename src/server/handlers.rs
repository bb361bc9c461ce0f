// 该文件是 Anjian （安检） 项目的一部分。
// src/server/handlers.rs - 请求处理
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

use std::convert::Infallible;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use image::ImageFormat;
use serde::Serialize;
use tracing::{info, warn};
use warp::http::{HeaderValue, StatusCode, header};
use warp::multipart::FormData;
use warp::reply::Response;
use warp::Reply;

use crate::{
  classify::{Classification, ClassifyError},
  convert::{self, Converted, SourceInfo, TargetFormat},
  input::{ImageFileInput, InputError},
  output::ScanReport,
  threat::{self, RiskLevel},
};

use super::{
  SCAN_FORMATS, ServerError, SharedState, error_response,
  page::{self, View},
  upload::Upload,
};

fn html_response(body: String, status: StatusCode) -> Response {
  warp::reply::with_status(warp::reply::html(body), status).into_response()
}

fn api_error(error: &ServerError) -> Response {
  error_response(error.status(), error.code(), &error.to_string())
}

/// 解码上传的扫描图像并在阻塞线程上完成推理
async fn classify_upload(
  state: &SharedState,
  bytes: Bytes,
) -> Result<(Classification, Option<ImageFormat>), ServerError> {
  let classifier = state.classifier().clone();
  let result = tokio::task::spawn_blocking(move || -> Result<_, ClassifyError> {
    let input = ImageFileInput::from_bytes(&bytes)?.accept(SCAN_FORMATS)?;
    let format = input.format();
    let image = input.into_image().ok_or(InputError::Empty)?;
    Ok((classifier.classify(&image)?, format))
  })
  .await??;
  Ok(result)
}

async fn scan(state: &SharedState, form: FormData) -> Result<(Classification, Option<String>), ServerError> {
  let upload = Upload::collect(form).await?;
  let bytes = upload.file()?;
  let (classification, format) = classify_upload(state, bytes.clone()).await?;
  let top = classification.top();
  info!(
    "扫描 {}: {} ({:.1}%)",
    upload.file_name(),
    top.name,
    top.probability * 100.0
  );
  let preview = format.map(|f| format!("data:{};base64,{}", f.to_mime_type(), STANDARD.encode(&bytes)));
  Ok((classification, preview))
}

pub async fn index(state: SharedState) -> Result<Response, Infallible> {
  Ok(html_response(
    page::render_page(&state, View::Home),
    StatusCode::OK,
  ))
}

pub async fn scan_page(state: SharedState, form: FormData) -> Result<Response, Infallible> {
  match scan(&state, form).await {
    Ok((classification, preview)) => Ok(html_response(
      page::render_page(
        &state,
        View::Scan {
          classification: &classification,
          preview: preview.as_deref(),
        },
      ),
      StatusCode::OK,
    )),
    Err(e) => {
      warn!("扫描失败: {}", e);
      Ok(html_response(
        page::render_page(&state, View::ScanError(&e.to_string())),
        e.status(),
      ))
    }
  }
}

pub async fn classify_json(state: SharedState, form: FormData) -> Result<Response, Infallible> {
  match scan(&state, form).await {
    Ok((classification, _)) => {
      let report = ScanReport::new(&classification, state.threshold());
      Ok(warp::reply::json(&report).into_response())
    }
    Err(e) => {
      warn!("分类请求失败: {}", e);
      Ok(api_error(&e))
    }
  }
}

/// 下载文件名的 `Content-Disposition`，非 ASCII 名称按 RFC 5987 编码
pub fn content_disposition(file_name: &str) -> String {
  let fallback = file_name
    .chars()
    .map(|c| {
      if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
        c
      } else {
        '_'
      }
    })
    .collect::<String>();
  format!(
    "attachment; filename=\"{}\"; filename*=UTF-8''{}",
    fallback,
    urlencoding::encode(file_name)
  )
}

async fn convert_form(form: FormData) -> Result<(String, SourceInfo, Converted), ServerError> {
  let upload = Upload::collect(form).await?;
  let bytes = upload.file()?;
  let format = match upload.field("format") {
    Some(name) => name.parse::<TargetFormat>()?,
    None => TargetFormat::Png,
  };
  let quality = upload.parse_field::<u32>("quality")?;
  let width = upload.parse_field::<u32>("width")?;
  let height = upload.parse_field::<u32>("height")?;

  let (info, converted) = tokio::task::spawn_blocking(move || {
    convert::convert_request(&bytes, format, quality, width, height)
  })
  .await??;

  info!(
    "转换 {}: {} {}x{} -> {} {}x{}, {}",
    upload.file_name(),
    info.format,
    info.width,
    info.height,
    converted.format,
    converted.width,
    converted.height,
    converted.human_size()
  );
  Ok((converted.file_name(upload.file_name()), info, converted))
}

fn download_response(file_name: &str, info: &SourceInfo, converted: Converted) -> Response {
  let format = converted.format;
  let (width, height, size) = (converted.width, converted.height, converted.file_size());
  let human_size = converted.human_size();

  let mut response = Response::new(converted.bytes.into());
  let headers = response.headers_mut();
  headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.mime()));
  if let Ok(value) = HeaderValue::from_str(&content_disposition(file_name)) {
    headers.insert(header::CONTENT_DISPOSITION, value);
  }
  headers.insert("x-anjian-format", HeaderValue::from_static(format.name()));
  headers.insert("x-anjian-width", HeaderValue::from(width));
  headers.insert("x-anjian-height", HeaderValue::from(height));
  headers.insert("x-anjian-file-size", HeaderValue::from(size));
  if let Ok(value) = HeaderValue::from_str(&human_size) {
    headers.insert("x-anjian-human-size", value);
  }
  if let Ok(value) = HeaderValue::from_str(&info.format) {
    headers.insert("x-anjian-source-format", value);
  }
  response
}

pub async fn convert_download(state: SharedState, form: FormData) -> Result<Response, Infallible> {
  match convert_form(form).await {
    Ok((file_name, info, converted)) => Ok(download_response(&file_name, &info, converted)),
    Err(e) => {
      warn!("转换失败: {}", e);
      Ok(html_response(
        page::render_page(&state, View::ConvertError(&e.to_string())),
        e.status(),
      ))
    }
  }
}

#[derive(Debug, Serialize)]
pub struct InspectResponse {
  pub file_name: String,
  pub file_size: usize,
  pub human_size: String,
  #[serde(flatten)]
  pub source: SourceInfo,
}

async fn inspect(form: FormData) -> Result<InspectResponse, ServerError> {
  let upload = Upload::collect(form).await?;
  let bytes = upload.file()?;
  let file_size = bytes.len();
  let (_, source) = tokio::task::spawn_blocking(move || convert::decode_source(&bytes)).await??;
  Ok(InspectResponse {
    file_name: upload.file_name().to_string(),
    file_size,
    human_size: convert::human_size(file_size),
    source,
  })
}

pub async fn inspect_json(form: FormData) -> Result<Response, Infallible> {
  match inspect(form).await {
    Ok(response) => Ok(warp::reply::json(&response).into_response()),
    Err(e) => {
      warn!("读取图像信息失败: {}", e);
      Ok(api_error(&e))
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ClassEntry {
  pub index: usize,
  pub name: String,
  pub risk: RiskLevel,
  pub color: &'static str,
  pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ClassesResponse {
  pub threshold: f32,
  pub classes: Vec<ClassEntry>,
}

pub async fn classes_json(state: SharedState) -> Result<Response, Infallible> {
  let classes = state
    .classifier()
    .labels()
    .iter()
    .enumerate()
    .map(|(index, name)| {
      let info = threat::lookup(name);
      ClassEntry {
        index,
        name: name.to_string(),
        risk: info.risk,
        color: info.color,
        description: info.description,
      }
    })
    .collect();
  Ok(
    warp::reply::json(&ClassesResponse {
      threshold: state.threshold(),
      classes,
    })
    .into_response(),
  )
}

#[derive(Debug, Serialize)]
pub struct HealthResponse<'a> {
  pub status: &'static str,
  pub backend: &'a str,
  pub classes: usize,
}

pub async fn health(state: SharedState) -> Result<Response, Infallible> {
  Ok(
    warp::reply::json(&HealthResponse {
      status: "ok",
      backend: state.backend(),
      classes: state.classifier().labels().len(),
    })
    .into_response(),
  )
}
