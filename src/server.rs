// 该文件是 Anjian （安检） 项目的一部分。
// src/server.rs - HTTP 服务
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

//! 网页与 JSON 接口。
//!
//! | 路由 | 说明 |
//! |---|---|
//! | `GET /` | 页面 |
//! | `POST /scan` | 上传扫描图像，返回带结果卡片的页面 |
//! | `POST /convert` | 上传图像并转换格式，返回附件 |
//! | `POST /api/v1/classify` | 分类，JSON |
//! | `POST /api/v1/inspect` | 源图像信息，JSON |
//! | `GET /api/v1/classes` | 类别列表，JSON |
//! | `GET /healthz` | 就绪检查 |

use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::{
  classify::{CONFIDENCE_THRESHOLD, Classifier, ClassifyError},
  convert::ConvertError,
  input::InputError,
};

mod handlers;
mod page;
mod upload;

pub use self::page::escape_html;

/// 扫描页面接受的上传格式
pub const SCAN_FORMATS: &[image::ImageFormat] = &[
  image::ImageFormat::Png,
  image::ImageFormat::Jpeg,
  image::ImageFormat::Bmp,
];

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// 所有请求共享的只读状态
pub struct AppState {
  classifier: Arc<dyn Classifier>,
  threshold: f32,
  max_upload_bytes: u64,
  backend: String,
}

impl AppState {
  pub fn new(classifier: Arc<dyn Classifier>) -> Self {
    Self {
      classifier,
      threshold: CONFIDENCE_THRESHOLD,
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
      backend: "ONNX Runtime".to_string(),
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
    self.max_upload_bytes = max_upload_bytes;
    self
  }

  /// 页面侧栏中显示的推理后端名称
  pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
    self.backend = backend.into();
    self
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn max_upload_bytes(&self) -> u64 {
    self.max_upload_bytes
  }

  pub fn backend(&self) -> &str {
    &self.backend
  }

  pub fn classifier(&self) -> &Arc<dyn Classifier> {
    &self.classifier
  }
}

pub type SharedState = Arc<AppState>;

/// 请求处理中的错误，统一映射到状态码
#[derive(Error, Debug)]
pub enum ServerError {
  #[error("No file was uploaded")]
  MissingFile,
  #[error("Invalid value for '{field}': {value}")]
  InvalidField { field: &'static str, value: String },
  #[error("Malformed upload: {0}")]
  Multipart(#[from] warp::Error),
  #[error(transparent)]
  Classify(#[from] ClassifyError),
  #[error(transparent)]
  Convert(#[from] ConvertError),
  #[error("Worker task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl ServerError {
  pub fn status(&self) -> StatusCode {
    match self {
      ServerError::MissingFile | ServerError::InvalidField { .. } | ServerError::Multipart(_) => {
        StatusCode::BAD_REQUEST
      }
      ServerError::Classify(ClassifyError::Input(_)) => StatusCode::UNPROCESSABLE_ENTITY,
      ServerError::Classify(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ServerError::Convert(ConvertError::Input(_)) => StatusCode::UNPROCESSABLE_ENTITY,
      ServerError::Convert(ConvertError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
      ServerError::Convert(_) => StatusCode::BAD_REQUEST,
      ServerError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      ServerError::MissingFile => "missing_file",
      ServerError::InvalidField { .. } => "invalid_field",
      ServerError::Multipart(_) => "malformed_upload",
      ServerError::Classify(ClassifyError::Input(e)) | ServerError::Convert(ConvertError::Input(e)) => {
        input_error_code(e)
      }
      ServerError::Classify(ClassifyError::OutputMismatch { .. }) => "dimension_mismatch",
      ServerError::Classify(ClassifyError::Model(_)) => "inference_failed",
      ServerError::Convert(ConvertError::UnsupportedTarget(_)) => "unsupported_target",
      ServerError::Convert(ConvertError::InvalidQuality(_)) => "invalid_quality",
      ServerError::Convert(ConvertError::InvalidSize | ConvertError::TooLarge { .. }) => "invalid_size",
      ServerError::Convert(ConvertError::Encode(_)) => "encode_failed",
      ServerError::Join(_) => "internal_error",
    }
  }
}

fn input_error_code(error: &InputError) -> &'static str {
  match error {
    InputError::UnsupportedFormat { .. } | InputError::UnknownFormat => "unsupported_format",
    InputError::Empty => "empty_upload",
    _ => "invalid_image",
  }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
  pub error: String,
  pub code: String,
}

pub fn error_response(status: StatusCode, code: &str, message: &str) -> warp::reply::Response {
  let body = ApiError {
    error: message.to_string(),
    code: code.to_string(),
  };
  warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn with_state(state: SharedState) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
  warp::any().map(move || state.clone())
}

fn multipart(max_length: u64) -> impl Filter<Extract = (warp::multipart::FormData,), Error = Rejection> + Clone {
  warp::multipart::form().max_length(max_length)
}

/// 完整的路由树，包含错误恢复
pub fn routes(state: SharedState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
  let max_upload = state.max_upload_bytes;
  let index = warp::path::end()
    .and(warp::get())
    .and(with_state(state.clone()))
    .and_then(handlers::index);

  let scan = warp::path("scan")
    .and(warp::path::end())
    .and(warp::post())
    .and(with_state(state.clone()))
    .and(multipart(max_upload))
    .and_then(handlers::scan_page);

  let convert = warp::path("convert")
    .and(warp::path::end())
    .and(warp::post())
    .and(with_state(state.clone()))
    .and(multipart(max_upload))
    .and_then(handlers::convert_download);

  let health = warp::path("healthz")
    .and(warp::path::end())
    .and(warp::get())
    .and(with_state(state.clone()))
    .and_then(handlers::health);

  let api = warp::path("api").and(warp::path("v1"));

  let classify = api
    .clone()
    .and(warp::path("classify"))
    .and(warp::path::end())
    .and(warp::post())
    .and(with_state(state.clone()))
    .and(multipart(max_upload))
    .and_then(handlers::classify_json);

  let inspect = api
    .clone()
    .and(warp::path("inspect"))
    .and(warp::path::end())
    .and(warp::post())
    .and(multipart(max_upload))
    .and_then(handlers::inspect_json);

  let classes = api
    .and(warp::path("classes"))
    .and(warp::path::end())
    .and(warp::get())
    .and(with_state(state))
    .and_then(handlers::classes_json);

  index
    .or(scan)
    .or(convert)
    .or(health)
    .or(classify)
    .or(inspect)
    .or(classes)
    .recover(handle_rejection)
}

/// 把 warp 的拒绝转换成 JSON 错误
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
  let (status, code, message) = if err.is_not_found() {
    (StatusCode::NOT_FOUND, "not_found", "Not found".to_string())
  } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
    (
      StatusCode::PAYLOAD_TOO_LARGE,
      "payload_too_large",
      "Uploaded file is too large".to_string(),
    )
  } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
    (
      StatusCode::METHOD_NOT_ALLOWED,
      "method_not_allowed",
      "Method not allowed".to_string(),
    )
  } else if err.find::<warp::reject::UnsupportedMediaType>().is_some()
    || err.find::<warp::reject::MissingHeader>().is_some()
    || err.find::<warp::reject::InvalidHeader>().is_some()
  {
    (
      StatusCode::BAD_REQUEST,
      "malformed_upload",
      "Expected a multipart/form-data upload".to_string(),
    )
  } else {
    warn!("未处理的请求拒绝: {:?}", err);
    (
      StatusCode::INTERNAL_SERVER_ERROR,
      "internal_error",
      "Internal server error".to_string(),
    )
  };
  debug!("请求被拒绝: {} {}", status, code);
  Ok(error_response(status, code, &message))
}
