// 该文件是 Anjian （安检） 项目的一部分。
// tests/server.rs - HTTP 接口测试
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

use std::io::Cursor;
use std::sync::Arc;

use anjian::{
  ModelFrame,
  classify::ThreatClassifier,
  label::ClassLabels,
  model::{Model, ModelError, Probabilities},
  server::{self, AppState},
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use warp::http::StatusCode;

const BOUNDARY: &str = "anjian-test-boundary";

/// 总是返回同一组输出的模型
struct FixedModel(Vec<f32>);

impl Model for FixedModel {
  type Input = ModelFrame;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Probabilities::from_raw(self.0.clone())
  }
}

fn labels() -> ClassLabels {
  ClassLabels::new([
    "Class 1_Battery",
    "Class 2_Bullet",
    "Class 3_Hammer",
    "Class 4_Knife",
    "Class 5_Lighter",
    "Class 6_Pliers",
    "Class 7_Scissors",
  ])
  .unwrap()
}

fn state_with(output: Vec<f32>, max_upload_bytes: u64) -> server::SharedState {
  let classifier = ThreatClassifier::new(FixedModel(output), labels());
  Arc::new(
    AppState::new(Arc::new(classifier))
      .with_max_upload_bytes(max_upload_bytes)
      .with_backend("Test Runtime"),
  )
}

fn confident_state() -> server::SharedState {
  state_with(vec![0.02, 0.03, 0.05, 0.80, 0.04, 0.03, 0.03], 1024 * 1024)
}

fn encode(format: ImageFormat) -> Vec<u8> {
  let image = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 128]));
  let mut buf = Cursor::new(Vec::new());
  DynamicImage::ImageRgb8(image).write_to(&mut buf, format).unwrap();
  buf.into_inner()
}

fn multipart(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
  let mut body = Vec::new();
  for (name, value) in fields {
    body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
      )
      .as_bytes(),
    );
  }
  if let Some((file_name, data)) = file {
    body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
      )
      .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
  }
  body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
  body
}

async fn post(
  state: server::SharedState,
  path: &str,
  file: Option<(&str, &[u8])>,
  fields: &[(&str, &str)],
) -> warp::http::Response<bytes::Bytes> {
  warp::test::request()
    .method("POST")
    .path(path)
    .header(
      "content-type",
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(multipart(file, fields))
    .reply(&server::routes(state))
    .await
}

fn json(resp: &warp::http::Response<bytes::Bytes>) -> Value {
  serde_json::from_slice(resp.body()).unwrap()
}

#[tokio::test]
async fn index_page_renders() {
  let resp = warp::test::request()
    .method("GET")
    .path("/")
    .reply(&server::routes(confident_state()))
    .await;

  assert_eq!(resp.status(), StatusCode::OK);
  let html = String::from_utf8_lossy(resp.body());
  assert!(html.contains("X-Ray Threat"));
  assert!(html.contains("DETECTABLE THREAT CATEGORIES"));
  assert!(html.contains("Test Runtime"));
  assert!(html.contains("7 threat types"));
}

#[tokio::test]
async fn classify_returns_confident_verdict() {
  let png = encode(ImageFormat::Png);
  let resp = post(confident_state(), "/api/v1/classify", Some(("scan.png", &png)), &[]).await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = json(&resp);
  assert_eq!(body["verdict"]["label"], "Knife");
  assert_eq!(body["verdict"]["uncertain"], false);
  assert_eq!(body["verdict"]["risk"], "High");

  let probabilities = body["probabilities"].as_array().unwrap();
  assert_eq!(probabilities.len(), 7);
  assert_eq!(probabilities[0]["name"], "Knife");
  let sum: f64 = probabilities
    .iter()
    .map(|p| p["probability"].as_f64().unwrap())
    .sum();
  assert!((sum - 1.0).abs() < 1e-3);
}

#[tokio::test]
async fn low_confidence_is_not_known() {
  let state = state_with(vec![0.20, 0.15, 0.10, 0.25, 0.10, 0.10, 0.10], 1024 * 1024);
  let png = encode(ImageFormat::Png);
  let resp = post(state, "/api/v1/classify", Some(("scan.png", &png)), &[]).await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = json(&resp);
  assert_eq!(body["verdict"]["label"], "Not Known");
  assert_eq!(body["verdict"]["predicted_class"], "Knife");
  assert_eq!(body["verdict"]["hint"], "Knife");
}

#[tokio::test]
async fn undecodable_upload_is_rejected() {
  let resp = post(
    confident_state(),
    "/api/v1/classify",
    Some(("scan.png", b"definitely not an image")),
    &[],
  )
  .await;

  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  let body = json(&resp);
  assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn scanner_only_accepts_png_jpeg_bmp() {
  let gif = encode(ImageFormat::Gif);
  let resp = post(confident_state(), "/api/v1/classify", Some(("scan.gif", &gif)), &[]).await;

  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(json(&resp)["code"], "unsupported_format");

  let bmp = encode(ImageFormat::Bmp);
  let resp = post(confident_state(), "/api/v1/classify", Some(("scan.bmp", &bmp)), &[]).await;
  assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_file_is_bad_request() {
  let resp = post(confident_state(), "/api/v1/classify", None, &[("note", "x")]).await;

  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(json(&resp)["code"], "missing_file");
}

#[tokio::test]
async fn scan_page_shows_result_and_preview() {
  let jpeg = encode(ImageFormat::Jpeg);
  let resp = post(confident_state(), "/scan", Some(("bag.jpg", &jpeg)), &[]).await;

  assert_eq!(resp.status(), StatusCode::OK);
  let html = String::from_utf8_lossy(resp.body());
  assert!(html.contains("DETECTED OBJECT"));
  assert!(html.contains(">Knife</h2>"));
  assert!(html.contains("80.0%"));
  assert!(html.contains("data:image/jpeg;base64,"));
  assert!(html.contains("All Class Probabilities"));
}

#[tokio::test]
async fn scan_page_reports_errors_in_card() {
  let resp = post(confident_state(), "/scan", Some(("bag.png", b"broken")), &[]).await;

  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  let html = String::from_utf8_lossy(resp.body());
  assert!(html.contains("Could not analyse this image"));
}

#[tokio::test]
async fn convert_returns_lossless_attachment() {
  let png = encode(ImageFormat::Png);
  let resp = post(
    confident_state(),
    "/convert",
    Some(("scan.png", &png)),
    &[("format", "BMP")],
  )
  .await;

  assert_eq!(resp.status(), StatusCode::OK);
  let headers = resp.headers();
  assert_eq!(headers["content-type"], "image/bmp");
  assert!(
    headers["content-disposition"]
      .to_str()
      .unwrap()
      .contains("filename=\"scan_converted.bmp\"")
  );
  assert_eq!(headers["x-anjian-format"], "BMP");
  assert_eq!(headers["x-anjian-source-format"], "PNG");
  assert_eq!(headers["x-anjian-width"], "32");

  let original = image::load_from_memory(&png).unwrap().to_rgb8();
  let converted = image::load_from_memory(resp.body()).unwrap().to_rgb8();
  assert_eq!(original, converted);
}

#[tokio::test]
async fn convert_resizes_jpeg() {
  let png = encode(ImageFormat::Png);
  let resp = post(
    confident_state(),
    "/convert",
    Some(("scan.png", &png)),
    &[("format", "jpg"), ("quality", "60"), ("width", "16"), ("height", "8")],
  )
  .await;

  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()["content-type"], "image/jpeg");
  let converted = image::load_from_memory(resp.body()).unwrap();
  assert_eq!((converted.width(), converted.height()), (16, 8));
}

#[tokio::test]
async fn convert_rejects_bad_options() {
  let png = encode(ImageFormat::Png);
  let resp = post(
    confident_state(),
    "/convert",
    Some(("scan.png", &png)),
    &[("format", "JPEG"), ("quality", "5")],
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(String::from_utf8_lossy(resp.body()).contains("Conversion failed"));

  let resp = post(
    confident_state(),
    "/convert",
    Some(("scan.png", &png)),
    &[("format", "heic")],
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn convert_rejects_huge_resize() {
  let png = encode(ImageFormat::Png);
  let resp = post(
    confident_state(),
    "/convert",
    Some(("scan.png", &png)),
    &[("format", "PNG"), ("width", "1000000"), ("height", "1000000")],
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = String::from_utf8_lossy(resp.body()).into_owned();
  assert!(body.contains("Conversion failed"));
  assert!(body.contains("exceeds the limit"));

  // 服务仍可继续处理请求
  let resp = post(
    confident_state(),
    "/convert",
    Some(("scan.png", &png)),
    &[("format", "PNG"), ("width", "8")],
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn inspect_reports_source_info() {
  let png = encode(ImageFormat::Png);
  let resp = post(confident_state(), "/api/v1/inspect", Some(("scan.png", &png)), &[]).await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = json(&resp);
  assert_eq!(body["format"], "PNG");
  assert_eq!(body["width"], 32);
  assert_eq!(body["height"], 24);
  assert_eq!(body["mode"], "RGB");
  assert_eq!(body["file_name"], "scan.png");
  assert_eq!(body["file_size"], png.len());
}

#[tokio::test]
async fn classes_lists_catalog_metadata() {
  let resp = warp::test::request()
    .method("GET")
    .path("/api/v1/classes")
    .reply(&server::routes(confident_state()))
    .await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = json(&resp);
  let classes = body["classes"].as_array().unwrap();
  assert_eq!(classes.len(), 7);
  assert_eq!(classes[3]["name"], "Knife");
  assert_eq!(classes[3]["risk"], "High");
  assert_eq!(classes[4]["risk"], "Low");
  assert!((body["threshold"].as_f64().unwrap() - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn health_and_unknown_routes() {
  let routes = server::routes(confident_state());

  let resp = warp::test::request().path("/healthz").reply(&routes).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(&resp)["status"], "ok");

  let resp = warp::test::request().path("/nowhere").reply(&routes).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert_eq!(json(&resp)["code"], "not_found");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
  let state = state_with(vec![0.1, 0.1, 0.1, 0.4, 0.1, 0.1, 0.1], 64);
  let png = encode(ImageFormat::Png);
  let resp = post(state, "/api/v1/classify", Some(("scan.png", &png)), &[]).await;

  assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
  assert_eq!(json(&resp)["code"], "payload_too_large");
}
