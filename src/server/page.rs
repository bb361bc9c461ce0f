// 该文件是 Anjian （安检） 项目的一部分。
// src/server/page.rs - 页面渲染
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

use crate::{
  MODEL_INPUT_H, MODEL_INPUT_W,
  classify::{Classification, bar_width, percent},
  convert::{DEFAULT_QUALITY, MAX_QUALITY, MIN_QUALITY, TargetFormat},
  threat::THREAT_CATALOG,
};

use super::AppState;

/// 页面当前展示的内容
pub enum View<'a> {
  Home,
  Scan {
    classification: &'a Classification,
    /// `data:` URI 形式的上传预览
    preview: Option<&'a str>,
  },
  ScanError(&'a str),
  ConvertError(&'a str),
}

impl View<'_> {
  fn converter_active(&self) -> bool {
    matches!(self, View::ConvertError(_))
  }
}

pub fn escape_html(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      other => out.push(other),
    }
  }
  out
}

const STYLE: &str = r#"
:root {
  --text: #e5e7eb;
  --muted: rgba(229,231,235,0.72);
  --card: rgba(15, 23, 42, 0.62);
  --card2: rgba(15, 23, 42, 0.78);
  --border: rgba(148,163,184,0.18);
  --accent: #38bdf8;
}
* { box-sizing: border-box; font-family: 'Inter', system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; }
body {
  margin: 0;
  color: var(--text);
  background:
    radial-gradient(600px 420px at 18% 22%, rgba(56,189,248,0.18), transparent 55%),
    radial-gradient(520px 380px at 78% 28%, rgba(129,140,248,0.14), transparent 55%),
    radial-gradient(680px 520px at 55% 78%, rgba(34,197,94,0.10), transparent 60%),
    #020617;
  min-height: 100vh;
}
.layout { display: flex; min-height: 100vh; }
.sidebar {
  width: 300px;
  flex-shrink: 0;
  background: rgba(15, 23, 42, 0.95);
  padding: 1.5rem;
  border-right: 1px solid var(--border);
}
.sidebar h2, .sidebar h3 { color: #e2e8f0; }
.sidebar p { color: #94a3b8; font-size: 0.9rem; line-height: 1.6; }
.details { background: rgba(30,41,59,0.6); border-radius: 12px; padding: 1rem; border: 1px solid rgba(71,85,105,0.4); }
.details p { margin: 0.3rem 0; font-size: 0.85rem; }
.details strong { color: #e2e8f0; }
main { flex: 1; padding: 1.8rem 2rem 3rem; max-width: 1200px; margin: 0 auto; }
.hero {
  border: 1px solid var(--border);
  background: linear-gradient(180deg, rgba(2,6,23,0.35), rgba(2,6,23,0.25));
  border-radius: 24px;
  padding: 3.2rem 2.4rem;
  text-align: center;
  margin-bottom: 1.8rem;
  box-shadow: 0 18px 55px rgba(0,0,0,0.35);
  animation: floatIn 700ms ease-out both;
}
.hero-kicker { color: rgba(255,255,255,0.75); letter-spacing: 0.08em; text-transform: uppercase; }
.hero-title { color: #ffffff; font-size: 4rem; font-weight: 700; letter-spacing: -0.03em; margin: 0.4rem 0 0.8rem; }
.hero-sub { color: rgba(255,255,255,0.78); font-size: 1.08rem; line-height: 1.6; }
.hero-pill {
  display: inline-flex; align-items: center; gap: 0.6rem; margin-top: 1.2rem;
  padding: 0.55rem 1rem; border-radius: 999px;
  border: 1px solid rgba(34,197,94,0.25); background: rgba(34,197,94,0.10);
}
.hero-pill .dot { width: 9px; height: 9px; border-radius: 999px; background: rgba(34,197,94,0.95); box-shadow: 0 0 14px rgba(34,197,94,0.6); }
.tab-input { display: none; }
.tabs { display: flex; background: rgba(15, 23, 42, 0.70); border-radius: 12px; padding: 0.3rem; margin-bottom: 1.5rem; }
.tabs label {
  flex: 1; text-align: center; color: #94a3b8; font-size: 1.1rem; font-weight: 600;
  padding: 0.8rem 1.5rem; border-radius: 10px; cursor: pointer;
}
.tabs label:hover { color: #e2e8f0; background: rgba(56, 189, 248, 0.15); }
#tab-scan:checked ~ .tabs label[for="tab-scan"],
#tab-convert:checked ~ .tabs label[for="tab-convert"] { background: rgba(56, 189, 248, 0.25); color: #ffffff; }
.panel { display: none; }
#tab-scan:checked ~ .panel-scan, #tab-convert:checked ~ .panel-convert { display: block; }
.columns { display: flex; gap: 2rem; flex-wrap: wrap; }
.columns > div { flex: 1; min-width: 320px; }
h3 { color: #ffffff; }
.upload-area {
  border: 2px dashed #475569; border-radius: 16px; padding: 2rem; text-align: center;
  background: rgba(30, 41, 59, 0.6);
}
.upload-area:hover { border-color: #38bdf8; }
.upload-area input, .upload-area select { margin: 0.4rem 0; color: #e2e8f0; }
.upload-area label { display: block; color: #e2e8f0; margin-top: 0.6rem; font-size: 0.9rem; }
button {
  margin-top: 1rem; width: 100%; border: none; border-radius: 999px; padding: 0.85rem 1.6rem;
  font-weight: 600; font-size: 1rem; background: rgba(255,255,255,0.92); color: rgba(2,6,23,0.95); cursor: pointer;
}
.hint { color: #e2e8f0; font-size: 0.85rem; }
.preview { width: 100%; border-radius: 12px; margin-top: 1rem; }
.result-card {
  background: var(--card2); border: 1px solid var(--border); border-radius: 18px; padding: 2rem;
  animation: floatIn 650ms ease-out both;
}
.result-head { display: flex; justify-content: space-between; align-items: center; margin-bottom: 1rem; }
.caption { color: #94a3b8; font-size: 0.85rem; margin: 0; }
.verdict { color: #e2e8f0; margin: 0.2rem 0; font-size: 2rem; }
.confidence { font-size: 2.2rem; font-weight: 700; margin: 0; }
.description { color: #94a3b8; margin-top: 1rem; font-size: 0.95rem; }
.error-card { border-color: rgba(239,68,68,0.4); }
.error-card .caption { color: #fca5a5; }
.risk-badge {
  display: inline-block; padding: 0.35rem 1rem; border-radius: 20px; font-weight: 600;
  font-size: 0.85rem; letter-spacing: 0.5px; text-transform: uppercase;
}
.risk-critical { background: rgba(239,68,68,0.2); color: #fca5a5; border: 1px solid rgba(239,68,68,0.4); }
.risk-high { background: rgba(249,115,22,0.2); color: #fdba74; border: 1px solid rgba(249,115,22,0.4); }
.risk-medium { background: rgba(234,179,8,0.2); color: #fde047; border: 1px solid rgba(234,179,8,0.4); }
.risk-low { background: rgba(34,197,94,0.2); color: #86efac; border: 1px solid rgba(34,197,94,0.4); }
.conf-bar-bg { width: 100%; height: 12px; background: rgba(51,65,85,0.8); border-radius: 6px; overflow: hidden; margin: 0.5rem 0; }
.conf-bar-fill { height: 100%; border-radius: 6px; transition: width 1.2s ease-out; }
.prob-row { display: flex; align-items: center; padding: 0.4rem 0; border-bottom: 1px solid rgba(71,85,105,0.3); }
.prob-label { flex: 1; color: rgba(226,232,240,0.92); font-size: 0.9rem; }
.prob-value { color: rgba(226,232,240,0.92); font-weight: 600; font-size: 0.9rem; min-width: 50px; text-align: right; }
.prob-bar-bg { flex: 2; height: 6px; background: rgba(51,65,85,0.6); border-radius: 3px; margin: 0 0.8rem; overflow: hidden; }
.prob-bar-fill { height: 100%; background: linear-gradient(90deg, #38bdf8, #818cf8); border-radius: 3px; }
.section-title { color: #ffffff; text-align: center; font-size: 1.7rem; font-weight: 600; margin-bottom: 0.2rem; }
.carousel-outer { overflow: hidden; width: 100%; padding: 1rem 0; }
.carousel-track { display: flex; gap: 1.2rem; width: max-content; animation: scrollCarousel 25s linear infinite; }
.carousel-outer:hover .carousel-track { animation-play-state: paused; }
.carousel-card {
  min-width: 240px; background: rgba(15, 23, 42, 0.92); border-radius: 12px; padding: 1.4rem;
  border: 1px solid rgba(71,85,105,0.5); text-align: center; flex-shrink: 0;
}
.carousel-card:hover { border-color: #38bdf8; }
.carousel-card h4 { color: #e2e8f0; margin: 0.5rem 0 0.3rem 0; font-size: 1.2rem; }
.carousel-card p { color: #c0c8d4; font-size: 0.95rem; margin: 0; }
.footer { text-align: center; padding: 2rem 0 1rem 0; color: #64748b; font-size: 0.8rem; border-top: 1px solid rgba(71,85,105,0.3); margin-top: 3rem; }
@keyframes floatIn {
  from { opacity: 0; transform: translateY(18px) scale(0.985); }
  to   { opacity: 1; transform: translateY(0) scale(1); }
}
@keyframes scrollCarousel {
  0% { transform: translateX(0); }
  100% { transform: translateX(-50%); }
}
"#;

fn render_sidebar(state: &AppState) -> String {
  format!(
    r#"<aside class="sidebar">
<h2>About</h2>
<p>This application uses a deep learning model trained on the STCray X-ray dataset to detect threats in baggage scans. The model is an EfficientNetB0 fine-tuned on {classes} threat classes.</p>
<h3>Model Details</h3>
<div class="details">
<p><strong>Architecture:</strong> EfficientNetB0</p>
<p><strong>Runtime:</strong> {backend}</p>
<p><strong>Classes:</strong> {classes} threat types</p>
<p><strong>Input Size:</strong> {w} x {h} px</p>
<p><strong>Threshold:</strong> {threshold}%</p>
</div>
<h3>How to Use</h3>
<p>1. Upload an X-ray scan image using the uploader.</p>
<p>2. The model will analyse the image.</p>
<p>3. View the predicted threat class, confidence score, and probability breakdown.</p>
</aside>"#,
    classes = state.classifier().labels().len(),
    backend = escape_html(state.backend()),
    w = MODEL_INPUT_W,
    h = MODEL_INPUT_H,
    threshold = percent(state.threshold()),
  )
}

fn render_hero() -> &'static str {
  r#"<div class="hero">
<div class="hero-kicker">X-Ray Threat</div>
<div class="hero-title">Detector</div>
<div class="hero-sub">AI-powered baggage screening for aviation security. Upload an X-ray scan and get instant threat classification.</div>
<div class="hero-pill"><span class="dot"></span><span>Model loaded &amp; ready</span></div>
</div>"#
}

/// 可检测类别的滚动卡片，卡片复制一份使滚动首尾相接
pub fn render_carousel() -> String {
  let cards = THREAT_CATALOG
    .iter()
    .map(|info| {
      format!(
        r#"<div class="carousel-card"><span class="risk-badge {}">{}</span><h4>{}</h4><p>{}</p></div>"#,
        info.risk.css_class(),
        info.risk.as_str(),
        escape_html(info.name),
        escape_html(info.description),
      )
    })
    .collect::<String>();
  format!(
    r#"<p class="section-title">DETECTABLE THREAT CATEGORIES</p><div class="carousel-outer"><div class="carousel-track">{cards}{cards}</div></div>"#
  )
}

/// 判定结果卡片和完整概率分布
pub fn render_result(classification: &Classification, threshold: f32) -> String {
  let verdict = classification.verdict(threshold);
  let color = verdict.confidence_tier.color();

  let mut html = format!(
    r#"<div class="result-card">
<div class="result-head">
<div>
<p class="caption">DETECTED OBJECT</p>
<h2 class="verdict">{name}</h2>
<span class="risk-badge {risk_class}">{risk} Risk</span>
</div>
<div style="text-align:right;">
<p class="caption">CONFIDENCE</p>
<p class="confidence" style="color:{color};">{pct}%</p>
</div>
</div>
<div class="conf-bar-bg"><div class="conf-bar-fill" style="width:{width}%; background:{color};"></div></div>
<p class="description">{desc}</p>
</div>"#,
    name = escape_html(&verdict.label),
    risk_class = verdict.risk_class,
    risk = verdict.risk.as_str(),
    color = color,
    pct = percent(verdict.confidence),
    width = bar_width(verdict.confidence),
    desc = escape_html(&verdict.description),
  );

  html.push_str(r#"<h3 style="margin-top:2rem;">All Class Probabilities</h3><div class="result-card">"#);
  for score in classification.ranked() {
    html.push_str(&format!(
      r#"<div class="prob-row"><span class="prob-label">{}</span><div class="prob-bar-bg"><div class="prob-bar-fill" style="width:{}%;"></div></div><span class="prob-value">{}%</span></div>"#,
      escape_html(&score.name),
      bar_width(score.probability),
      percent(score.probability),
    ));
  }
  html.push_str("</div>");
  html
}

pub fn render_error(title: &str, message: &str) -> String {
  format!(
    r#"<div class="result-card error-card"><p class="caption">{}</p><p class="description">{}</p></div>"#,
    escape_html(title),
    escape_html(message),
  )
}

fn render_scanner(view: &View<'_>, threshold: f32) -> String {
  let (preview, result) = match view {
    View::Scan {
      classification,
      preview,
    } => (
      preview
        .map(|src| format!(r#"<img class="preview" src="{}" alt="Uploaded scan">"#, src))
        .unwrap_or_default(),
      render_result(classification, threshold),
    ),
    View::ScanError(message) => (String::new(), render_error("Could not analyse this image", message)),
    _ => (
      String::new(),
      r#"<div class="upload-area"><p style="color:#ffffff; font-size:1.1rem; margin:0;">Upload an X-ray image to begin analysis</p><p class="hint">Supported formats: PNG, JPG, JPEG, BMP</p></div>"#.to_string(),
    ),
  };
  format!(
    r#"<section class="panel panel-scan">
{carousel}
<div class="columns">
<div>
<h3>Upload X-Ray Scan</h3>
<form class="upload-area" action="/scan" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept=".png,.jpg,.jpeg,.bmp" required>
<button type="submit">Analyse</button>
</form>
{preview}
</div>
<div>
<h3>Analysis Results</h3>
{result}
</div>
</div>
</section>"#,
    carousel = render_carousel(),
  )
}

fn render_converter(view: &View<'_>) -> String {
  let options = TargetFormat::ALL
    .iter()
    .map(|f| format!(r#"<option value="{}">{}</option>"#, f.name(), f.name()))
    .collect::<String>();
  let error = match view {
    View::ConvertError(message) => render_error("Conversion failed", message),
    _ => String::new(),
  };
  format!(
    r#"<section class="panel panel-convert">
<h3 style="font-size:2.5rem;">Image Format Converter</h3>
<p>Upload any image and convert it to a different format. Supports PNG, JPEG, BMP, GIF, TIFF, WEBP, and ICO.</p>
<div class="columns">
<div>
<form class="upload-area" action="/convert" method="post" enctype="multipart/form-data">
<label>1. Upload Image</label>
<input type="file" name="file" accept=".png,.jpg,.jpeg,.bmp,.gif,.tiff,.tif,.webp,.ico" required>
<label>2. Choose Output Format</label>
<select name="format">{options}</select>
<label>Quality (JPEG)</label>
<input type="number" name="quality" min="{min_q}" max="{max_q}" value="{default_q}">
<label>Resize (optional, px)</label>
<input type="number" name="width" min="1" placeholder="Width">
<input type="number" name="height" min="1" placeholder="Height">
<button type="submit">Convert</button>
</form>
</div>
<div>{error}</div>
</div>
</section>"#,
    min_q = MIN_QUALITY,
    max_q = MAX_QUALITY,
    default_q = DEFAULT_QUALITY,
  )
}

/// 渲染完整页面
pub fn render_page(state: &AppState, view: View<'_>) -> String {
  let scanner = render_scanner(&view, state.threshold());
  let (scan_checked, convert_checked) = if view.converter_active() {
    ("", " checked")
  } else {
    (" checked", "")
  };

  format!(
    r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>X-Ray Threat Detector</title>
<style>{style}</style>
</head>
<body>
<div class="layout">
{sidebar}
<main>
{hero}
<input class="tab-input" type="radio" name="tab" id="tab-scan"{scan_checked}>
<input class="tab-input" type="radio" name="tab" id="tab-convert"{convert_checked}>
<nav class="tabs"><label for="tab-scan">Threat Scanner</label><label for="tab-convert">Image Converter</label></nav>
{scanner}
{converter}
<div class="footer">Powered by {backend} and EfficientNetB0</div>
</main>
</div>
</body>
</html>"#,
    style = STYLE,
    sidebar = render_sidebar(state),
    hero = render_hero(),
    converter = render_converter(&view),
    backend = escape_html(state.backend()),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{label::ClassLabels, model::Probabilities};

  fn classification(values: Vec<f32>) -> Classification {
    let labels = ClassLabels::new(["Class 1_Knife", "Class 2_Battery", "Class 3_<b>Odd</b>"]).unwrap();
    Classification::new(Probabilities::from_raw(values).unwrap(), &labels).unwrap()
  }

  #[test]
  fn escapes_markup() {
    assert_eq!(
      escape_html(r#"<a href="x">'&'</a>"#),
      "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
    );
  }

  #[test]
  fn result_card_shows_top_class_and_sorted_rows() {
    let html = render_result(&classification(vec![0.1, 0.85, 0.05]), 0.3);
    assert!(html.contains(">Battery</h2>"));
    assert!(html.contains("risk-medium"));
    assert!(html.contains("85.0%"));
    assert!(html.contains("width:85%"));
    assert!(html.contains("#22c55e"));
    let battery = html.find("prob-label\">Battery").unwrap();
    let knife = html.find("prob-label\">Knife").unwrap();
    assert!(battery < knife);
    assert!(html.contains("&lt;b&gt;Odd&lt;/b&gt;"));
  }

  #[test]
  fn uncertain_result_is_not_known() {
    let html = render_result(&classification(vec![0.29, 0.28, 0.43]), 0.5);
    assert!(html.contains(">Not Known</h2>"));
    assert!(html.contains("Unknown Risk"));
    assert!(html.contains("Closest guess:"));
  }

  #[test]
  fn carousel_repeats_catalog() {
    let html = render_carousel();
    assert_eq!(html.matches("carousel-card").count(), THREAT_CATALOG.len() * 2);
  }
}
