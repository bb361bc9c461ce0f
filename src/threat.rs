// 该文件是 Anjian （安检） 项目的一部分。
// src/threat.rs - 威胁类别说明
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

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
  Low,
  Medium,
  High,
  Critical,
  Unknown,
}

impl RiskLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      RiskLevel::Low => "Low",
      RiskLevel::Medium => "Medium",
      RiskLevel::High => "High",
      RiskLevel::Critical => "Critical",
      RiskLevel::Unknown => "Unknown",
    }
  }

  /// 页面中风险徽章的 CSS 类名
  pub fn css_class(&self) -> &'static str {
    match self {
      RiskLevel::Low | RiskLevel::Unknown => "risk-low",
      RiskLevel::Medium => "risk-medium",
      RiskLevel::High => "risk-high",
      RiskLevel::Critical => "risk-critical",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreatInfo {
  pub name: &'static str,
  pub risk: RiskLevel,
  pub color: &'static str,
  pub description: &'static str,
}

const COLOR_LOW: &str = "#5bc0de";
const COLOR_MEDIUM: &str = "#f0ad4e";
const COLOR_HIGH: &str = "#d9534f";

pub const UNKNOWN_THREAT: ThreatInfo = ThreatInfo {
  name: "Unknown",
  risk: RiskLevel::Unknown,
  color: "#94a3b8",
  description: "No additional information available.",
};

pub const THREAT_CATALOG: &[ThreatInfo] = &[
  ThreatInfo {
    name: "Battery",
    risk: RiskLevel::Medium,
    color: COLOR_MEDIUM,
    description: "Lithium batteries can pose fire risks in cargo.",
  },
  ThreatInfo {
    name: "Scissors",
    risk: RiskLevel::Medium,
    color: COLOR_MEDIUM,
    description: "Scissors with blades over 6 cm are restricted.",
  },
  ThreatInfo {
    name: "Hammer",
    risk: RiskLevel::Medium,
    color: COLOR_MEDIUM,
    description: "Blunt-force tools are prohibited in carry-on luggage.",
  },
  ThreatInfo {
    name: "Pliers",
    risk: RiskLevel::Medium,
    color: COLOR_MEDIUM,
    description: "Hand tools over 7 cm are restricted in cabins.",
  },
  ThreatInfo {
    name: "Wrench",
    risk: RiskLevel::Medium,
    color: COLOR_MEDIUM,
    description: "Heavy tools are not allowed as carry-on items.",
  },
  ThreatInfo {
    name: "Explosive",
    risk: RiskLevel::Critical,
    color: COLOR_HIGH,
    description: "Explosive materials are strictly prohibited.",
  },
  ThreatInfo {
    name: "Bullet",
    risk: RiskLevel::High,
    color: COLOR_HIGH,
    description: "Ammunition is banned from all passenger flights.",
  },
  ThreatInfo {
    name: "Knife",
    risk: RiskLevel::High,
    color: COLOR_HIGH,
    description: "Knives of any length are prohibited in carry-on.",
  },
  ThreatInfo {
    name: "Cutter",
    risk: RiskLevel::High,
    color: COLOR_HIGH,
    description: "Box cutters and blades are strictly forbidden.",
  },
  ThreatInfo {
    name: "Lighter",
    risk: RiskLevel::Low,
    color: COLOR_LOW,
    description: "One disposable lighter is allowed on person only.",
  },
];

/// 按类别名称查找说明，大小写不敏感；未收录的类别返回 `UNKNOWN_THREAT`
pub fn lookup(name: &str) -> &'static ThreatInfo {
  THREAT_CATALOG
    .iter()
    .find(|info| info.name.eq_ignore_ascii_case(name))
    .unwrap_or(&UNKNOWN_THREAT)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finds_known_threats_case_insensitively() {
    assert_eq!(lookup("knife").risk, RiskLevel::High);
    assert_eq!(lookup("Explosive").risk.css_class(), "risk-critical");
  }

  #[test]
  fn unknown_threat_falls_back() {
    let info = lookup("Umbrella");
    assert_eq!(info.risk, RiskLevel::Unknown);
    assert_eq!(info.description, "No additional information available.");
  }
}
