//! Analysis Context - AnalysisRecord

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 安全拦截时注入的保守指令
pub const SAFETY_FALLBACK_DIRECTIVE: &str =
    "Rely on the source text only; no visual context is available for this illustration.";

/// 视觉层正常返回但未给出指令时的中性指令
pub const NEUTRAL_DIRECTIVE: &str =
    "Keep the tone consistent with the surrounding narrative.";

/// 分析记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// 视觉层正常生成
    Ok,
    /// 视觉层拒绝（内容策略），记录为降级回退
    SafetyBlocked,
    /// 人工覆盖，永不自动重新生成
    ManualOverride,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Ok => "ok",
            AnalysisStatus::SafetyBlocked => "safety_blocked",
            AnalysisStatus::ManualOverride => "manual_override",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 视觉层返回的结构化分析（尚未落入缓存）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualAnalysis {
    #[serde(default)]
    pub composition: String,
    #[serde(default)]
    pub emotional_delta: String,
    #[serde(default)]
    pub observed_details: BTreeMap<String, String>,
    #[serde(default)]
    pub directives: Vec<String>,
    #[serde(default)]
    pub spoiler_prevention: Vec<String>,
}

/// 单张插图的缓存分析记录
///
/// 不变量:
/// - directives 永不为空（safety_blocked 也带保守指令），下游只看内容不看有无
/// - 记录整体替换，不做部分修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(default)]
    pub composition: String,
    #[serde(default)]
    pub emotional_delta: String,
    #[serde(default)]
    pub observed_details: BTreeMap<String, String>,
    #[serde(default)]
    pub directives: Vec<String>,
    #[serde(default)]
    pub spoiler_prevention: Vec<String>,
    pub status: AnalysisStatus,
    pub generated_at: DateTime<Utc>,
    /// 拒绝原因或人工备注
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AnalysisRecord {
    /// 由视觉层输出构造 ok 记录
    pub fn from_analysis(analysis: VisualAnalysis, generated_at: DateTime<Utc>) -> Self {
        Self {
            composition: analysis.composition.trim().to_string(),
            emotional_delta: analysis.emotional_delta.trim().to_string(),
            observed_details: analysis.observed_details,
            directives: analysis.directives,
            spoiler_prevention: analysis.spoiler_prevention,
            status: AnalysisStatus::Ok,
            generated_at,
            note: None,
        }
        .normalized()
    }

    /// 安全拦截的降级记录
    pub fn safety_fallback(reason: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            composition: String::new(),
            emotional_delta: String::new(),
            observed_details: BTreeMap::new(),
            directives: vec![SAFETY_FALLBACK_DIRECTIVE.to_string()],
            spoiler_prevention: Vec::new(),
            status: AnalysisStatus::SafetyBlocked,
            generated_at,
            note: Some(reason.into()),
        }
    }

    /// 清理空白指令并保证 directives 非空
    pub fn normalized(mut self) -> Self {
        self.directives = self
            .directives
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        self.spoiler_prevention = self
            .spoiler_prevention
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if self.directives.is_empty() {
            let fallback = match self.status {
                AnalysisStatus::SafetyBlocked => SAFETY_FALLBACK_DIRECTIVE,
                _ => NEUTRAL_DIRECTIVE,
            };
            self.directives.push(fallback.to_string());
        }
        self
    }

    pub fn is_manual_override(&self) -> bool {
        self.status == AnalysisStatus::ManualOverride
    }

    pub fn is_safety_blocked(&self) -> bool {
        self.status == AnalysisStatus::SafetyBlocked
    }

    /// 判断指令是否泄露了剧透条目（不区分大小写的子串匹配）
    pub fn directive_reveals_spoiler(&self, directive: &str) -> bool {
        let lowered = directive.to_lowercase();
        self.spoiler_prevention
            .iter()
            .any(|fact| lowered.contains(&fact.to_lowercase()))
    }
}
