//! 翻译结果
//!
//! 每个片段一条，由编排器写入，只追加不修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::analysis::CacheKey;
use crate::domain::segment_classifier::{ClassifiedSegment, SegmentTag};
use crate::domain::volume::{Fingerprint, SegmentId};

/// 片段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Ok,
    Failed,
    /// 章节超时或进程关闭时尚未完成
    Cancelled,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Ok => "ok",
            SegmentStatus::Failed => "failed",
            SegmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(SegmentStatus::Ok),
            "failed" => Some(SegmentStatus::Failed),
            "cancelled" => Some(SegmentStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 护栏标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardFlag {
    /// 生成层输出被判定为分析泄露
    LeakDetected,
    /// 使用了严格指令重试
    StrictRetry,
    /// 注入的是安全拦截的降级上下文
    SafetyFallbackContext,
    /// 发生过瞬时错误重试
    TransientRetry,
}

impl GuardFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardFlag::LeakDetected => "leak_detected",
            GuardFlag::StrictRetry => "strict_retry",
            GuardFlag::SafetyFallbackContext => "safety_fallback_context",
            GuardFlag::TransientRetry => "transient_retry",
        }
    }
}

impl std::fmt::Display for GuardFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个片段的翻译结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub chapter: usize,
    pub index: usize,
    pub tag: SegmentTag,
    /// 译文（失败/取消时为空）
    pub text: String,
    pub status: SegmentStatus,
    pub error: Option<String>,
    /// 生成时参考的缓存键
    pub consulted: Vec<CacheKey>,
    pub flags: Vec<GuardFlag>,
    /// 审计条目 ID
    pub trace_ref: Option<String>,
    pub attempts: u32,
    pub source_fingerprint: Fingerprint,
    pub completed_at: DateTime<Utc>,
}

impl TranslationResult {
    pub fn ok(segment: &ClassifiedSegment, text: impl Into<String>) -> Self {
        Self::base(segment, SegmentStatus::Ok, text.into(), None)
    }

    pub fn failed(segment: &ClassifiedSegment, error: impl Into<String>) -> Self {
        Self::base(segment, SegmentStatus::Failed, String::new(), Some(error.into()))
    }

    pub fn cancelled(segment: &ClassifiedSegment, reason: impl Into<String>) -> Self {
        Self::base(segment, SegmentStatus::Cancelled, String::new(), Some(reason.into()))
    }

    fn base(
        segment: &ClassifiedSegment,
        status: SegmentStatus,
        text: String,
        error: Option<String>,
    ) -> Self {
        Self {
            chapter: segment.chapter,
            index: segment.index,
            tag: segment.tag,
            text,
            status,
            error,
            consulted: Vec::new(),
            flags: Vec::new(),
            trace_ref: None,
            attempts: 0,
            source_fingerprint: segment.fingerprint(),
            completed_at: Utc::now(),
        }
    }

    pub fn with_consulted(mut self, consulted: Vec<CacheKey>) -> Self {
        self.consulted = consulted;
        self
    }

    pub fn with_flags(mut self, flags: Vec<GuardFlag>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn id(&self) -> SegmentId {
        SegmentId::new(self.chapter, self.index)
    }

    pub fn is_ok(&self) -> bool {
        self.status == SegmentStatus::Ok
    }

    /// 失败或取消时回退到原文
    pub fn text_or<'a>(&'a self, source: &'a str) -> &'a str {
        if self.is_ok() {
            &self.text
        } else {
            source
        }
    }

    pub fn has_flag(&self, flag: GuardFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment_classifier::ReasoningDepth;

    fn segment() -> ClassifiedSegment {
        ClassifiedSegment {
            chapter: 2,
            index: 7,
            text: "雨が降っていた。".to_string(),
            tag: SegmentTag::Standard,
            asset_key: None,
            lookahead_key: None,
            lookahead_distance: None,
            depth: ReasoningDepth::None,
        }
    }

    #[test]
    fn test_failed_result_falls_back_to_source() {
        let result = TranslationResult::failed(&segment(), "retries exhausted");
        assert!(!result.is_ok());
        assert_eq!(result.text_or("原文"), "原文");
        assert_eq!(result.id().to_string(), "ch2#7");
        assert_eq!(result.source_fingerprint, Fingerprint::of_text("雨が降っていた。"));
    }

    #[test]
    fn test_bincode_round_trip_keeps_flags() {
        let result = TranslationResult::ok(&segment(), "It was raining.")
            .with_flags(vec![GuardFlag::LeakDetected, GuardFlag::StrictRetry])
            .with_attempts(2);
        let bytes = bincode::serialize(&result).unwrap();
        let decoded: TranslationResult = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, result);
        assert!(decoded.has_flag(GuardFlag::StrictRetry));
    }
}
