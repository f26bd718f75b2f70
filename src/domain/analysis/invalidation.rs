//! Analysis Context - 缓存失效规则
//!
//! 除非以下条件全部满足，否则必须重新生成：
//! (a) asset_key 存在条目；(b) 状态不是 manual_override（满足则直接视为新鲜）；
//! (c) 模型版本一致；(d) 指令指纹一致；(e) 内容指纹一致；(f) 年龄低于陈旧上限。
//! 任一条件失败都触发重新生成，与是哪一个条件变化无关。

use chrono::{DateTime, Duration, Utc};

use super::{AnalysisRecord, CacheKey};

/// 默认陈旧上限（天）
pub const DEFAULT_STALENESS_DAYS: i64 = 90;

/// 触发重新生成的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// 没有条目（或条目已损坏）
    Missing,
    ModelVersionChanged,
    PromptChanged,
    ContentChanged,
    Stale,
}

impl InvalidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::Missing => "missing",
            InvalidationReason::ModelVersionChanged => "model_version_changed",
            InvalidationReason::PromptChanged => "prompt_changed",
            InvalidationReason::ContentChanged => "content_changed",
            InvalidationReason::Stale => "stale",
        }
    }
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// 可直接复用
    Fresh,
    /// 人工覆盖，跳过一切检查
    Pinned,
    /// 需要重新生成
    Regenerate(InvalidationReason),
}

impl Freshness {
    pub fn needs_regeneration(&self) -> bool {
        matches!(self, Freshness::Regenerate(_))
    }
}

/// 失效策略
#[derive(Debug, Clone, Copy)]
pub struct InvalidationPolicy {
    pub max_age: Duration,
}

impl Default for InvalidationPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::days(DEFAULT_STALENESS_DAYS),
        }
    }
}

impl InvalidationPolicy {
    pub fn with_staleness_days(days: u32) -> Self {
        Self {
            max_age: Duration::days(i64::from(days)),
        }
    }

    /// 评估已存条目相对候选键是否仍可用
    pub fn evaluate(
        &self,
        stored: Option<(&CacheKey, &AnalysisRecord)>,
        candidate: &CacheKey,
        now: DateTime<Utc>,
    ) -> Freshness {
        let Some((key, record)) = stored else {
            return Freshness::Regenerate(InvalidationReason::Missing);
        };

        if record.is_manual_override() {
            return Freshness::Pinned;
        }
        if key.model_version != candidate.model_version {
            return Freshness::Regenerate(InvalidationReason::ModelVersionChanged);
        }
        if key.prompt_fingerprint != candidate.prompt_fingerprint {
            return Freshness::Regenerate(InvalidationReason::PromptChanged);
        }
        if key.content_fingerprint != candidate.content_fingerprint {
            return Freshness::Regenerate(InvalidationReason::ContentChanged);
        }
        if now.signed_duration_since(record.generated_at) >= self.max_age {
            return Freshness::Regenerate(InvalidationReason::Stale);
        }

        Freshness::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{AnalysisStatus, VisualAnalysis};
    use crate::domain::volume::Fingerprint;

    fn key() -> CacheKey {
        CacheKey::new(
            Fingerprint::of_bytes(b"image"),
            Fingerprint::of_text("instruction"),
            "vision-2024-10",
        )
    }

    fn record(status: AnalysisStatus, generated_at: DateTime<Utc>) -> AnalysisRecord {
        let mut record = AnalysisRecord::from_analysis(VisualAnalysis::default(), generated_at);
        record.status = status;
        record
    }

    #[test]
    fn test_missing_entry_regenerates() {
        let policy = InvalidationPolicy::default();
        assert_eq!(
            policy.evaluate(None, &key(), Utc::now()),
            Freshness::Regenerate(InvalidationReason::Missing)
        );
    }

    #[test]
    fn test_unchanged_entry_is_fresh() {
        let policy = InvalidationPolicy::default();
        let now = Utc::now();
        let stored = record(AnalysisStatus::Ok, now - Duration::days(3));
        assert_eq!(policy.evaluate(Some((&key(), &stored)), &key(), now), Freshness::Fresh);
    }

    #[test]
    fn test_each_trigger_regenerates_individually() {
        let policy = InvalidationPolicy::default();
        let now = Utc::now();
        let stored_key = key();
        let fresh = record(AnalysisStatus::Ok, now - Duration::days(1));

        let mut candidate = key();
        candidate.model_version = "vision-2025-01".to_string();
        assert_eq!(
            policy.evaluate(Some((&stored_key, &fresh)), &candidate, now),
            Freshness::Regenerate(InvalidationReason::ModelVersionChanged)
        );

        let mut candidate = key();
        candidate.prompt_fingerprint = Fingerprint::of_text("instruction v2");
        assert_eq!(
            policy.evaluate(Some((&stored_key, &fresh)), &candidate, now),
            Freshness::Regenerate(InvalidationReason::PromptChanged)
        );

        let mut candidate = key();
        candidate.content_fingerprint = Fingerprint::of_bytes(b"retouched image");
        assert_eq!(
            policy.evaluate(Some((&stored_key, &fresh)), &candidate, now),
            Freshness::Regenerate(InvalidationReason::ContentChanged)
        );

        let old = record(AnalysisStatus::Ok, now - Duration::days(DEFAULT_STALENESS_DAYS));
        assert_eq!(
            policy.evaluate(Some((&stored_key, &old)), &key(), now),
            Freshness::Regenerate(InvalidationReason::Stale)
        );
    }

    #[test]
    fn test_manual_override_survives_every_trigger() {
        let policy = InvalidationPolicy::default();
        let now = Utc::now();
        let pinned = record(AnalysisStatus::ManualOverride, now - Duration::days(400));

        let mut candidate = key();
        candidate.model_version = "other".to_string();
        candidate.prompt_fingerprint = Fingerprint::of_text("other");
        candidate.content_fingerprint = Fingerprint::of_bytes(b"other");

        for c in [key(), candidate] {
            let freshness = policy.evaluate(Some((&key(), &pinned)), &c, now);
            assert_eq!(freshness, Freshness::Pinned);
            assert!(!freshness.needs_regeneration());
        }
    }

    #[test]
    fn test_safety_blocked_is_not_retried_when_unchanged() {
        let policy = InvalidationPolicy::default();
        let now = Utc::now();
        let blocked = AnalysisRecord::safety_fallback("refused", now);
        assert_eq!(policy.evaluate(Some((&key(), &blocked)), &key(), now), Freshness::Fresh);
    }

    #[test]
    fn test_configurable_ceiling() {
        let policy = InvalidationPolicy::with_staleness_days(7);
        let now = Utc::now();
        let stored = record(AnalysisStatus::Ok, now - Duration::days(8));
        assert!(policy.evaluate(Some((&key(), &stored)), &key(), now).needs_regeneration());
    }
}
