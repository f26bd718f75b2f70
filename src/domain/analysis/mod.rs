//! Analysis Context - 视觉分析限界上下文
//!
//! 职责:
//! - CacheKey（内容指纹 + 指令指纹 + 模型版本）
//! - AnalysisRecord 及其状态不变量
//! - 缓存失效规则

mod cache_key;
mod invalidation;
mod record;

pub use cache_key::CacheKey;
pub use invalidation::{
    Freshness, InvalidationPolicy, InvalidationReason, DEFAULT_STALENESS_DAYS,
};
pub use record::{
    AnalysisRecord, AnalysisStatus, VisualAnalysis, NEUTRAL_DIRECTIVE, SAFETY_FALLBACK_DIRECTIVE,
};
