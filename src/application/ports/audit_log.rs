//! Audit Log Port - 审计日志
//!
//! 每个片段一条：参考了哪些缓存键、触发了哪些护栏、推理过程

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::analysis::CacheKey;
use crate::domain::segment_classifier::SegmentTag;
use crate::domain::translation::{GuardFlag, SegmentStatus, TranslationResult};
use crate::domain::volume::VolumeId;

/// Audit 错误
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 审计条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub volume_id: VolumeId,
    pub chapter: usize,
    pub index: usize,
    pub tag: SegmentTag,
    pub consulted: Vec<CacheKey>,
    pub flags: Vec<GuardFlag>,
    pub reasoning: Option<String>,
    pub status: SegmentStatus,
    pub error: Option<String>,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// 由翻译结果构造条目（生成新 ID）
    pub fn for_result(
        volume_id: &VolumeId,
        result: &TranslationResult,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            volume_id: volume_id.clone(),
            chapter: result.chapter,
            index: result.index,
            tag: result.tag,
            consulted: result.consulted.clone(),
            flags: result.flags.clone(),
            reasoning,
            status: result.status,
            error: result.error.clone(),
            attempts: result.attempts,
            recorded_at: Utc::now(),
        }
    }
}

/// Audit Log Port
///
/// 写入失败只记日志，绝不让片段失败
#[async_trait]
pub trait AuditLogPort: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// 按卷（可选章节）列出条目，按 (chapter, index, recorded_at) 排序
    async fn entries(
        &self,
        volume_id: &VolumeId,
        chapter: Option<usize>,
    ) -> Result<Vec<AuditEntry>, AuditError>;
}
