//! Visual Cache Port - 视觉分析缓存
//!
//! 内容寻址缓存的抽象接口：
//! - 主键: CacheKey（内容指纹 + 指令指纹 + 模型版本）
//! - 二级索引: asset_key -> CacheKey，每个 asset_key 只有一条有效记录
//!
//! 缓存按卷隔离，通过 VisualCacheFactory 打开

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::analysis::{AnalysisRecord, AnalysisStatus, CacheKey, Freshness};
use crate::domain::volume::{AssetKey, VolumeId};

/// Visual Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    /// 整个缓存文件无法解析（拒绝覆盖）
    #[error("Cache file is corrupt: {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub asset_key: AssetKey,
    pub key: CacheKey,
    pub record: AnalysisRecord,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub ok: usize,
    pub safety_blocked: usize,
    pub manual_override: usize,
    /// 加载时无法解析、按缺失处理的条目
    pub corrupt: usize,
}

impl CacheStats {
    pub fn from_entries(entries: &[CacheEntry], corrupt: usize) -> Self {
        let count = |status: AnalysisStatus| {
            entries
                .iter()
                .filter(|e| e.record.status == status)
                .count()
        };
        Self {
            total_entries: entries.len(),
            ok: count(AnalysisStatus::Ok),
            safety_blocked: count(AnalysisStatus::SafetyBlocked),
            manual_override: count(AnalysisStatus::ManualOverride),
            corrupt,
        }
    }
}

/// Visual Cache Port
///
/// 写入只来自视觉资产处理器；读取来自分类流程和编排器。
/// put 整体替换条目，读者永远看不到写了一半的记录。
#[async_trait]
pub trait VisualCachePort: Send + Sync {
    /// 按 asset_key 查找分析记录
    async fn lookup(&self, asset_key: &AssetKey) -> Result<Option<AnalysisRecord>, CacheError> {
        Ok(self.entry(asset_key).await?.map(|e| e.record))
    }

    /// 按 asset_key 查找完整条目
    async fn entry(&self, asset_key: &AssetKey) -> Result<Option<CacheEntry>, CacheError>;

    /// 写入（替换）条目并持久化
    async fn put(
        &self,
        asset_key: &AssetKey,
        key: CacheKey,
        record: AnalysisRecord,
    ) -> Result<(), CacheError>;

    /// 评估已存条目相对候选键的新鲜度
    async fn evaluate(
        &self,
        asset_key: &AssetKey,
        candidate: &CacheKey,
    ) -> Result<Freshness, CacheError>;

    /// 是否需要重新生成
    async fn needs_regeneration(
        &self,
        asset_key: &AssetKey,
        candidate: &CacheKey,
    ) -> Result<bool, CacheError> {
        Ok(self.evaluate(asset_key, candidate).await?.needs_regeneration())
    }

    /// 查找同一 CacheKey 下仍新鲜的 ok 记录（内容寻址复用）
    async fn find_reusable(&self, candidate: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// 全部条目（按 asset_key 排序）
    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}

/// 按卷打开缓存
#[async_trait]
pub trait VisualCacheFactory: Send + Sync {
    async fn open(&self, volume_id: &VolumeId) -> Result<Arc<dyn VisualCachePort>, CacheError>;
}

/// 记录的生成时间距今天数（用于日志）
pub fn record_age_days(record: &AnalysisRecord) -> i64 {
    Utc::now().signed_duration_since(record.generated_at).num_days()
}
