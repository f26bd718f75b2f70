//! Translation Store Port - 翻译结果持久化

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::translation::TranslationResult;
use crate::domain::volume::VolumeId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Translation Store Port
///
/// 同一片段再次保存时覆盖旧结果
#[async_trait]
pub trait TranslationStorePort: Send + Sync {
    async fn save(&self, volume_id: &VolumeId, result: &TranslationResult) -> Result<(), StoreError>;

    /// 按片段序号排序
    async fn load_chapter(
        &self,
        volume_id: &VolumeId,
        chapter: usize,
    ) -> Result<Vec<TranslationResult>, StoreError>;

    /// 按 (chapter, index) 排序
    async fn load_volume(&self, volume_id: &VolumeId) -> Result<Vec<TranslationResult>, StoreError>;
}
