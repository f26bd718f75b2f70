//! Sled-based Translation Result Store
//!
//! 键: `result:{volume_id}:{chapter:05}:{index:06}`，值为 bincode 编码的 TranslationResult。
//! 零填充保证前缀扫描按 (chapter, index) 有序。

use async_trait::async_trait;
use sled::Db;
use std::path::Path;

use crate::application::ports::{StoreError, TranslationStorePort};
use crate::domain::translation::TranslationResult;
use crate::domain::volume::VolumeId;

/// Sled 结果存储配置
#[derive(Debug, Clone)]
pub struct SledStoreConfig {
    /// 数据库路径
    pub db_path: String,
}

impl Default for SledStoreConfig {
    fn default() -> Self {
        Self {
            db_path: "data/results.sled".to_string(),
        }
    }
}

/// Sled 翻译结果存储
pub struct SledTranslationStore {
    db: Db,
}

fn db_error(e: sled::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

impl SledTranslationStore {
    pub fn new(config: &SledStoreConfig) -> Result<Self, StoreError> {
        let db = sled::open(&config.db_path).map_err(db_error)?;
        tracing::info!(db_path = %config.db_path, entries = db.len(), "SledTranslationStore initialized");
        Ok(Self { db })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::new(&SledStoreConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
        })
    }

    /// 临时库（测试用）
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(db_error)?;
        Ok(Self { db })
    }

    fn volume_prefix(volume_id: &VolumeId) -> String {
        format!("result:{}:", volume_id)
    }

    fn chapter_prefix(volume_id: &VolumeId, chapter: usize) -> String {
        format!("result:{}:{:05}:", volume_id, chapter)
    }

    fn result_key(volume_id: &VolumeId, chapter: usize, index: usize) -> String {
        format!("result:{}:{:05}:{:06}", volume_id, chapter, index)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<TranslationResult>, StoreError> {
        let mut results = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (_, value) = item.map_err(db_error)?;
            let result = bincode::deserialize::<TranslationResult>(&value)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;
            results.push(result);
        }
        Ok(results)
    }
}

#[async_trait]
impl TranslationStorePort for SledTranslationStore {
    async fn save(&self, volume_id: &VolumeId, result: &TranslationResult) -> Result<(), StoreError> {
        let key = Self::result_key(volume_id, result.chapter, result.index);
        let value = bincode::serialize(result)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.db.insert(key.as_bytes(), value).map_err(db_error)?;
        self.db.flush_async().await.map_err(db_error)?;
        Ok(())
    }

    async fn load_chapter(
        &self,
        volume_id: &VolumeId,
        chapter: usize,
    ) -> Result<Vec<TranslationResult>, StoreError> {
        self.scan(&Self::chapter_prefix(volume_id, chapter))
    }

    async fn load_volume(&self, volume_id: &VolumeId) -> Result<Vec<TranslationResult>, StoreError> {
        self.scan(&Self::volume_prefix(volume_id))
    }
}
