//! In-Memory Translation Store Implementation

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::application::ports::{StoreError, TranslationStorePort};
use crate::domain::translation::TranslationResult;
use crate::domain::volume::VolumeId;

/// 内存翻译结果存储（离线运行和测试用）
pub struct InMemoryTranslationStore {
    /// volume_id -> (chapter, index) -> result
    results: DashMap<VolumeId, BTreeMap<(usize, usize), TranslationResult>>,
}

impl InMemoryTranslationStore {
    pub fn new() -> Self {
        Self {
            results: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemoryTranslationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranslationStorePort for InMemoryTranslationStore {
    async fn save(&self, volume_id: &VolumeId, result: &TranslationResult) -> Result<(), StoreError> {
        self.results
            .entry(volume_id.clone())
            .or_default()
            .insert((result.chapter, result.index), result.clone());
        Ok(())
    }

    async fn load_chapter(
        &self,
        volume_id: &VolumeId,
        chapter: usize,
    ) -> Result<Vec<TranslationResult>, StoreError> {
        Ok(self
            .results
            .get(volume_id)
            .map(|map| {
                map.range((chapter, 0)..=(chapter, usize::MAX))
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_volume(&self, volume_id: &VolumeId) -> Result<Vec<TranslationResult>, StoreError> {
        Ok(self
            .results
            .get(volume_id)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default())
    }
}
