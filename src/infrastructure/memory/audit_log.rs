//! In-Memory Audit Log Implementation

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{AuditEntry, AuditError, AuditLogPort};
use crate::domain::volume::VolumeId;

/// 内存审计日志
pub struct InMemoryAuditLog {
    /// volume_id -> entries
    entries: DashMap<VolumeId, Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLogPort for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .entry(entry.volume_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn entries(
        &self,
        volume_id: &VolumeId,
        chapter: Option<usize>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries: Vec<AuditEntry> = self
            .entries
            .get(volume_id)
            .map(|list| {
                list.iter()
                    .filter(|e| chapter.map_or(true, |c| e.chapter == c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            (a.chapter, a.index, a.recorded_at).cmp(&(b.chapter, b.index, b.recorded_at))
        });
        Ok(entries)
    }
}
