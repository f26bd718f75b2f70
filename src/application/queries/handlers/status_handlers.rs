//! Status Query Handler

use serde::Serialize;
use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    AuditEntry, AuditLogPort, CacheStats, TranslationStorePort, VisualCacheFactory,
    VolumeSourcePort,
};
use crate::application::queries::GetVolumeStatus;
use crate::domain::analysis::{CacheKey, Freshness};
use crate::domain::translation::SegmentStatus;
use crate::domain::volume::{AssetKey, Fingerprint, SegmentId, VolumeId};

/// 卷状态
#[derive(Debug, Clone, Serialize)]
pub struct VolumeStatus {
    pub volume_id: VolumeId,
    pub title: String,
    pub chapters: usize,
    pub segments: usize,
    pub illustrations: usize,
    pub cache: CacheStats,
    /// (asset_key, 失效原因)
    pub needs_regeneration: Vec<(AssetKey, String)>,
    pub translated_ok: usize,
    pub translated_failed: usize,
    pub failed_segments: Vec<SegmentId>,
    /// 指定章节的审计记录（按片段序号、写入时间排序）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audit: Vec<AuditEntry>,
}

/// GetVolumeStatus Handler
pub struct GetVolumeStatusHandler {
    volume_source: Arc<dyn VolumeSourcePort>,
    cache_factory: Arc<dyn VisualCacheFactory>,
    store: Arc<dyn TranslationStorePort>,
    audit: Arc<dyn AuditLogPort>,
    prompt_fingerprint: Fingerprint,
    model_version: String,
}

impl GetVolumeStatusHandler {
    pub fn new(
        volume_source: Arc<dyn VolumeSourcePort>,
        cache_factory: Arc<dyn VisualCacheFactory>,
        store: Arc<dyn TranslationStorePort>,
        audit: Arc<dyn AuditLogPort>,
        instruction: &str,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            volume_source,
            cache_factory,
            store,
            audit,
            prompt_fingerprint: Fingerprint::of_text(instruction),
            model_version: model_version.into(),
        }
    }

    pub async fn handle(&self, query: GetVolumeStatus) -> Result<VolumeStatus, ApplicationError> {
        let volume = self.volume_source.load(&query.volume_dir).await?;
        let audit = match query.chapter {
            Some(number) => {
                volume.chapter(number)?;
                self.audit.entries(volume.id(), Some(number)).await?
            }
            None => Vec::new(),
        };
        let cache = self.cache_factory.open(volume.id()).await?;

        let mut needs_regeneration = Vec::new();
        for illustration in volume.illustrations() {
            let candidate = CacheKey::new(
                illustration.fingerprint().clone(),
                self.prompt_fingerprint.clone(),
                self.model_version.clone(),
            );
            if let Freshness::Regenerate(reason) =
                cache.evaluate(illustration.asset_key(), &candidate).await?
            {
                needs_regeneration.push((illustration.asset_key().clone(), reason.to_string()));
            }
        }

        let results = self.store.load_volume(volume.id()).await?;
        let count = |status: SegmentStatus| results.iter().filter(|r| r.status == status).count();
        let failed_segments = results
            .iter()
            .filter(|r| r.status == SegmentStatus::Failed)
            .map(|r| r.id())
            .collect();

        Ok(VolumeStatus {
            volume_id: volume.id().clone(),
            title: volume.title().to_string(),
            chapters: volume.chapters().len(),
            segments: volume.segment_count(),
            illustrations: volume.illustrations().len(),
            cache: cache.stats().await,
            needs_regeneration,
            translated_ok: count(SegmentStatus::Ok),
            translated_failed: count(SegmentStatus::Failed),
            failed_segments,
            audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::VisualCachePort;
    use crate::domain::analysis::{AnalysisRecord, InvalidationPolicy};
    use crate::domain::segment_classifier::{ClassifiedSegment, ReasoningDepth, SegmentTag};
    use crate::domain::translation::{GuardFlag, TranslationResult};
    use crate::infrastructure::adapters::FileVolumeStorage;
    use crate::infrastructure::memory::{InMemoryAuditLog, InMemoryTranslationStore};
    use crate::infrastructure::persistence::JsonVisualCacheFactory;
    use chrono::Utc;
    use tempfile::TempDir;

    fn segment(index: usize) -> ClassifiedSegment {
        ClassifiedSegment {
            chapter: 1,
            index,
            text: "文。".to_string(),
            tag: SegmentTag::Standard,
            asset_key: None,
            lookahead_key: None,
            lookahead_distance: None,
            depth: ReasoningDepth::None,
        }
    }

    #[tokio::test]
    async fn test_status_reports_cache_and_results() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("volume");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("volume.toml"),
            "id = \"vol\"\ntitle = \"V\"\n\n[[chapters]]\nfile = \"ch.txt\"\n\n\
             [[illustrations]]\nkey = \"a\"\nfile = \"a.png\"\n\n\
             [[illustrations]]\nkey = \"b\"\nfile = \"b.png\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("ch.txt"), "文。\n\n[[illustration:a]]\n\n[[illustration:b]]").unwrap();
        std::fs::write(dir.join("a.png"), b"a").unwrap();
        std::fs::write(dir.join("b.png"), b"b").unwrap();

        let factory = Arc::new(JsonVisualCacheFactory::new(
            temp.path().join("cache"),
            InvalidationPolicy::default(),
        ));
        let volume_id = VolumeId::new("vol").unwrap();
        let cache = factory.open(&volume_id).await.unwrap();
        cache
            .put(
                &AssetKey::new("a").unwrap(),
                CacheKey::new(Fingerprint::of_bytes(b"a"), Fingerprint::of_text("instr"), "m1"),
                AnalysisRecord::safety_fallback("refused", Utc::now()),
            )
            .await
            .unwrap();

        let store = Arc::new(InMemoryTranslationStore::new());
        store.save(&volume_id, &TranslationResult::ok(&segment(0), "ok")).await.unwrap();
        store
            .save(&volume_id, &TranslationResult::failed(&segment(1), "boom"))
            .await
            .unwrap();

        let audit = Arc::new(InMemoryAuditLog::new());
        let flagged = TranslationResult::ok(&segment(0), "ok").with_flags(vec![GuardFlag::LeakDetected]);
        audit
            .record(AuditEntry::for_result(&volume_id, &flagged, Some("trace".to_string())))
            .await
            .unwrap();

        let handler = GetVolumeStatusHandler::new(
            Arc::new(FileVolumeStorage::default()),
            factory,
            store,
            audit,
            "instr",
            "m1",
        );
        let status = handler
            .handle(GetVolumeStatus {
                volume_dir: dir.clone(),
                chapter: None,
            })
            .await
            .unwrap();
        assert!(status.audit.is_empty());

        let status = handler
            .handle(GetVolumeStatus {
                volume_dir: dir.clone(),
                chapter: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(status.audit.len(), 1);
        assert_eq!(status.audit[0].flags, vec![GuardFlag::LeakDetected]);
        assert_eq!(status.audit[0].reasoning.as_deref(), Some("trace"));

        assert!(handler
            .handle(GetVolumeStatus {
                volume_dir: dir,
                chapter: Some(9),
            })
            .await
            .is_err());

        assert_eq!((status.chapters, status.segments, status.illustrations), (1, 3, 2));
        assert_eq!(status.cache.safety_blocked, 1);
        assert_eq!(status.needs_regeneration.len(), 1);
        assert_eq!(status.needs_regeneration[0].0.as_str(), "b");
        assert_eq!(status.needs_regeneration[0].1, "missing");
        assert_eq!((status.translated_ok, status.translated_failed), (1, 1));
        assert_eq!(status.failed_segments, vec![SegmentId::new(1, 1)]);
    }
}
