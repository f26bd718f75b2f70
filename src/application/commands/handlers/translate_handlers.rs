//! Translate Handler - 整卷翻译流程
//!
//! 卷 -> 分类 -> 缓存解析（缺失即失败） -> 编排器逐章执行 -> 结果存储 + 输出文件

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::application::commands::TranslateVolume;
use crate::application::error::ApplicationError;
use crate::application::orchestration::DualTierOrchestrator;
use crate::application::ports::{
    TranslationStorePort, VisualCacheFactory, VisualCachePort, VolumeSourcePort,
};
use crate::domain::segment_classifier::{classify, find_markers, ClassifiedSegment};
use crate::domain::translation::{SegmentStatus, TranslationResult};
use crate::domain::volume::{AssetKey, Chapter, SegmentId, Volume};

/// 单章摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChapterReport {
    pub chapter: usize,
    pub ok: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// 沿用的已存结果数（--only-failed）
    pub kept: usize,
    /// 编排错误导致整章中止时的原因
    pub aborted: Option<String>,
}

/// 翻译报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationReport {
    pub chapters: Vec<ChapterReport>,
    /// 仍处于错误状态的片段
    pub failed_segments: Vec<SegmentId>,
    pub output_files: Vec<PathBuf>,
    /// 是否因关闭信号提前结束
    pub interrupted: bool,
}

impl TranslationReport {
    pub fn is_complete(&self) -> bool {
        !self.interrupted
            && self.failed_segments.is_empty()
            && self
                .chapters
                .iter()
                .all(|c| c.cancelled == 0 && c.aborted.is_none())
    }
}

/// TranslateVolume Handler
pub struct TranslateVolumeHandler {
    volume_source: Arc<dyn VolumeSourcePort>,
    cache_factory: Arc<dyn VisualCacheFactory>,
    store: Arc<dyn TranslationStorePort>,
    orchestrator: Arc<DualTierOrchestrator>,
    lookahead_window: usize,
}

impl TranslateVolumeHandler {
    pub fn new(
        volume_source: Arc<dyn VolumeSourcePort>,
        cache_factory: Arc<dyn VisualCacheFactory>,
        store: Arc<dyn TranslationStorePort>,
        orchestrator: Arc<DualTierOrchestrator>,
        lookahead_window: usize,
    ) -> Self {
        Self {
            volume_source,
            cache_factory,
            store,
            orchestrator,
            lookahead_window,
        }
    }

    pub async fn handle(
        &self,
        command: TranslateVolume,
        shutdown: &CancellationToken,
    ) -> Result<TranslationReport, ApplicationError> {
        let volume = self.volume_source.load(&command.volume_dir).await?;
        let cache = self.cache_factory.open(volume.id()).await?;

        let chapters: Vec<&Chapter> = match command.chapter {
            Some(number) => vec![volume.chapter(number)?],
            None => volume.chapters().iter().collect(),
        };

        ensure_visual_context(&chapters, cache.as_ref()).await?;

        tracing::info!(
            volume_id = %volume.id(),
            chapters = chapters.len(),
            only_failed = command.only_failed,
            lookahead_window = self.lookahead_window,
            "Translating volume"
        );

        let mut report = TranslationReport::default();
        let mut all_results = Vec::new();

        for chapter in chapters {
            if shutdown.is_cancelled() {
                tracing::warn!(chapter = chapter.number(), "Shutdown requested, skipping remaining chapters");
                report.interrupted = true;
                break;
            }

            let (chapter_report, results) = self
                .translate_chapter(&volume, chapter, cache.clone(), command.only_failed, shutdown)
                .await?;

            let text = chapter
                .segments()
                .iter()
                .zip(&results)
                .map(|(segment, result)| result.text_or(segment.text()))
                .collect::<Vec<_>>()
                .join("\n\n");
            let path = self
                .volume_source
                .write_chapter(&command.output_dir, volume.id(), chapter.number(), &text)
                .await?;

            report.output_files.push(path);
            report.failed_segments.extend(
                results
                    .iter()
                    .filter(|r| r.status == SegmentStatus::Failed)
                    .map(TranslationResult::id),
            );
            report.chapters.push(chapter_report);
            all_results.extend(results);
        }

        let document = serde_json::json!({
            "volume_id": volume.id(),
            "title": volume.title(),
            "summary": &report,
            "results": all_results,
        });
        let report_path = self
            .volume_source
            .write_report(&command.output_dir, volume.id(), &document)
            .await?;
        report.output_files.push(report_path);

        tracing::info!(
            volume_id = %volume.id(),
            failed = report.failed_segments.len(),
            interrupted = report.interrupted,
            "Volume translation finished"
        );
        Ok(report)
    }

    async fn translate_chapter(
        &self,
        volume: &Volume,
        chapter: &Chapter,
        cache: Arc<dyn VisualCachePort>,
        only_failed: bool,
        shutdown: &CancellationToken,
    ) -> Result<(ChapterReport, Vec<TranslationResult>), ApplicationError> {
        let number = chapter.number();
        let classified = classify(chapter, self.lookahead_window);

        let mut kept: HashMap<usize, TranslationResult> = HashMap::new();
        if only_failed {
            let fingerprints: HashMap<usize, _> = classified
                .iter()
                .map(|s| (s.index, s.fingerprint()))
                .collect();
            for stored in self.store.load_chapter(volume.id(), number).await? {
                if stored.is_ok() && fingerprints.get(&stored.index) == Some(&stored.source_fingerprint) {
                    kept.insert(stored.index, stored);
                }
            }
        }

        let pending: Vec<ClassifiedSegment> = classified
            .iter()
            .filter(|s| !kept.contains_key(&s.index))
            .cloned()
            .collect();

        let mut chapter_report = ChapterReport {
            chapter: number,
            kept: kept.len(),
            ..Default::default()
        };

        tracing::info!(chapter = number, pending = pending.len(), kept = kept.len(), "Translating chapter");

        let fresh = match self
            .orchestrator
            .translate(volume.id(), number, pending.clone(), cache, shutdown)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(chapter = number, error = %e, "Chapter aborted");
                chapter_report.aborted = Some(e.to_string());
                pending
                    .iter()
                    .map(|s| TranslationResult::failed(s, e.to_string()))
                    .collect()
            }
        };

        for result in &fresh {
            match result.status {
                SegmentStatus::Ok => chapter_report.ok += 1,
                SegmentStatus::Failed => chapter_report.failed += 1,
                SegmentStatus::Cancelled => chapter_report.cancelled += 1,
            }
            if result.status != SegmentStatus::Cancelled {
                self.store.save(volume.id(), result).await?;
            }
        }

        let mut results: Vec<TranslationResult> = kept.into_values().chain(fresh).collect();
        results.sort_by_key(|r| r.index);
        Ok((chapter_report, results))
    }
}

/// 所选章节引用的每个插图都必须已有缓存记录
async fn ensure_visual_context(
    chapters: &[&Chapter],
    cache: &dyn VisualCachePort,
) -> Result<(), ApplicationError> {
    let referenced: BTreeSet<AssetKey> = chapters
        .iter()
        .flat_map(|c| c.segments())
        .flat_map(|s| find_markers(s.text()))
        .collect();

    let mut missing = BTreeSet::new();
    for key in referenced {
        if cache.entry(&key).await?.is_none() {
            missing.insert(key);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::error!(missing = missing.len(), "Referenced illustrations have no cached analysis");
        Err(ApplicationError::MissingVisualContext { keys: missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::handlers::{PrecomputeConfig, PrecomputeVisualCacheHandler};
    use crate::application::commands::PrecomputeVisualCache;
    use crate::application::guard::{LeakGuard, RetryPolicy, SafetyGuard};
    use crate::application::orchestration::{OrchestratorConfig, PromptBuilder};
    use crate::domain::analysis::InvalidationPolicy;
    use crate::infrastructure::adapters::{
        FakeGenerationClient, FakeGenerationClientConfig, FakeVisionClient, FileVolumeStorage,
    };
    use crate::infrastructure::memory::{InMemoryAuditLog, InMemoryTranslationStore};
    use crate::infrastructure::persistence::JsonVisualCacheFactory;
    use std::path::Path;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
id = "vol-01"
title = "Test Volume"

[[chapters]]
file = "ch01.txt"

[[chapters]]
file = "ch02.txt"

[[illustrations]]
key = "img-1"
file = "img1.png"
"#;

    struct Fixture {
        temp: TempDir,
        generation: Arc<FakeGenerationClient>,
        store: Arc<InMemoryTranslationStore>,
        factory: Arc<JsonVisualCacheFactory>,
    }

    impl Fixture {
        fn new(generation: FakeGenerationClientConfig) -> Self {
            let temp = TempDir::new().unwrap();
            let dir = temp.path().join("volume");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("volume.toml"), MANIFEST).unwrap();
            std::fs::write(dir.join("ch01.txt"), "一つ目。\n\n二つ目。\n\n[[illustration:img-1]]\n\n三つ目。").unwrap();
            std::fs::write(dir.join("ch02.txt"), "四つ目。\n\n壊れた文。").unwrap();
            std::fs::write(dir.join("img1.png"), b"png-bytes").unwrap();

            let factory = Arc::new(JsonVisualCacheFactory::new(
                temp.path().join("cache"),
                InvalidationPolicy::default(),
            ));
            Self {
                temp,
                generation: Arc::new(FakeGenerationClient::new(generation)),
                store: Arc::new(InMemoryTranslationStore::new()),
                factory,
            }
        }

        fn volume_dir(&self) -> PathBuf {
            self.temp.path().join("volume")
        }

        fn output_dir(&self) -> PathBuf {
            self.temp.path().join("out")
        }

        async fn precompute(&self) {
            let guard = Arc::new(SafetyGuard::new(
                Arc::new(FakeVisionClient::with_defaults()),
                RetryPolicy::immediate(0),
            ));
            PrecomputeVisualCacheHandler::new(
                Arc::new(FileVolumeStorage::default()),
                self.factory.clone(),
                guard,
                PrecomputeConfig::default(),
            )
            .handle(PrecomputeVisualCache {
                volume_dir: self.volume_dir(),
            })
            .await
            .unwrap();
        }

        fn handler(&self) -> TranslateVolumeHandler {
            let orchestrator = DualTierOrchestrator::new(
                Arc::new(LeakGuard::new(self.generation.clone(), RetryPolicy::immediate(0))),
                Arc::new(InMemoryAuditLog::new()),
                PromptBuilder::default(),
                OrchestratorConfig::default(),
            );
            TranslateVolumeHandler::new(
                Arc::new(FileVolumeStorage::default()),
                self.factory.clone(),
                self.store.clone(),
                Arc::new(orchestrator),
                3,
            )
        }

        fn command(&self, only_failed: bool) -> TranslateVolume {
            TranslateVolume {
                volume_dir: self.volume_dir(),
                output_dir: self.output_dir(),
                only_failed,
                chapter: None,
            }
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_translate_fails_loudly_without_precompute() {
        let f = Fixture::new(FakeGenerationClientConfig::default());
        let err = f
            .handler()
            .handle(f.command(false), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ApplicationError::MissingVisualContext { keys } => {
                assert_eq!(keys.into_iter().map(|k| k.to_string()).collect::<Vec<_>>(), vec!["img-1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.generation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_translate_writes_chapters_and_report() {
        let f = Fixture::new(FakeGenerationClientConfig {
            fail_on: vec!["壊れた".to_string()],
            ..Default::default()
        });
        f.precompute().await;

        let report = f
            .handler()
            .handle(f.command(false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.chapters.len(), 2);
        assert_eq!(report.chapters[0].ok, 4);
        assert_eq!(report.chapters[1].failed, 1);
        assert_eq!(report.failed_segments, vec![SegmentId::new(2, 1)]);
        assert!(!report.is_complete());

        let out = f.output_dir().join("vol-01");
        assert_eq!(
            read(&out.join("chapter_001.txt")),
            "一つ目。\n\n二つ目。\n\n[[illustration:img-1]]\n\n三つ目。"
        );
        // 失败片段回退到原文
        assert_eq!(read(&out.join("chapter_002.txt")), "四つ目。\n\n壊れた文。");
        let document: serde_json::Value = serde_json::from_str(&read(&out.join("report.json"))).unwrap();
        assert_eq!(document["results"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_only_failed_reruns_just_the_failures() {
        let f = Fixture::new(FakeGenerationClientConfig {
            fail_on: vec!["壊れた".to_string()],
            ..Default::default()
        });
        f.precompute().await;
        f.handler()
            .handle(f.command(false), &CancellationToken::new())
            .await
            .unwrap();
        let calls_after_first = f.generation.call_count();

        let report = f
            .handler()
            .handle(f.command(true), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.chapters[0].kept, 4);
        assert_eq!(report.chapters[1].kept, 1);
        assert_eq!(f.generation.call_count(), calls_after_first + 1);
        assert_eq!(report.failed_segments, vec![SegmentId::new(2, 1)]);
    }

    #[tokio::test]
    async fn test_chapter_filter_and_shutdown() {
        let f = Fixture::new(FakeGenerationClientConfig::default());
        f.precompute().await;

        let mut command = f.command(false);
        command.chapter = Some(2);
        let report = f
            .handler()
            .handle(command, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.chapters.len(), 1);
        assert_eq!(report.chapters[0].chapter, 2);
        assert!(report.is_complete());

        let token = CancellationToken::new();
        token.cancel();
        let report = f.handler().handle(f.command(false), &token).await.unwrap();
        assert!(report.interrupted);
        assert!(report.chapters.is_empty());
    }
}
