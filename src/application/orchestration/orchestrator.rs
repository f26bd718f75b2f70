//! Dual-Tier Orchestrator - 双层编排器
//!
//! 一章内的调度：
//! - STANDARD 片段并发进入生成层（信号量限流）
//! - DIRECT / LOOKAHEAD 片段在单一视觉通道上按文档顺序依次执行，携带叙事状态
//! - 结果按片段序号收集，与完成顺序无关
//!
//! 章节超时或进程关闭时，未完成的片段记为 cancelled。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{NarrativeState, PromptBuilder};
use crate::application::guard::LeakGuard;
use crate::application::ports::{AuditEntry, AuditLogPort, CacheEntry, CacheError, VisualCachePort};
use crate::domain::segment_classifier::{ClassifiedSegment, Passage};
use crate::domain::translation::{GuardFlag, TranslationResult};
use crate::domain::volume::{AssetKey, VolumeId};

/// 编排错误（只影响当前章节）
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Visual lane ordering violation in chapter {chapter}: segment {got} dispatched after {last}")]
    OrderingViolation {
        chapter: usize,
        last: usize,
        got: usize,
    },

    #[error("Missing visual context for {asset_key} (chapter {chapter}, segment {index})")]
    MissingContext {
        asset_key: AssetKey,
        chapter: usize,
        index: usize,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// STANDARD 片段的并发上限
    pub concurrency: usize,
    /// 单章超时
    pub chapter_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            chapter_timeout: Duration::from_secs(900),
        }
    }
}

/// 视觉通道的顺序闸门
///
/// 只接受严格递增的片段序号
#[derive(Debug)]
pub struct VisualLane {
    chapter: usize,
    last: Option<usize>,
}

impl VisualLane {
    pub fn new(chapter: usize) -> Self {
        Self { chapter, last: None }
    }

    pub fn admit(&mut self, index: usize) -> Result<(), OrchestratorError> {
        if let Some(last) = self.last {
            if index <= last {
                return Err(OrchestratorError::OrderingViolation {
                    chapter: self.chapter,
                    last,
                    got: index,
                });
            }
        }
        self.last = Some(index);
        Ok(())
    }
}

/// 任务间共享的依赖
struct LaneContext {
    volume_id: VolumeId,
    guard: Arc<LeakGuard>,
    audit: Arc<dyn AuditLogPort>,
    prompts: Arc<PromptBuilder>,
}

impl LaneContext {
    async fn run_segment(
        &self,
        segment: &ClassifiedSegment,
        context: Option<&CacheEntry>,
        state: Option<&NarrativeState>,
    ) -> TranslationResult {
        let passage = Passage::parse(&segment.text);
        let consulted: Vec<_> = context.map(|e| e.key.clone()).into_iter().collect();
        let mut flags = Vec::new();
        if context.is_some_and(|e| e.record.is_safety_blocked()) {
            flags.push(GuardFlag::SafetyFallbackContext);
        }

        let (result, reasoning) = if passage.is_marker_only() {
            (TranslationResult::ok(segment, segment.text.clone()), None)
        } else {
            let request =
                self.prompts
                    .build(segment, &passage, context.map(|e| &e.record), state);
            match self.guard.generate(request).await {
                Ok(done) => {
                    flags.extend(done.flags);
                    let text = passage.reassemble(&done.response.text);
                    (
                        TranslationResult::ok(segment, text).with_attempts(done.attempts),
                        done.response.reasoning,
                    )
                }
                Err(e) => {
                    flags.extend(e.flags());
                    tracing::warn!(
                        segment = %segment.id(),
                        tag = %segment.tag,
                        error = %e,
                        "Segment failed"
                    );
                    (
                        TranslationResult::failed(segment, e.to_string()).with_attempts(e.attempts()),
                        None,
                    )
                }
            }
        };

        let mut result = result.with_consulted(consulted).with_flags(flags);
        let entry = AuditEntry::for_result(&self.volume_id, &result, reasoning);
        let entry_id = entry.id.clone();
        match self.audit.record(entry).await {
            Ok(()) => result.trace_ref = Some(entry_id),
            Err(e) => tracing::warn!(segment = %segment.id(), error = %e, "Audit write failed"),
        }
        result
    }
}

/// 双层编排器
pub struct DualTierOrchestrator {
    guard: Arc<LeakGuard>,
    audit: Arc<dyn AuditLogPort>,
    prompts: Arc<PromptBuilder>,
    semaphore: Arc<Semaphore>,
    config: OrchestratorConfig,
}

impl DualTierOrchestrator {
    pub fn new(
        guard: Arc<LeakGuard>,
        audit: Arc<dyn AuditLogPort>,
        prompts: PromptBuilder,
        config: OrchestratorConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            guard,
            audit,
            prompts: Arc::new(prompts),
            semaphore,
            config,
        }
    }

    /// 解析视觉片段引用的缓存条目；缺失即报错
    async fn resolve_contexts(
        segments: &[ClassifiedSegment],
        cache: &dyn VisualCachePort,
    ) -> Result<HashMap<AssetKey, CacheEntry>, OrchestratorError> {
        let mut contexts = HashMap::new();
        for segment in segments {
            let Some(key) = segment.visual_key() else {
                continue;
            };
            if contexts.contains_key(key) {
                continue;
            }
            let entry = cache
                .entry(key)
                .await?
                .ok_or_else(|| OrchestratorError::MissingContext {
                    asset_key: key.clone(),
                    chapter: segment.chapter,
                    index: segment.index,
                })?;
            contexts.insert(key.clone(), entry);
        }
        Ok(contexts)
    }

    /// 翻译一章；返回按片段序号排序的结果
    pub async fn translate(
        &self,
        volume_id: &VolumeId,
        chapter: usize,
        segments: Vec<ClassifiedSegment>,
        cache: Arc<dyn VisualCachePort>,
        shutdown: &CancellationToken,
    ) -> Result<Vec<TranslationResult>, OrchestratorError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let contexts = Arc::new(Self::resolve_contexts(&segments, cache.as_ref()).await?);
        let ctx = Arc::new(LaneContext {
            volume_id: volume_id.clone(),
            guard: self.guard.clone(),
            audit: self.audit.clone(),
            prompts: self.prompts.clone(),
        });

        let (tx, mut rx) = mpsc::channel::<TranslationResult>(segments.len());
        let mut tasks: JoinSet<Result<(), OrchestratorError>> = JoinSet::new();

        let (mut visual, standard): (Vec<_>, Vec<_>) =
            segments.iter().cloned().partition(|s| s.tag.is_visual());
        visual.sort_by_key(|s| s.index);

        tracing::info!(
            volume_id = %volume_id,
            chapter,
            standard = standard.len(),
            visual = visual.len(),
            "Dispatching chapter"
        );

        for segment in standard {
            let permit = self.semaphore.clone().acquire_owned();
            let ctx = ctx.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                // 信号量不会被关闭
                let Ok(_permit) = permit.await else {
                    return Ok(());
                };
                let result = ctx.run_segment(&segment, None, None).await;
                // 容量等于片段数，不会满；审计写完后不再有让出点
                let _ = tx.try_send(result);
                Ok(())
            });
        }

        if !visual.is_empty() {
            let ctx = ctx.clone();
            let tx = tx.clone();
            let contexts = contexts.clone();
            tasks.spawn(async move {
                let mut lane = VisualLane::new(chapter);
                let mut state = NarrativeState::default();
                for segment in visual {
                    lane.admit(segment.index)?;
                    let context = segment.visual_key().and_then(|k| contexts.get(k));
                    let result = ctx.run_segment(&segment, context, Some(&state)).await;
                    state.advance(&segment, &Passage::parse(&segment.text));
                    let _ = tx.try_send(result);
                }
                Ok::<(), OrchestratorError>(())
            });
        }
        drop(tx);

        let mut collected: BTreeMap<usize, TranslationResult> = BTreeMap::new();
        let deadline = tokio::time::Instant::now() + self.config.chapter_timeout;
        let interrupted = loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(result) => {
                        collected.insert(result.index, result);
                    }
                    None => break None,
                },
                _ = tokio::time::sleep_until(deadline) => break Some("chapter timeout"),
                _ = shutdown.cancelled() => break Some("shutdown requested"),
            }
        };

        if let Some(reason) = interrupted {
            tracing::warn!(volume_id = %volume_id, chapter, reason, "Chapter interrupted, cancelling in-flight segments");
            tasks.abort_all();
        }

        let mut lane_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Err(e)) => lane_error = Some(e),
                Err(e) if e.is_panic() => {
                    tracing::error!(chapter, error = %e, "Segment task panicked");
                }
                _ => {}
            }
        }
        if let Some(e) = lane_error {
            return Err(e);
        }

        // 中断前已完成的结果仍在通道里
        while let Ok(result) = rx.try_recv() {
            collected.insert(result.index, result);
        }

        let results = segments
            .iter()
            .map(|segment| match collected.remove(&segment.index) {
                Some(result) => result,
                None => match interrupted {
                    Some(reason) => TranslationResult::cancelled(segment, reason),
                    None => TranslationResult::failed(segment, "segment task ended without a result"),
                },
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::guard::RetryPolicy;
    use crate::domain::analysis::{AnalysisRecord, CacheKey, InvalidationPolicy, VisualAnalysis};
    use crate::domain::segment_classifier::{classify, SegmentTag};
    use crate::domain::translation::SegmentStatus;
    use crate::domain::volume::{Chapter, Fingerprint, SourceSegment};
    use crate::infrastructure::adapters::{FakeGenerationClient, FakeGenerationClientConfig};
    use crate::infrastructure::memory::InMemoryAuditLog;
    use crate::infrastructure::persistence::json::JsonVisualCache;
    use chrono::Utc;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        fake: Arc<FakeGenerationClient>,
        audit: Arc<InMemoryAuditLog>,
        cache: Arc<JsonVisualCache>,
        orchestrator: DualTierOrchestrator,
    }

    async fn harness(config: FakeGenerationClientConfig, concurrency: usize) -> Harness {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(
            JsonVisualCache::open(
                temp.path().join("vol.json"),
                VolumeId::new("vol").unwrap(),
                InvalidationPolicy::default(),
            )
            .await
            .unwrap(),
        );
        let fake = Arc::new(FakeGenerationClient::new(config));
        let audit = Arc::new(InMemoryAuditLog::new());
        let guard = Arc::new(LeakGuard::new(fake.clone(), RetryPolicy::immediate(2)));
        let orchestrator = DualTierOrchestrator::new(
            guard,
            audit.clone(),
            PromptBuilder::default(),
            OrchestratorConfig {
                concurrency,
                chapter_timeout: Duration::from_secs(30),
            },
        );
        Harness {
            _temp: temp,
            fake,
            audit,
            cache,
            orchestrator,
        }
    }

    fn chapter(texts: &[String]) -> Chapter {
        let segments = texts
            .iter()
            .enumerate()
            .map(|(i, t)| SourceSegment::new(i, t.clone()).unwrap())
            .collect();
        Chapter::new(1, "Chapter", segments).unwrap()
    }

    async fn seed(cache: &JsonVisualCache, key: &str, record: AnalysisRecord) {
        let asset = AssetKey::new(key).unwrap();
        let cache_key = CacheKey::new(
            Fingerprint::of_bytes(key.as_bytes()),
            Fingerprint::of_text("instruction"),
            "fake-vision-1",
        );
        cache.put(&asset, cache_key, record).await.unwrap();
    }

    fn analysis(key: &str) -> AnalysisRecord {
        AnalysisRecord::from_analysis(
            VisualAnalysis {
                emotional_delta: format!("mood of {}", key),
                directives: vec![format!("directive for {}", key)],
                spoiler_prevention: vec![format!("secret {}", key)],
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_visual_lane_rejects_out_of_order_dispatch() {
        let mut lane = VisualLane::new(4);
        lane.admit(1).unwrap();
        lane.admit(5).unwrap();
        let err = lane.admit(3).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::OrderingViolation { chapter: 4, last: 5, got: 3 }
        ));
        assert!(lane.admit(5).is_err());
    }

    #[tokio::test]
    async fn test_results_in_source_order_under_random_latency() {
        let h = harness(
            FakeGenerationClientConfig {
                max_latency_ms: 25,
                ..Default::default()
            },
            8,
        )
        .await;
        seed(&h.cache, "a", analysis("a")).await;
        seed(&h.cache, "b", analysis("b")).await;

        let mut texts: Vec<String> = (0..40).map(|i| format!("段落{}。", i)).collect();
        texts[10] = "[[illustration:a]]\n挿絵の場面。".to_string();
        texts[30] = "[[illustration:b]]".to_string();
        let segments = classify(&chapter(&texts), 3);
        let visual_indices: Vec<usize> = segments
            .iter()
            .filter(|s| s.tag.is_visual())
            .map(|s| s.index)
            .collect();
        assert_eq!(visual_indices, vec![8, 9, 10, 28, 29, 30]);

        let results = h
            .orchestrator
            .translate(
                &VolumeId::new("vol").unwrap(),
                1,
                segments,
                h.cache.clone(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..40).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(results[10].text, "[[illustration:a]]\n挿絵の場面。");
        assert_eq!(results[30].text, "[[illustration:b]]");
        assert_eq!(results[30].attempts, 0);
        assert_eq!(results[8].consulted.len(), 1);
        assert!(results[7].consulted.is_empty());

        // 视觉通道的请求按文档顺序到达（marker-only 片段不调用模型）
        let visual_requests: Vec<String> = h
            .fake
            .requests()
            .into_iter()
            .filter(|r| r.prompt.contains("Directives:"))
            .map(|r| r.passage)
            .collect();
        assert_eq!(
            visual_requests,
            vec!["段落8。", "段落9。", "挿絵の場面。", "段落28。", "段落29。"]
        );
        assert_eq!(h.audit.len(), 40);
        assert!(results.iter().all(|r| r.trace_ref.is_some()));
    }

    #[tokio::test]
    async fn test_failed_segment_does_not_abort_chapter() {
        let h = harness(
            FakeGenerationClientConfig {
                fail_on: vec!["壊れた".to_string()],
                ..Default::default()
            },
            4,
        )
        .await;
        let texts = vec![
            "一。".to_string(),
            "壊れた段落。".to_string(),
            "三。".to_string(),
        ];

        let results = h
            .orchestrator
            .translate(
                &VolumeId::new("vol").unwrap(),
                1,
                classify(&chapter(&texts), 3),
                h.cache.clone(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results[1].status, SegmentStatus::Failed);
        assert_eq!(results[1].attempts, 3);
        assert!(results[1].error.as_deref().unwrap_or("").contains("Generation call failed"));
        assert!(results[0].is_ok() && results[2].is_ok());
    }

    #[tokio::test]
    async fn test_safety_blocked_context_is_flagged() {
        let h = harness(FakeGenerationClientConfig::default(), 2).await;
        seed(&h.cache, "x", AnalysisRecord::safety_fallback("refused", Utc::now())).await;
        let texts = vec!["[[illustration:x]] 彼女は微笑んだ。".to_string()];

        let results = h
            .orchestrator
            .translate(
                &VolumeId::new("vol").unwrap(),
                1,
                classify(&chapter(&texts), 3),
                h.cache.clone(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].tag, SegmentTag::Direct);
        assert!(results[0].has_flag(GuardFlag::SafetyFallbackContext));
        assert_eq!(results[0].text, "[[illustration:x]]\n彼女は微笑んだ。");
        let prompt = &h.fake.requests()[0].prompt;
        assert!(prompt.contains("Rely on the source text only"));
    }

    #[tokio::test]
    async fn test_missing_context_fails_chapter() {
        let h = harness(FakeGenerationClientConfig::default(), 2).await;
        let texts = vec!["[[illustration:ghost]]".to_string()];

        let err = h
            .orchestrator
            .translate(
                &VolumeId::new("vol").unwrap(),
                1,
                classify(&chapter(&texts), 3),
                h.cache.clone(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingContext { .. }));
        assert_eq!(h.fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_marks_unfinished_segments_cancelled() {
        let h = harness(
            FakeGenerationClientConfig {
                max_latency_ms: 60_000,
                ..Default::default()
            },
            2,
        )
        .await;
        let texts: Vec<String> = (0..4).map(|i| format!("長い処理{}。", i)).collect();
        let token = CancellationToken::new();
        token.cancel();

        let results = h
            .orchestrator
            .translate(
                &VolumeId::new("vol").unwrap(),
                1,
                classify(&chapter(&texts), 3),
                h.cache.clone(),
                &token,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results
            .iter()
            .all(|r| r.status == SegmentStatus::Cancelled || r.is_ok()));
        assert!(results.iter().any(|r| r.status == SegmentStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_timeout_keeps_completed_results() {
        for run in 0..50 {
            let h = harness(
                FakeGenerationClientConfig {
                    max_latency_ms: 6,
                    ..Default::default()
                },
                8,
            )
            .await;
            let orchestrator = DualTierOrchestrator::new(
                Arc::new(LeakGuard::new(h.fake.clone(), RetryPolicy::immediate(0))),
                h.audit.clone(),
                PromptBuilder::default(),
                OrchestratorConfig {
                    concurrency: 8,
                    chapter_timeout: Duration::from_millis(3),
                },
            );
            let texts: Vec<String> = (0..8).map(|i| format!("第{}回の段落{}。", run, i)).collect();

            let results = orchestrator
                .translate(
                    &VolumeId::new("vol").unwrap(),
                    1,
                    classify(&chapter(&texts), 3),
                    h.cache.clone(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            let ok = results.iter().filter(|r| r.is_ok()).count();
            let cancelled = results
                .iter()
                .filter(|r| r.status == SegmentStatus::Cancelled)
                .count();
            assert_eq!(ok + cancelled, 8);
            assert_eq!(ok, h.audit.len(), "run {}", run);
            assert!(results
                .iter()
                .filter(|r| r.is_ok())
                .all(|r| r.trace_ref.is_some()));
        }
    }
}
