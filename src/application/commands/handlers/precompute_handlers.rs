//! Precompute Handler - 视觉资产处理器
//!
//! 对卷内每张插图：
//! 1. 计算候选 CacheKey（内容指纹 + 指令指纹 + 模型版本）
//! 2. 缓存仍新鲜（或人工覆盖）则跳过
//! 3. 其他 asset_key 下有相同 CacheKey 的新鲜记录则直接复制
//! 4. 否则经 SafetyGuard 调用视觉层并写入；安全拒绝写入降级记录
//!
//! 单张插图失败不影响整卷，不写入任何内容。

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;

use crate::application::commands::PrecomputeVisualCache;
use crate::application::error::ApplicationError;
use crate::application::guard::{GuardError, SafetyGuard};
use crate::application::ports::{
    record_age_days, VisionRequest, VisualCacheFactory, VisualCachePort, VolumeSourcePort,
};
use crate::domain::analysis::{AnalysisRecord, CacheKey, Freshness};
use crate::domain::volume::{AssetKey, Fingerprint, Illustration, Volume};

/// 默认分析指令（其指纹参与 CacheKey，修改即触发全部重新生成）
pub const ANALYSIS_INSTRUCTION: &str = "Analyse this illustration for the translator of the surrounding chapter. \
Return a JSON object with: composition (one paragraph), emotional_delta (how the mood shifts), \
observed_details (object mapping names to visible details), directives (ordered list of concrete \
guidance for rendering nearby prose), spoiler_prevention (facts the picture reveals that the text \
must not state before the picture is reached).";

/// 预计算配置
#[derive(Debug, Clone)]
pub struct PrecomputeConfig {
    pub instruction: String,
    /// 视觉层并发上限
    pub concurrency: usize,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        Self {
            instruction: ANALYSIS_INSTRUCTION.to_string(),
            concurrency: 2,
        }
    }
}

/// 预计算报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecomputeReport {
    /// 缓存命中（含跨 asset_key 的内容复用）
    pub reused: usize,
    pub generated: usize,
    pub blocked: usize,
    /// (asset_key, 错误信息)
    pub failed: Vec<(AssetKey, String)>,
}

impl PrecomputeReport {
    pub fn vision_calls_made(&self) -> bool {
        self.generated > 0 || self.blocked > 0
    }
}

enum Outcome {
    Reused,
    Generated,
    Blocked,
    Failed(String),
}

/// PrecomputeVisualCache Handler
pub struct PrecomputeVisualCacheHandler {
    volume_source: Arc<dyn VolumeSourcePort>,
    cache_factory: Arc<dyn VisualCacheFactory>,
    guard: Arc<SafetyGuard>,
    config: PrecomputeConfig,
    prompt_fingerprint: Fingerprint,
}

impl PrecomputeVisualCacheHandler {
    pub fn new(
        volume_source: Arc<dyn VolumeSourcePort>,
        cache_factory: Arc<dyn VisualCacheFactory>,
        guard: Arc<SafetyGuard>,
        config: PrecomputeConfig,
    ) -> Self {
        let prompt_fingerprint = Fingerprint::of_text(&config.instruction);
        Self {
            volume_source,
            cache_factory,
            guard,
            config,
            prompt_fingerprint,
        }
    }

    pub async fn handle(&self, command: PrecomputeVisualCache) -> Result<PrecomputeReport, ApplicationError> {
        let volume = self.volume_source.load(&command.volume_dir).await?;
        let cache = self.cache_factory.open(volume.id()).await?;
        self.process_volume(&volume, cache).await
    }

    /// 处理一卷的全部插图
    pub async fn process_volume(
        &self,
        volume: &Volume,
        cache: Arc<dyn VisualCachePort>,
    ) -> Result<PrecomputeReport, ApplicationError> {
        tracing::info!(
            volume_id = %volume.id(),
            illustrations = volume.illustrations().len(),
            model_version = %self.guard.model_version(),
            "Precomputing visual cache"
        );

        let outcomes: Vec<(AssetKey, Result<Outcome, ApplicationError>)> =
            stream::iter(volume.illustrations())
                .map(|illustration| {
                    let cache = cache.clone();
                    async move {
                        let key = illustration.asset_key().clone();
                        (key, self.process_one(illustration, cache.as_ref()).await)
                    }
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        let mut report = PrecomputeReport::default();
        for (asset_key, outcome) in outcomes {
            match outcome? {
                Outcome::Reused => report.reused += 1,
                Outcome::Generated => report.generated += 1,
                Outcome::Blocked => report.blocked += 1,
                Outcome::Failed(reason) => report.failed.push((asset_key, reason)),
            }
        }
        report.failed.sort();

        tracing::info!(
            volume_id = %volume.id(),
            reused = report.reused,
            generated = report.generated,
            blocked = report.blocked,
            failed = report.failed.len(),
            "Visual cache precompute finished"
        );
        Ok(report)
    }

    /// 缓存错误向上传播；视觉层错误只记入该插图
    async fn process_one(
        &self,
        illustration: &Illustration,
        cache: &dyn VisualCachePort,
    ) -> Result<Outcome, ApplicationError> {
        let asset_key = illustration.asset_key();
        let candidate = CacheKey::new(
            illustration.fingerprint().clone(),
            self.prompt_fingerprint.clone(),
            self.guard.model_version(),
        );

        let reason = match cache.evaluate(asset_key, &candidate).await? {
            Freshness::Fresh | Freshness::Pinned => {
                tracing::debug!(asset_key = %asset_key, "Visual cache hit");
                return Ok(Outcome::Reused);
            }
            Freshness::Regenerate(reason) => reason,
        };

        if let Some(existing) = cache.find_reusable(&candidate).await? {
            tracing::info!(
                asset_key = %asset_key,
                source = %existing.asset_key,
                age_days = record_age_days(&existing.record),
                "Reusing analysis of identical illustration"
            );
            cache.put(asset_key, candidate, existing.record).await?;
            return Ok(Outcome::Reused);
        }

        tracing::info!(asset_key = %asset_key, reason = %reason, "Analysing illustration");
        let request = VisionRequest {
            asset_key: asset_key.clone(),
            media_type: illustration.media_type().to_string(),
            image: illustration.bytes(),
            instruction: self.config.instruction.clone(),
        };

        match self.guard.analyze(request).await {
            Ok(done) => {
                let record = AnalysisRecord::from_analysis(done.analysis, Utc::now());
                cache.put(asset_key, candidate, record).await?;
                Ok(Outcome::Generated)
            }
            Err(GuardError::SafetyBlocked { reason }) => {
                let record = AnalysisRecord::safety_fallback(reason, Utc::now());
                cache.put(asset_key, candidate, record).await?;
                Ok(Outcome::Blocked)
            }
            Err(e) => {
                tracing::error!(asset_key = %asset_key, attempts = e.attempts(), error = %e, "Illustration analysis failed");
                Ok(Outcome::Failed(e.to_string()))
            }
        }
    }
}
