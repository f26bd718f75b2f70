//! Fake Vision Client - 用于测试和离线运行的视觉层
//!
//! 不调用任何服务，按 asset_key 生成确定性的分析结果

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::application::ports::{VisionEnginePort, VisionError, VisionRequest};
use crate::domain::analysis::VisualAnalysis;
use crate::domain::volume::{AssetKey, Fingerprint};

/// Fake Vision Client 配置
#[derive(Debug, Clone)]
pub struct FakeVisionClientConfig {
    pub model_version: String,
    /// 这些 asset_key 总是被安全拒绝
    pub refuse: Vec<String>,
    /// 前 N 次调用返回瞬时错误
    pub transient_failures: u32,
    /// 模拟延迟（毫秒）
    pub latency_ms: u64,
}

impl Default for FakeVisionClientConfig {
    fn default() -> Self {
        Self {
            model_version: "fake-vision-1".to_string(),
            refuse: Vec::new(),
            transient_failures: 0,
            latency_ms: 0,
        }
    }
}

/// Fake Vision Client
pub struct FakeVisionClient {
    config: FakeVisionClientConfig,
    calls: AtomicU32,
    failures_left: AtomicU32,
    analyzed: Mutex<Vec<AssetKey>>,
}

impl FakeVisionClient {
    pub fn new(config: FakeVisionClientConfig) -> Self {
        tracing::info!(model_version = %config.model_version, "FakeVisionClient initialized");
        let failures_left = AtomicU32::new(config.transient_failures);
        Self {
            config,
            calls: AtomicU32::new(0),
            failures_left,
            analyzed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeVisionClientConfig::default())
    }

    /// 总调用次数（含失败）
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// 成功分析过的 asset_key（按完成顺序）
    pub fn analyzed(&self) -> Vec<AssetKey> {
        self.analyzed
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    fn analysis_for(key: &AssetKey, image: &[u8]) -> VisualAnalysis {
        let fingerprint = Fingerprint::of_bytes(image);
        let mut observed_details = BTreeMap::new();
        observed_details.insert("asset".to_string(), key.to_string());
        observed_details.insert("fingerprint".to_string(), fingerprint.to_string());

        VisualAnalysis {
            composition: format!("Single figure framed centrally in illustration {}", key),
            emotional_delta: format!("Tension rises as illustration {} is revealed", key),
            observed_details,
            directives: vec![
                format!("Keep the pacing tight around illustration {}", key),
                format!("The secret of {} must stay implicit", key),
            ],
            spoiler_prevention: vec![format!("secret of {}", key)],
        }
    }
}

#[async_trait]
impl VisionEnginePort for FakeVisionClient {
    async fn analyze(&self, request: VisionRequest) -> Result<VisualAnalysis, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VisionError::ServiceUnavailable("fake 503".to_string()));
        }

        if self.config.refuse.iter().any(|k| k == request.asset_key.as_str()) {
            return Err(VisionError::SafetyRefusal(
                "content policy (fake)".to_string(),
            ));
        }

        tracing::debug!(asset_key = %request.asset_key, "FakeVisionClient: returning fixed analysis");
        if let Ok(mut keys) = self.analyzed.lock() {
            keys.push(request.asset_key.clone());
        }
        Ok(Self::analysis_for(&request.asset_key, &request.image))
    }

    fn model_version(&self) -> &str {
        &self.config.model_version
    }
}
