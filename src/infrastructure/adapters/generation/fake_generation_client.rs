//! Fake Generation Client - 用于测试和离线运行的生成层
//!
//! 默认原样返回正文；可预置脚本响应、按正文注入失败、按正文哈希模拟延迟

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::application::ports::{
    GenerationEnginePort, GenerationError, GenerationRequest, GenerationResponse,
};

/// Fake Generation Client 配置
#[derive(Debug, Clone, Default)]
pub struct FakeGenerationClientConfig {
    /// 每次调用的最大模拟延迟；实际延迟由正文的 md5 决定
    pub max_latency_ms: u64,
    /// 正文包含这些子串时总是返回 503
    pub fail_on: Vec<String>,
    /// 返回推理过程
    pub with_reasoning: bool,
}

/// Fake Generation Client
pub struct FakeGenerationClient {
    config: FakeGenerationClientConfig,
    calls: AtomicU32,
    scripted: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerationClient {
    pub fn new(config: FakeGenerationClientConfig) -> Self {
        Self {
            config,
            calls: AtomicU32::new(0),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 预置接下来的响应（按顺序消费，用完后回到原样返回）
    pub fn script(&self, responses: Vec<String>) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.extend(responses);
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// 收到的全部请求（按到达顺序）
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn last_system(&self) -> Option<String> {
        self.requests().last().map(|r| r.system.clone())
    }

    fn latency_for(&self, passage: &str) -> Duration {
        if self.config.max_latency_ms == 0 {
            return Duration::ZERO;
        }
        let digest = md5::compute(passage.as_bytes());
        let seed = u64::from(digest[0]) << 8 | u64::from(digest[1]);
        Duration::from_millis(seed % (self.config.max_latency_ms + 1))
    }
}

#[async_trait]
impl GenerationEnginePort for FakeGenerationClient {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let delay = self.latency_for(&request.passage);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self
            .config
            .fail_on
            .iter()
            .any(|needle| request.passage.contains(needle.as_str()))
        {
            return Err(GenerationError::ServiceUnavailable("fake 503".to_string()));
        }

        let scripted = self.scripted.lock().ok().and_then(|mut q| q.pop_front());
        let text = scripted.unwrap_or_else(|| request.passage.clone());

        let reasoning = self
            .config
            .with_reasoning
            .then(|| format!("depth={} chars={}", request.depth.as_str(), request.passage.chars().count()));

        Ok(GenerationResponse { text, reasoning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment_classifier::ReasoningDepth;

    fn request(passage: &str) -> GenerationRequest {
        GenerationRequest {
            system: String::new(),
            prompt: passage.to_string(),
            passage: passage.to_string(),
            depth: ReasoningDepth::Light,
        }
    }

    #[tokio::test]
    async fn test_script_then_identity() {
        let fake = FakeGenerationClient::new(FakeGenerationClientConfig {
            with_reasoning: true,
            ..Default::default()
        });
        fake.script(vec!["scripted".to_string()]);

        let first = fake.generate(request("source")).await.unwrap();
        let second = fake.generate(request("source")).await.unwrap();
        assert_eq!(first.text, "scripted");
        assert_eq!(second.text, "source");
        assert_eq!(second.reasoning.as_deref(), Some("depth=light chars=6"));
        assert_eq!(fake.call_count(), 2);
    }

    #[test]
    fn test_latency_is_deterministic_and_bounded() {
        let fake = FakeGenerationClient::new(FakeGenerationClientConfig {
            max_latency_ms: 20,
            ..Default::default()
        });
        for passage in ["a", "b", "長い段落"] {
            let delay = fake.latency_for(passage);
            assert_eq!(delay, fake.latency_for(passage));
            assert!(delay <= Duration::from_millis(20));
        }
    }
}
