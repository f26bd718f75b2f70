//! 视觉层安全护栏

use std::sync::Arc;

use super::{GuardError, RetryPolicy};
use crate::application::ports::{VisionEnginePort, VisionError, VisionRequest};
use crate::domain::analysis::VisualAnalysis;

/// 护栏通过后的分析结果
#[derive(Debug, Clone)]
pub struct GuardedAnalysis {
    pub analysis: VisualAnalysis,
    pub attempts: u32,
}

/// 视觉层安全护栏
pub struct SafetyGuard {
    engine: Arc<dyn VisionEnginePort>,
    retry: RetryPolicy,
}

impl SafetyGuard {
    pub fn new(engine: Arc<dyn VisionEnginePort>, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    pub fn model_version(&self) -> &str {
        self.engine.model_version()
    }

    /// 分析插图；拒绝时返回 SafetyBlocked，从不重试
    pub async fn analyze(&self, request: VisionRequest) -> Result<GuardedAnalysis, GuardError> {
        let asset_key = request.asset_key.clone();
        let outcome = self
            .retry
            .run(
                "vision",
                || self.engine.analyze(request.clone()),
                VisionError::is_transient,
            )
            .await;

        match outcome {
            Ok(done) => Ok(GuardedAnalysis {
                analysis: done.value,
                attempts: done.attempts,
            }),
            Err(failed) => match failed.value {
                VisionError::SafetyRefusal(reason) => {
                    tracing::warn!(asset_key = %asset_key, reason = %reason, "Vision tier refused illustration");
                    Err(GuardError::SafetyBlocked { reason })
                }
                source => Err(GuardError::Vision {
                    attempts: failed.attempts,
                    source,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::AssetKey;
    use crate::infrastructure::adapters::{FakeVisionClient, FakeVisionClientConfig};

    fn request(key: &str) -> VisionRequest {
        VisionRequest {
            asset_key: AssetKey::new(key).unwrap(),
            media_type: "image/png".to_string(),
            image: Arc::from(b"png".to_vec()),
            instruction: "describe".to_string(),
        }
    }

    #[tokio::test]
    async fn test_refusal_is_not_retried() {
        let fake = Arc::new(FakeVisionClient::new(FakeVisionClientConfig {
            refuse: vec!["nsfw".to_string()],
            ..Default::default()
        }));
        let guard = SafetyGuard::new(fake.clone(), RetryPolicy::immediate(3));

        let err = guard.analyze(request("nsfw")).await.unwrap_err();
        assert!(matches!(err, GuardError::SafetyBlocked { .. }));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_recovered() {
        let fake = Arc::new(FakeVisionClient::new(FakeVisionClientConfig {
            transient_failures: 2,
            ..Default::default()
        }));
        let guard = SafetyGuard::new(fake.clone(), RetryPolicy::immediate(2));

        let done = guard.analyze(request("img-1")).await.unwrap();
        assert_eq!(done.attempts, 3);
        assert!(!done.analysis.directives.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let fake = Arc::new(FakeVisionClient::new(FakeVisionClientConfig {
            transient_failures: 10,
            ..Default::default()
        }));
        let guard = SafetyGuard::new(fake.clone(), RetryPolicy::immediate(2));

        let err = guard.analyze(request("img-1")).await.unwrap_err();
        assert!(matches!(err, GuardError::Vision { attempts: 3, .. }));
        assert_eq!(fake.call_count(), 3);
    }
}
