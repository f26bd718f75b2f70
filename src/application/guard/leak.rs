//! 生成层泄露护栏

use std::sync::Arc;

use super::{GuardError, RetryPolicy};
use crate::application::ports::{
    GenerationEnginePort, GenerationError, GenerationRequest, GenerationResponse,
};
use crate::domain::leak_detector::detect_leak;
use crate::domain::translation::GuardFlag;

/// 严格重试时追加到系统指令末尾
pub const STRICT_OUTPUT_INSTRUCTION: &str = "Output only the translation of the passage. \
Do not add commentary, notes, plans or explanations. Do not describe what you are doing.";

/// 护栏通过后的生成结果
#[derive(Debug, Clone)]
pub struct GuardedGeneration {
    pub response: GenerationResponse,
    /// 生成层调用总次数（含瞬时重试和严格重试）
    pub attempts: u32,
    pub flags: Vec<GuardFlag>,
}

/// 生成层泄露护栏
pub struct LeakGuard {
    engine: Arc<dyn GenerationEnginePort>,
    retry: RetryPolicy,
}

impl LeakGuard {
    pub fn new(engine: Arc<dyn GenerationEnginePort>, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    async fn call(
        &self,
        request: &GenerationRequest,
        attempts: &mut u32,
        flags: &mut Vec<GuardFlag>,
    ) -> Result<GenerationResponse, GuardError> {
        let outcome = self
            .retry
            .run(
                "generation",
                || self.engine.generate(request.clone()),
                GenerationError::is_transient,
            )
            .await;

        match outcome {
            Ok(done) => {
                *attempts += done.attempts;
                if done.attempts > 1 && !flags.contains(&GuardFlag::TransientRetry) {
                    flags.push(GuardFlag::TransientRetry);
                }
                Ok(done.value)
            }
            Err(failed) => {
                let mut flags = flags.clone();
                if failed.attempts > 1 && !flags.contains(&GuardFlag::TransientRetry) {
                    flags.push(GuardFlag::TransientRetry);
                }
                Err(GuardError::Generation {
                    attempts: *attempts + failed.attempts,
                    flags,
                    source: failed.value,
                })
            }
        }
    }

    /// 生成译文；检测到泄露时用严格指令重试一次，再次泄露返回 AnalysisLeak
    pub async fn generate(&self, request: GenerationRequest) -> Result<GuardedGeneration, GuardError> {
        let mut attempts = 0;
        let mut flags = Vec::new();

        let response = self.call(&request, &mut attempts, &mut flags).await?;
        let Some(signal) = detect_leak(&response.text, &request.passage) else {
            return Ok(GuardedGeneration {
                response,
                attempts,
                flags,
            });
        };

        tracing::warn!(signal = %signal.describe(), "Analysis leak detected, retrying with strict instruction");
        flags.push(GuardFlag::LeakDetected);
        flags.push(GuardFlag::StrictRetry);

        let strict = GenerationRequest {
            system: format!("{}\n\n{}", request.system, STRICT_OUTPUT_INSTRUCTION),
            ..request.clone()
        };
        let response = self.call(&strict, &mut attempts, &mut flags).await?;

        match detect_leak(&response.text, &request.passage) {
            None => Ok(GuardedGeneration {
                response,
                attempts,
                flags,
            }),
            Some(signal) => Err(GuardError::AnalysisLeak {
                detail: signal.describe(),
                attempts,
            }),
        }
    }
}
