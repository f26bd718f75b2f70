//! Safety & Leak Guard - 模型调用护栏
//!
//! - SafetyGuard: 包装视觉层调用，安全拒绝不重试，直接转为 SafetyBlocked
//! - LeakGuard: 包装生成层调用，输出为分析评论时用严格指令重试一次
//! - RetryPolicy: 瞬时错误的指数退避

mod leak;
mod retry;
mod safety;

pub use leak::{GuardedGeneration, LeakGuard, STRICT_OUTPUT_INSTRUCTION};
pub use retry::{Attempted, RetryPolicy, INITIAL_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS};
pub use safety::{GuardedAnalysis, SafetyGuard};

use thiserror::Error;

use crate::application::ports::{GenerationError, VisionError};
use crate::domain::translation::GuardFlag;

/// 护栏失败类型
#[derive(Debug, Error)]
pub enum GuardError {
    /// 视觉层拒绝分析（内容策略）
    #[error("Vision tier refused the illustration: {reason}")]
    SafetyBlocked { reason: String },

    /// 严格重试后仍输出评论
    #[error("Generation returned commentary instead of a translation: {detail}")]
    AnalysisLeak { detail: String, attempts: u32 },

    #[error("Vision call failed after {attempts} attempt(s): {source}")]
    Vision {
        attempts: u32,
        #[source]
        source: VisionError,
    },

    /// flags: 失败前护栏已触发的标记（如泄露后的严格重试）
    #[error("Generation call failed after {attempts} attempt(s): {source}")]
    Generation {
        attempts: u32,
        flags: Vec<GuardFlag>,
        #[source]
        source: GenerationError,
    },
}

impl GuardError {
    /// 本次护栏内的模型调用次数
    pub fn attempts(&self) -> u32 {
        match self {
            GuardError::SafetyBlocked { .. } => 1,
            GuardError::AnalysisLeak { attempts, .. }
            | GuardError::Vision { attempts, .. }
            | GuardError::Generation { attempts, .. } => *attempts,
        }
    }

    /// 失败前触发的护栏标记，需写入审计
    pub fn flags(&self) -> Vec<GuardFlag> {
        match self {
            GuardError::AnalysisLeak { .. } => vec![GuardFlag::LeakDetected, GuardFlag::StrictRetry],
            GuardError::Generation { flags, .. } => flags.clone(),
            GuardError::SafetyBlocked { .. } | GuardError::Vision { .. } => Vec::new(),
        }
    }
}
