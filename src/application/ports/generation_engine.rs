//! Generation Engine Port - 快速文本生成层抽象
//!
//! 只接收文本，从不接收图像

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::segment_classifier::ReasoningDepth;

/// Generation 错误
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::NetworkError(_)
                | GenerationError::Timeout
                | GenerationError::RateLimited(_)
                | GenerationError::ServiceUnavailable(_)
        )
    }
}

/// 生成请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 系统指令
    pub system: String,
    /// 用户消息（上下文 + 待翻译正文）
    pub prompt: String,
    /// 正文本身，不含上下文
    pub passage: String,
    pub depth: ReasoningDepth,
}

/// 生成响应
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    /// 模型返回的推理过程（若有）
    pub reasoning: Option<String>,
}

/// Generation Engine Port
#[async_trait]
pub trait GenerationEnginePort: Send + Sync {
    async fn generate(&self, request: GenerationRequest)
        -> Result<GenerationResponse, GenerationError>;
}
