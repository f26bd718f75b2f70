//! Vision Engine Port - 视觉分析层抽象
//!
//! 慢速、支持图像的模型层：图像 + 分析指令 -> 结构化分析或安全拒绝

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::analysis::VisualAnalysis;
use crate::domain::volume::AssetKey;

/// Vision 错误
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 5xx
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    /// 内容策略拒绝，永不重试
    #[error("Safety refusal: {0}")]
    SafetyRefusal(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl VisionError {
    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VisionError::NetworkError(_)
                | VisionError::Timeout
                | VisionError::RateLimited(_)
                | VisionError::ServiceUnavailable(_)
        )
    }
}

/// 视觉分析请求
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// 用于日志和追踪
    pub asset_key: AssetKey,
    pub media_type: String,
    pub image: Arc<[u8]>,
    /// 分析指令原文（其指纹进入 CacheKey）
    pub instruction: String,
}

/// Vision Engine Port
#[async_trait]
pub trait VisionEnginePort: Send + Sync {
    /// 分析一张插图
    async fn analyze(&self, request: VisionRequest) -> Result<VisualAnalysis, VisionError>;

    /// 模型版本字符串（进入 CacheKey）
    fn model_version(&self) -> &str;
}
