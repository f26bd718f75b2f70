//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use std::collections::BTreeSet;

use thiserror::Error;

use crate::application::guard::GuardError;
use crate::application::orchestration::OrchestratorError;
use crate::application::ports::{AuditError, CacheError, StoreError, VolumeSourceError};
use crate::domain::volume::{AssetKey, VolumeError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 文本引用的插图在缓存中没有记录（需先执行 precompute）
    #[error("Missing visual context for {} asset key(s): {}; run precompute first", keys.len(), join_keys(keys))]
    MissingVisualContext { keys: BTreeSet<AssetKey> },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 卷加载/写出错误
    #[error("Volume source error: {0}")]
    VolumeSource(#[from] VolumeSourceError),

    /// 领域错误
    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    /// 视觉缓存错误
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// 结果存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 审计日志错误
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    /// 外部服务错误
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 编排错误
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestratorError),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

fn join_keys(keys: &BTreeSet<AssetKey>) -> String {
    keys.iter()
        .map(AssetKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApplicationError {
    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<GuardError> for ApplicationError {
    fn from(err: GuardError) -> Self {
        Self::ExternalServiceError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_context_lists_keys() {
        let keys: BTreeSet<AssetKey> = ["b", "a"]
            .into_iter()
            .map(|k| AssetKey::new(k).unwrap())
            .collect();
        let err = ApplicationError::MissingVisualContext { keys };
        assert_eq!(
            err.to_string(),
            "Missing visual context for 2 asset key(s): a, b; run precompute first"
        );
    }
}
