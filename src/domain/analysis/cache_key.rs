//! Analysis Context - CacheKey

use serde::{Deserialize, Serialize};

use crate::domain::volume::Fingerprint;

/// 视觉缓存键
///
/// 三个字段全部相等时两个键才相等：
/// - content_fingerprint: 图像字节的指纹
/// - prompt_fingerprint: 分析指令原文的指纹
/// - model_version: 视觉层模型版本字符串
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub content_fingerprint: Fingerprint,
    pub prompt_fingerprint: Fingerprint,
    pub model_version: String,
}

impl CacheKey {
    pub fn new(
        content_fingerprint: Fingerprint,
        prompt_fingerprint: Fingerprint,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            content_fingerprint,
            prompt_fingerprint,
            model_version: model_version.into(),
        }
    }

    /// 紧凑表示，用于日志与审计
    pub fn short(&self) -> String {
        let head = |fp: &Fingerprint| fp.as_str().chars().take(8).collect::<String>();
        format!(
            "{}:{}:{}",
            head(&self.content_fingerprint),
            head(&self.prompt_fingerprint),
            self.model_version
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.content_fingerprint, self.prompt_fingerprint, self.model_version
        )
    }
}
