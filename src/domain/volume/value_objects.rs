//! Volume Context - Value Objects

use serde::{Deserialize, Serialize};

/// 卷唯一标识（来自 volume.toml 的 id 字段）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(id: impl Into<String>) -> Result<Self, &'static str> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("卷 ID 不能为空");
        }
        if id.contains(['/', '\\', ':']) {
            return Err("卷 ID 不能包含路径分隔符或冒号");
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 插图的稳定标识
///
/// 在同一卷内唯一，文本中的插图标记通过它引用插图
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Result<Self, &'static str> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err("插图标识不能为空");
        }
        if trimmed.contains(']') || trimmed.contains('[') {
            return Err("插图标识不能包含方括号");
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 内容指纹（md5 十六进制）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 计算字节内容的指纹
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", md5::compute(bytes)))
    }

    /// 计算文本的指纹（用于分析指令与源文本）
    pub fn of_text(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// 从已有的十六进制字符串构造（读取持久化数据时使用）
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 章节内片段的全局定位：(章节号, 片段索引)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId {
    pub chapter: usize,
    pub index: usize,
}

impl SegmentId {
    pub fn new(chapter: usize, index: usize) -> Self {
        Self { chapter, index }
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}#{}", self.chapter, self.index)
    }
}
