//! Volume Context - Entities

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AssetKey, Fingerprint};

/// 插图 - 不可变的图像资源
///
/// 不变量:
/// - fingerprint 始终由 bytes 计算得出
/// - 创建后不可修改（核心只读）
#[derive(Debug, Clone)]
pub struct Illustration {
    asset_key: AssetKey,
    fingerprint: Fingerprint,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl Illustration {
    pub fn new(asset_key: AssetKey, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::of_bytes(&bytes);
        Self {
            asset_key,
            fingerprint,
            media_type: media_type.into(),
            bytes: Arc::from(bytes),
        }
    }

    pub fn asset_key(&self) -> &AssetKey {
        &self.asset_key
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// 共享的图像字节，克隆开销为引用计数
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// 源文本片段 - 最小翻译单位
///
/// 不变量:
/// - index 在章节内唯一且有序（从 0 开始）
/// - text 不可为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSegment {
    index: usize,
    text: String,
}

impl SourceSegment {
    pub fn new(index: usize, text: impl Into<String>) -> Result<Self, &'static str> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err("片段内容不能为空");
        }
        Ok(Self { index, text })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_text(&self.text)
    }
}

/// 章节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// 章节编号（从 1 开始，按清单顺序）
    number: usize,
    title: String,
    segments: Vec<SourceSegment>,
}

impl Chapter {
    pub fn new(number: usize, title: impl Into<String>, segments: Vec<SourceSegment>) -> Result<Self, &'static str> {
        if number == 0 {
            return Err("章节编号从 1 开始");
        }
        if segments.iter().enumerate().any(|(i, s)| s.index() != i) {
            return Err("片段索引必须从 0 开始连续递增");
        }
        Ok(Self {
            number,
            title: title.into(),
            segments,
        })
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn segments(&self) -> &[SourceSegment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&SourceSegment> {
        self.segments.get(index)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illustration_fingerprint_follows_bytes() {
        let key = AssetKey::new("img-001").unwrap();
        let a = Illustration::new(key.clone(), "image/png", vec![1, 2, 3]);
        let b = Illustration::new(key, "image/png", vec![1, 2, 4]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.size_bytes(), 3);
    }

    #[test]
    fn test_chapter_requires_contiguous_indices() {
        let ok = vec![
            SourceSegment::new(0, "a").unwrap(),
            SourceSegment::new(1, "b").unwrap(),
        ];
        assert!(Chapter::new(1, "One", ok).is_ok());

        let gap = vec![
            SourceSegment::new(0, "a").unwrap(),
            SourceSegment::new(2, "b").unwrap(),
        ];
        assert!(Chapter::new(1, "One", gap).is_err());
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(SourceSegment::new(0, "   ").is_err());
    }
}
