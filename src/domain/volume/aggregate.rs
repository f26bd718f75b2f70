//! Volume Context - Aggregate Root

use std::collections::{BTreeSet, HashMap};

use super::{AssetKey, Chapter, Illustration, VolumeError, VolumeId};
use crate::domain::segment_classifier::find_markers;

/// Volume 聚合根 - 一卷带插图的长篇文档
///
/// 不变量:
/// - asset_key 在卷内唯一
/// - 章节编号从 1 开始连续
/// - 创建后内容只读
#[derive(Debug, Clone)]
pub struct Volume {
    id: VolumeId,
    title: String,
    chapters: Vec<Chapter>,
    illustrations: Vec<Illustration>,
    index: HashMap<AssetKey, usize>,
}

impl Volume {
    pub fn new(
        id: VolumeId,
        title: impl Into<String>,
        chapters: Vec<Chapter>,
        illustrations: Vec<Illustration>,
    ) -> Result<Self, VolumeError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(VolumeError::InvalidTitle("标题不能为空".to_string()));
        }

        for (i, chapter) in chapters.iter().enumerate() {
            if chapter.number() != i + 1 {
                return Err(VolumeError::InvalidChapter(format!(
                    "第 {} 个章节的编号为 {}",
                    i + 1,
                    chapter.number()
                )));
            }
        }

        let mut index = HashMap::with_capacity(illustrations.len());
        for (i, illustration) in illustrations.iter().enumerate() {
            if index.insert(illustration.asset_key().clone(), i).is_some() {
                return Err(VolumeError::DuplicateAsset(illustration.asset_key().clone()));
            }
        }

        Ok(Self {
            id,
            title,
            chapters,
            illustrations,
            index,
        })
    }

    // Getters
    pub fn id(&self) -> &VolumeId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn chapter(&self, number: usize) -> Result<&Chapter, VolumeError> {
        number
            .checked_sub(1)
            .and_then(|i| self.chapters.get(i))
            .ok_or_else(|| VolumeError::ChapterNotFound {
                volume: self.id.clone(),
                chapter: number,
            })
    }

    pub fn illustrations(&self) -> &[Illustration] {
        &self.illustrations
    }

    pub fn illustration(&self, key: &AssetKey) -> Option<&Illustration> {
        self.index.get(key).map(|&i| &self.illustrations[i])
    }

    pub fn segment_count(&self) -> usize {
        self.chapters.iter().map(Chapter::segment_count).sum()
    }

    /// 文本中引用了、但清单里没有的插图标识
    pub fn dangling_markers(&self) -> BTreeSet<AssetKey> {
        self.chapters
            .iter()
            .flat_map(|c| c.segments())
            .flat_map(|s| find_markers(s.text()))
            .filter(|key| !self.index.contains_key(key))
            .collect()
    }
}
