//! Volume Context - Errors

use thiserror::Error;

use super::{AssetKey, VolumeId};

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("无效的卷 ID: {0}")]
    InvalidId(String),

    #[error("无效的标题: {0}")]
    InvalidTitle(String),

    #[error("插图标识重复: {0}")]
    DuplicateAsset(AssetKey),

    #[error("章节不存在: {volume} 第 {chapter} 章")]
    ChapterNotFound { volume: VolumeId, chapter: usize },

    #[error("无效的章节: {0}")]
    InvalidChapter(String),
}
