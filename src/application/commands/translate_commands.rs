//! Translate Commands

use std::path::PathBuf;

/// 翻译整卷（或其中一章）
#[derive(Debug, Clone)]
pub struct TranslateVolume {
    pub volume_dir: PathBuf,
    pub output_dir: PathBuf,
    /// 只重跑失败/过期的片段，保留已存的 ok 结果
    pub only_failed: bool,
    /// 只翻译指定章节（从 1 开始）
    pub chapter: Option<usize>,
}
