//! Status Queries

use std::path::PathBuf;

/// 查询卷的缓存与翻译进度
#[derive(Debug, Clone)]
pub struct GetVolumeStatus {
    pub volume_dir: PathBuf,
    /// 指定章节时附带该章的逐片段审计记录
    pub chapter: Option<usize>,
}
