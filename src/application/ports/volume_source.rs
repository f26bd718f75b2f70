//! Volume Source Port - 卷的读入与译文写出
//!
//! 卷目录的摄入（volume.toml + 章节文本 + 图片）与输出目录的写入

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::volume::{Volume, VolumeError, VolumeId};

#[derive(Debug, Error)]
pub enum VolumeSourceError {
    #[error("Manifest error: {0}")]
    ManifestError(String),

    #[error("IO error: {path}: {reason}")]
    IoError { path: String, reason: String },

    #[error(transparent)]
    Domain(#[from] VolumeError),
}

#[async_trait]
pub trait VolumeSourcePort: Send + Sync {
    /// 读取卷目录
    async fn load(&self, dir: &Path) -> Result<Volume, VolumeSourceError>;

    /// 写出一章译文，返回文件路径
    async fn write_chapter(
        &self,
        output_dir: &Path,
        volume_id: &VolumeId,
        chapter: usize,
        text: &str,
    ) -> Result<PathBuf, VolumeSourceError>;

    /// 写出 report.json
    async fn write_report(
        &self,
        output_dir: &Path,
        volume_id: &VolumeId,
        report: &serde_json::Value,
    ) -> Result<PathBuf, VolumeSourceError>;
}
