//! File Storage - 文件系统卷读写实现
//!
//! 实现 VolumeSourcePort trait
//!
//! 输入目录:
//! ```text
//! <dir>/volume.toml
//! <dir>/<chapter file>...
//! <dir>/<illustration file>...
//! ```
//! 输出目录: `<output_dir>/<volume_id>/chapter_NNN.txt` 与 `report.json`

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{VolumeSourceError, VolumeSourcePort};
use crate::domain::segment_text;
use crate::domain::volume::{
    AssetKey, Chapter, Illustration, SourceSegment, Volume, VolumeError, VolumeId,
};
use crate::domain::SegmentConfig;

/// 清单文件名
pub const MANIFEST_FILE: &str = "volume.toml";

#[derive(Debug, Deserialize)]
struct Manifest {
    id: String,
    title: String,
    #[serde(default)]
    chapters: Vec<ChapterEntry>,
    #[serde(default)]
    illustrations: Vec<IllustrationEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    #[serde(default)]
    title: Option<String>,
    file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct IllustrationEntry {
    key: String,
    file: PathBuf,
    /// 未指定时按扩展名推断
    #[serde(default)]
    media_type: Option<String>,
}

/// 按扩展名推断图片类型
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn io_error(path: &Path, e: std::io::Error) -> VolumeSourceError {
    VolumeSourceError::IoError {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// 文件系统卷存储
pub struct FileVolumeStorage {
    segment_config: SegmentConfig,
}

impl FileVolumeStorage {
    pub fn new(segment_config: SegmentConfig) -> Self {
        Self { segment_config }
    }

    fn volume_output_dir(output_dir: &Path, volume_id: &VolumeId) -> PathBuf {
        output_dir.join(volume_id.as_str())
    }

    async fn read_chapter(
        &self,
        dir: &Path,
        number: usize,
        entry: &ChapterEntry,
    ) -> Result<Chapter, VolumeSourceError> {
        let path = dir.join(&entry.file);
        let text = fs::read_to_string(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        let segments = segment_text(&text, &self.segment_config)
            .into_iter()
            .enumerate()
            .map(|(index, text)| SourceSegment::new(index, text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VolumeError::InvalidChapter(format!("{}: {}", path.display(), e)))?;

        let title = entry
            .title
            .clone()
            .unwrap_or_else(|| format!("Chapter {}", number));
        Ok(Chapter::new(number, title, segments)
            .map_err(|e| VolumeError::InvalidChapter(format!("{}: {}", path.display(), e)))?)
    }

    async fn read_illustration(
        dir: &Path,
        entry: &IllustrationEntry,
    ) -> Result<Illustration, VolumeSourceError> {
        let key = AssetKey::new(entry.key.clone()).map_err(|e| {
            VolumeSourceError::ManifestError(format!("illustration key {:?}: {}", entry.key, e))
        })?;
        let path = dir.join(&entry.file);
        let bytes = fs::read(&path).await.map_err(|e| io_error(&path, e))?;
        let media_type = entry
            .media_type
            .clone()
            .unwrap_or_else(|| media_type_for(&path).to_string());
        Ok(Illustration::new(key, media_type, bytes))
    }
}

impl Default for FileVolumeStorage {
    fn default() -> Self {
        Self::new(SegmentConfig::default())
    }
}

#[async_trait]
impl VolumeSourcePort for FileVolumeStorage {
    async fn load(&self, dir: &Path) -> Result<Volume, VolumeSourceError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| io_error(&manifest_path, e))?;
        let manifest: Manifest = toml::from_str(&raw)
            .map_err(|e| VolumeSourceError::ManifestError(format!("{}: {}", manifest_path.display(), e)))?;

        let id = VolumeId::new(manifest.id.clone())
            .map_err(|e| VolumeError::InvalidId(format!("{:?}: {}", manifest.id, e)))?;

        let mut chapters = Vec::with_capacity(manifest.chapters.len());
        for (i, entry) in manifest.chapters.iter().enumerate() {
            chapters.push(self.read_chapter(dir, i + 1, entry).await?);
        }

        let mut illustrations = Vec::with_capacity(manifest.illustrations.len());
        for entry in &manifest.illustrations {
            illustrations.push(Self::read_illustration(dir, entry).await?);
        }

        let volume = Volume::new(id, manifest.title, chapters, illustrations)?;
        tracing::info!(
            volume_id = %volume.id(),
            chapters = volume.chapters().len(),
            segments = volume.segment_count(),
            illustrations = volume.illustrations().len(),
            "Volume loaded"
        );
        Ok(volume)
    }

    async fn write_chapter(
        &self,
        output_dir: &Path,
        volume_id: &VolumeId,
        chapter: usize,
        text: &str,
    ) -> Result<PathBuf, VolumeSourceError> {
        let dir = Self::volume_output_dir(output_dir, volume_id);
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

        let path = dir.join(format!("chapter_{:03}.txt", chapter));
        fs::write(&path, text).await.map_err(|e| io_error(&path, e))?;

        tracing::debug!(path = %path.display(), bytes = text.len(), "Chapter written");
        Ok(path)
    }

    async fn write_report(
        &self,
        output_dir: &Path,
        volume_id: &VolumeId,
        report: &serde_json::Value,
    ) -> Result<PathBuf, VolumeSourceError> {
        let dir = Self::volume_output_dir(output_dir, volume_id);
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

        let path = dir.join("report.json");
        let body = serde_json::to_vec_pretty(report)
            .map_err(|e| VolumeSourceError::ManifestError(e.to_string()))?;
        fs::write(&path, body).await.map_err(|e| io_error(&path, e))?;
        Ok(path)
    }
}
