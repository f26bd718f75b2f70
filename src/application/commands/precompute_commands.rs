//! Precompute Commands

use std::path::PathBuf;

/// 预计算整卷插图的视觉分析
#[derive(Debug, Clone)]
pub struct PrecomputeVisualCache {
    pub volume_dir: PathBuf,
}
