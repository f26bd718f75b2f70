//! JSON Visual Cache - 每卷一个 JSON 文档的视觉分析缓存
//!
//! 文件: `<cache_dir>/<volume_id>.json`
//! ```json
//! {
//!   "version": 1,
//!   "volume_id": "vol-01",
//!   "entries": {
//!     "img-001": {
//!       "content_fingerprint": "…", "prompt_fingerprint": "…", "model_version": "…",
//!       "composition": "…", "directives": ["…"], "status": "ok", "generated_at": "…"
//!     }
//!   }
//! }
//! ```
//!
//! - 单个条目无法解析时按缺失处理，原文保留到该 asset_key 被重新写入
//! - 整个文件不是合法 JSON 时拒绝打开，不覆盖
//! - 写入: 临时文件 + rename，所有写入经同一把锁串行

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::ports::{
    CacheEntry, CacheError, CacheStats, VisualCacheFactory, VisualCachePort,
};
use crate::domain::analysis::{
    AnalysisRecord, CacheKey, Freshness, InvalidationPolicy,
};
use crate::domain::volume::{AssetKey, VolumeId};

/// 文件格式版本
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// 单个条目的落盘形式（CacheKey 与 AnalysisRecord 字段平铺，便于手工编辑）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    #[serde(flatten)]
    key: CacheKey,
    #[serde(flatten)]
    record: AnalysisRecord,
}

#[derive(Debug, Serialize)]
struct CacheDocument<'a> {
    version: u32,
    volume_id: &'a str,
    entries: BTreeMap<String, serde_json::Value>,
}

fn io_error(path: &Path, e: std::io::Error) -> CacheError {
    CacheError::IoError(format!("{}: {}", path.display(), e))
}

/// JSON 视觉缓存（单卷）
pub struct JsonVisualCache {
    path: PathBuf,
    volume_id: VolumeId,
    policy: InvalidationPolicy,
    entries: DashMap<AssetKey, CacheEntry>,
    /// 无法解析的条目原文，按缺失处理
    corrupt: DashMap<String, serde_json::Value>,
    write_lock: Mutex<()>,
}

impl JsonVisualCache {
    /// 打开缓存文件；不存在时为空缓存（首次写入时创建）
    pub async fn open(
        path: impl Into<PathBuf>,
        volume_id: VolumeId,
        policy: InvalidationPolicy,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        let cache = Self {
            path,
            volume_id,
            policy,
            entries: DashMap::new(),
            corrupt: DashMap::new(),
            write_lock: Mutex::new(()),
        };

        match tokio::fs::read_to_string(&cache.path).await {
            Ok(raw) => cache.load_document(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %cache.path.display(), "Visual cache file not found, starting empty");
            }
            Err(e) => return Err(io_error(&cache.path, e)),
        }

        tracing::info!(
            path = %cache.path.display(),
            volume_id = %cache.volume_id,
            entries = cache.entries.len(),
            corrupt = cache.corrupt.len(),
            "JsonVisualCache opened"
        );
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt_file(&self, reason: impl Into<String>) -> CacheError {
        CacheError::Corrupt {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    fn load_document(&self, raw: &str) -> Result<(), CacheError> {
        let document: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| self.corrupt_file(e.to_string()))?;

        let entries = document
            .get("entries")
            .and_then(|e| e.as_object())
            .ok_or_else(|| self.corrupt_file("missing \"entries\" object"))?;

        for (raw_key, value) in entries {
            let parsed = AssetKey::new(raw_key.clone())
                .map_err(|e| e.to_string())
                .and_then(|asset_key| {
                    serde_json::from_value::<StoredEntry>(value.clone())
                        .map(|stored| (asset_key, stored))
                        .map_err(|e| e.to_string())
                });

            match parsed {
                Ok((asset_key, stored)) => {
                    let entry = CacheEntry {
                        asset_key: asset_key.clone(),
                        key: stored.key,
                        record: stored.record.normalized(),
                    };
                    self.entries.insert(asset_key, entry);
                }
                Err(reason) => {
                    tracing::warn!(
                        asset_key = %raw_key,
                        reason = %reason,
                        "Corrupt visual cache entry, treating as missing"
                    );
                    self.corrupt.insert(raw_key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// 序列化快照（含尚未替换的损坏条目；pending 的键由新条目取代）
    fn snapshot(&self, pending: &CacheEntry) -> Result<Vec<u8>, CacheError> {
        let mut entries = BTreeMap::new();

        for item in self.corrupt.iter() {
            if item.key() == pending.asset_key.as_str() {
                continue;
            }
            entries.insert(item.key().clone(), item.value().clone());
        }
        for item in self.entries.iter() {
            let value = Self::entry_value(item.value())?;
            entries.insert(item.key().to_string(), value);
        }
        entries.insert(pending.asset_key.to_string(), Self::entry_value(pending)?);

        let document = CacheDocument {
            version: CACHE_FORMAT_VERSION,
            volume_id: self.volume_id.as_str(),
            entries,
        };
        serde_json::to_vec_pretty(&document)
            .map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    fn entry_value(entry: &CacheEntry) -> Result<serde_json::Value, CacheError> {
        serde_json::to_value(StoredEntry {
            key: entry.key.clone(),
            record: entry.record.clone(),
        })
        .map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))
    }
}

#[async_trait]
impl VisualCachePort for JsonVisualCache {
    async fn entry(&self, asset_key: &AssetKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(asset_key).map(|e| e.value().clone()))
    }

    async fn put(
        &self,
        asset_key: &AssetKey,
        key: CacheKey,
        record: AnalysisRecord,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            asset_key: asset_key.clone(),
            key,
            record: record.normalized(),
        };

        let _guard = self.write_lock.lock().await;
        let bytes = self.snapshot(&entry)?;
        self.write_atomic(&bytes).await?;
        // 落盘成功后才对读者可见，损坏原文也在此时才丢弃
        self.corrupt.remove(asset_key.as_str());
        self.entries.insert(asset_key.clone(), entry);

        tracing::debug!(asset_key = %asset_key, bytes = bytes.len(), "Visual cache entry written");
        Ok(())
    }

    async fn evaluate(
        &self,
        asset_key: &AssetKey,
        candidate: &CacheKey,
    ) -> Result<Freshness, CacheError> {
        let stored = self.entries.get(asset_key).map(|e| e.value().clone());
        Ok(self.policy.evaluate(
            stored.as_ref().map(|e| (&e.key, &e.record)),
            candidate,
            Utc::now(),
        ))
    }

    async fn find_reusable(&self, candidate: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let now = Utc::now();
        let found = self.entries.iter().find_map(|item| {
            let entry = item.value();
            let reusable = entry.key == *candidate
                && !entry.record.is_safety_blocked()
                && !entry.record.is_manual_override()
                && self.policy.evaluate(Some((&entry.key, &entry.record)), candidate, now)
                    == Freshness::Fresh;
            reusable.then(|| entry.clone())
        });
        Ok(found)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries: Vec<CacheEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.asset_key.cmp(&b.asset_key));
        Ok(entries)
    }

    async fn stats(&self) -> CacheStats {
        let entries: Vec<CacheEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        CacheStats::from_entries(&entries, self.corrupt.len())
    }
}

/// 按卷打开 JSON 缓存
pub struct JsonVisualCacheFactory {
    dir: PathBuf,
    policy: InvalidationPolicy,
}

impl JsonVisualCacheFactory {
    pub fn new(dir: impl Into<PathBuf>, policy: InvalidationPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn path_for(&self, volume_id: &VolumeId) -> PathBuf {
        self.dir.join(format!("{}.json", volume_id))
    }
}

#[async_trait]
impl VisualCacheFactory for JsonVisualCacheFactory {
    async fn open(&self, volume_id: &VolumeId) -> Result<Arc<dyn VisualCachePort>, CacheError> {
        let cache =
            JsonVisualCache::open(self.path_for(volume_id), volume_id.clone(), self.policy).await?;
        Ok(Arc::new(cache))
    }
}
