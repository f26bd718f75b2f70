//! Persistence Layer - 数据持久化
//!
//! - JSON: 视觉分析缓存（每卷一个文档）
//! - Sled: 翻译结果
//! - SQLite: 审计日志

pub mod json;
pub mod sled;
pub mod sqlite;

pub use self::json::{JsonVisualCache, JsonVisualCacheFactory};
pub use self::sled::SledTranslationStore;
pub use self::sqlite::SqliteAuditLog;
