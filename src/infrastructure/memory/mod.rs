//! In-Memory Implementations
//!
//! 离线运行和测试使用的内存实现

mod audit_log;
mod translation_store;

pub use audit_log::InMemoryAuditLog;
pub use translation_store::InMemoryTranslationStore;
