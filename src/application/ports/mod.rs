//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audit_log;
mod generation_engine;
mod translation_store;
mod vision_engine;
mod visual_cache;
mod volume_source;

pub use audit_log::{AuditEntry, AuditError, AuditLogPort};
pub use generation_engine::{
    GenerationEnginePort, GenerationError, GenerationRequest, GenerationResponse,
};
pub use translation_store::{StoreError, TranslationStorePort};
pub use vision_engine::{VisionEnginePort, VisionError, VisionRequest};
pub use visual_cache::{
    record_age_days, CacheEntry, CacheError, CacheStats, VisualCacheFactory, VisualCachePort,
};
pub use volume_source::{VolumeSourceError, VolumeSourcePort};
