//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（视觉层、生成层、缓存、结果存储、审计日志、卷读写）
//! - guard: 模型调用护栏（安全拒绝降级、分析泄露检测、瞬时错误重试）
//! - orchestration: 双层编排器与提示构建
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod guard;
pub mod orchestration;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    handlers::{
        ChapterReport, PrecomputeConfig, PrecomputeReport, PrecomputeVisualCacheHandler,
        TranslateVolumeHandler, TranslationReport, ANALYSIS_INSTRUCTION,
    },
    PrecomputeVisualCache, TranslateVolume,
};

pub use error::ApplicationError;

pub use guard::{GuardError, LeakGuard, RetryPolicy, SafetyGuard};

pub use orchestration::{DualTierOrchestrator, OrchestratorConfig, OrchestratorError, PromptBuilder};

pub use ports::{
    // Audit log
    AuditEntry,
    AuditError,
    AuditLogPort,
    // Generation tier
    GenerationEnginePort,
    GenerationError,
    GenerationRequest,
    GenerationResponse,
    // Result store
    StoreError,
    TranslationStorePort,
    // Vision tier
    VisionEnginePort,
    VisionError,
    VisionRequest,
    // Visual cache
    CacheEntry,
    CacheError,
    CacheStats,
    VisualCacheFactory,
    VisualCachePort,
    // Volume source
    VolumeSourceError,
    VolumeSourcePort,
};

pub use queries::{
    handlers::{GetVolumeStatusHandler, VolumeStatus},
    GetVolumeStatus,
};
