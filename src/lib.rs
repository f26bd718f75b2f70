//! Illustra - 插图长篇文档的双层翻译系统
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Volume Context: 卷、章节、插图
//! - Analysis Context: 缓存键、分析记录、失效规则
//! - 片段分类器（前瞻缓冲）、泄露检测、翻译结果
//!
//! 应用层 (application/):
//! - Ports: 端口定义（VisionEngine, GenerationEngine, VisualCache, TranslationStore, AuditLog, VolumeSource）
//! - Guard: 安全拒绝降级 + 分析泄露重试 + 指数退避
//! - Orchestration: 双层编排器（并发 STANDARD 层 + 有序视觉通道）
//! - Commands: 预计算视觉缓存、翻译整卷
//! - Queries: 卷状态
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: OpenAI 兼容的视觉/生成客户端、Fake 客户端、卷目录读写
//! - Persistence: JSON 视觉缓存 + Sled 结果存储 + SQLite 审计日志
//! - Memory: 内存版结果存储与审计日志

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
