//! 应用层 - 查询（读操作）
//!
//! CQRS 查询侧：处理所有读操作

mod status_queries;

pub mod handlers;

pub use status_queries::*;
