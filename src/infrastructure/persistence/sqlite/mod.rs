//! SQLite Persistence - SQLite 数据库持久化实现

mod audit_repo;
mod database;

pub use audit_repo::*;
pub use database::*;
