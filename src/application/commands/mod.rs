//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：预计算视觉缓存、翻译整卷

mod precompute_commands;
mod translate_commands;

pub mod handlers;

pub use precompute_commands::*;
pub use translate_commands::*;
