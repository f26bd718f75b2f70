//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod precompute_handlers;
mod translate_handlers;

pub use precompute_handlers::*;
pub use translate_handlers::*;
