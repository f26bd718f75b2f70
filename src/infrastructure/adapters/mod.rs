//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub(crate) mod chat_completion;
pub mod generation;
pub mod storage;
pub mod vision;

pub use generation::*;
pub use storage::*;
pub use vision::*;
