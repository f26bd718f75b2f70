//! Generation Adapter - 生成层客户端实现

mod fake_generation_client;
mod http_generation_client;

pub use fake_generation_client::{FakeGenerationClient, FakeGenerationClientConfig};
pub use http_generation_client::*;
