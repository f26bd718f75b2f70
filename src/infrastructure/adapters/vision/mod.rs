//! Vision Adapter - 视觉层客户端实现

mod fake_vision_client;
mod http_vision_client;

pub use fake_vision_client::{FakeVisionClient, FakeVisionClientConfig};
pub use http_vision_client::*;
