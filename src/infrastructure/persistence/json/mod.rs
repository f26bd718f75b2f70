//! JSON Persistence - 可手工编辑的视觉分析缓存

mod visual_cache;

pub use visual_cache::{JsonVisualCache, JsonVisualCacheFactory, CACHE_FORMAT_VERSION};
