//! Sled Persistence - 翻译结果存储

mod result_store;

pub use result_store::{SledStoreConfig, SledTranslationStore};
