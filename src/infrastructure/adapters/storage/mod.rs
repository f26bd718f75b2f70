//! Storage Adapter - 卷目录读写

mod file_storage;

pub use file_storage::{media_type_for, FileVolumeStorage, MANIFEST_FILE};
