//! Volume Context - 卷限界上下文
//!
//! 职责:
//! - 卷聚合（章节 + 插图）
//! - 源文本片段实体
//! - 插图资源与内容指纹

mod aggregate;
mod entities;
mod errors;
mod value_objects;

pub use aggregate::Volume;
pub use entities::{Chapter, Illustration, SourceSegment};
pub use errors::VolumeError;
pub use value_objects::{AssetKey, Fingerprint, SegmentId, VolumeId};
