//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Volume Context: 卷、章节、插图
//! - Analysis Context: 视觉分析记录与缓存失效规则
//!
//! 以及纯函数组件：文本分割、片段分类、分析泄露检测

pub mod analysis;
pub mod volume;

pub mod leak_detector;
pub mod segment_classifier;
pub mod translation;

// 共享的文本分割器
mod text_segmenter;

pub use leak_detector::{detect_leak, LeakSignal};
pub use segment_classifier::{
    classify, ClassifiedSegment, Passage, ReasoningDepth, SegmentTag, DEFAULT_LOOKAHEAD_WINDOW,
};
pub use text_segmenter::{segment_text, segment_text_default, SegmentConfig};
pub use translation::{GuardFlag, SegmentStatus, TranslationResult};
