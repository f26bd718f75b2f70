//! Orchestration - 双层编排
//!
//! - orchestrator: 并发的 STANDARD 层与有序的视觉通道
//! - prompt: 按片段标签构建生成层提示
//! - NarrativeState: 视觉通道内跨片段携带的叙事状态

mod orchestrator;
mod prompt;

pub use orchestrator::{DualTierOrchestrator, OrchestratorConfig, OrchestratorError, VisualLane};
pub use prompt::{PromptBuilder, DEFAULT_SYSTEM_PROMPT};

use std::collections::BTreeSet;

use crate::domain::segment_classifier::{find_markers, ClassifiedSegment, Passage, SegmentTag};
use crate::domain::volume::AssetKey;

/// 视觉通道的叙事状态
///
/// - revealed: 已经到达过的插图，之后的前瞻片段不再需要隐藏其剧透条目
/// - previous: 通道内上一段正文，作为连续性参考
#[derive(Debug, Clone, Default)]
pub struct NarrativeState {
    revealed: BTreeSet<AssetKey>,
    previous: Option<String>,
}

impl NarrativeState {
    pub fn previous_passage(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn is_revealed(&self, key: &AssetKey) -> bool {
        self.revealed.contains(key)
    }

    /// 片段处理完成后推进状态
    pub fn advance(&mut self, segment: &ClassifiedSegment, passage: &Passage) {
        if segment.tag == SegmentTag::Direct {
            self.revealed.extend(find_markers(&segment.text));
            if let Some(key) = &segment.asset_key {
                self.revealed.insert(key.clone());
            }
        }
        if !passage.prose.is_empty() {
            self.previous = Some(passage.prose.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment_classifier::ReasoningDepth;

    fn direct(text: &str, key: &str) -> ClassifiedSegment {
        ClassifiedSegment {
            chapter: 1,
            index: 0,
            text: text.to_string(),
            tag: SegmentTag::Direct,
            asset_key: Some(AssetKey::new(key).unwrap()),
            lookahead_key: None,
            lookahead_distance: None,
            depth: ReasoningDepth::Deep,
        }
    }

    #[test]
    fn test_direct_segment_reveals_all_its_markers() {
        let mut state = NarrativeState::default();
        let seg = direct("[[illustration:a]] 本文 [[illustration:b]]", "a");
        state.advance(&seg, &Passage::parse(&seg.text));

        assert!(state.is_revealed(&AssetKey::new("a").unwrap()));
        assert!(state.is_revealed(&AssetKey::new("b").unwrap()));
        assert_eq!(state.previous_passage(), Some("本文"));
    }

    #[test]
    fn test_marker_only_segment_keeps_previous_passage() {
        let mut state = NarrativeState::default();
        let first = direct("前の文。", "a");
        state.advance(&first, &Passage::parse(&first.text));
        let marker = direct("[[illustration:c]]", "c");
        state.advance(&marker, &Passage::parse(&marker.text));

        assert_eq!(state.previous_passage(), Some("前の文。"));
        assert!(state.is_revealed(&AssetKey::new("c").unwrap()));
    }
}
