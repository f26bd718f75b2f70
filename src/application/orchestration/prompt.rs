//! 生成层提示构建
//!
//! - STANDARD: 只有正文
//! - DIRECT: 构图、情绪变化、观察细节、指令、剧透清单（插图已到达）
//! - LOOKAHEAD: 只给语气（情绪变化 + 指令），剧透条目及引用剧透的指令都不发送

use crate::application::ports::GenerationRequest;
use crate::domain::analysis::AnalysisRecord;
use crate::domain::segment_classifier::{ClassifiedSegment, Passage, SegmentTag};

use super::NarrativeState;

/// 默认系统指令，`{language}` 替换为目标语言
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a literary translator working on an illustrated novel. \
Translate the passage into {language}. Preserve paragraph breaks, dialogue punctuation and tone. \
Use the illustration notes only to inform word choice and mood. \
Output only the translated passage.";

const LOOKAHEAD_CAUTION: &str =
    "Do not anticipate or reveal anything the upcoming illustration shows.";

/// 提示构建器
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
}

impl PromptBuilder {
    pub fn new(target_language: &str) -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.replace("{language}", target_language),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// 构建生成请求；context 为该片段对应插图的缓存记录
    pub fn build(
        &self,
        segment: &ClassifiedSegment,
        passage: &Passage,
        context: Option<&AnalysisRecord>,
        state: Option<&NarrativeState>,
    ) -> GenerationRequest {
        let mut sections = Vec::new();

        if let Some(previous) = state.and_then(|s| s.previous_passage()) {
            sections.push(format!("Previous passage (for continuity, do not translate):\n{}", previous));
        }

        match (segment.tag, context) {
            (SegmentTag::Direct, Some(record)) => sections.push(direct_block(segment, record)),
            (SegmentTag::Lookahead, Some(record)) => {
                let revealed = segment
                    .lookahead_key
                    .as_ref()
                    .zip(state)
                    .is_some_and(|(key, s)| s.is_revealed(key));
                sections.push(lookahead_block(segment, record, revealed));
            }
            _ => {}
        }

        sections.push(format!("Passage:\n{}", passage.prose));

        GenerationRequest {
            system: self.system.clone(),
            prompt: sections.join("\n\n"),
            passage: passage.prose.clone(),
            depth: segment.depth,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("English")
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn direct_block(segment: &ClassifiedSegment, record: &AnalysisRecord) -> String {
    let mut lines = vec![format!(
        "Illustration notes ({}):",
        segment
            .asset_key
            .as_ref()
            .map(|k| k.as_str())
            .unwrap_or("illustration")
    )];

    if !record.composition.is_empty() {
        lines.push(format!("Composition: {}", record.composition));
    }
    if !record.emotional_delta.is_empty() {
        lines.push(format!("Emotional shift: {}", record.emotional_delta));
    }
    if !record.observed_details.is_empty() {
        lines.push("Observed details:".to_string());
        for (name, detail) in &record.observed_details {
            lines.push(format!("- {}: {}", name, detail));
        }
    }
    lines.push("Directives:".to_string());
    lines.push(bullet_list(&record.directives));
    if !record.spoiler_prevention.is_empty() {
        lines.push("Revealed by this illustration (may now be stated):".to_string());
        lines.push(bullet_list(&record.spoiler_prevention));
    }
    lines.join("\n")
}

fn lookahead_block(segment: &ClassifiedSegment, record: &AnalysisRecord, revealed: bool) -> String {
    let distance = segment.lookahead_distance.unwrap_or(1);
    let mut lines = vec![format!(
        "An illustration appears {} segment(s) ahead. Tone guidance:",
        distance
    )];

    let safe = |text: &str| revealed || !record.directive_reveals_spoiler(text);

    if !record.emotional_delta.is_empty() && safe(&record.emotional_delta) {
        lines.push(format!("Emotional shift: {}", record.emotional_delta));
    }

    let directives: Vec<String> = record
        .directives
        .iter()
        .filter(|d| safe(d))
        .cloned()
        .collect();
    if !directives.is_empty() {
        lines.push("Directives:".to_string());
        lines.push(bullet_list(&directives));
    }

    if !revealed {
        lines.push(LOOKAHEAD_CAUTION.to_string());
    }
    lines.join("\n")
}
