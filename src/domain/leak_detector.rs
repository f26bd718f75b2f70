//! 分析泄露检测
//!
//! 生成层有时会输出"我将如何翻译"之类的计划/评论，而不是译文。
//! 只检查输出开头的几行：
//! - 以序数/元叙述短语开头（"First, I will…"、"Here's my approach…"）
//! - 或开头几行完全没有叙事标点（引号、破折号、斜体标记），
//!   且源文开头几行本身含有这些标点

/// 检查的开头行数
pub const INSPECTED_LINES: usize = 3;

/// 元叙述前缀（小写比较）
const META_PREFIXES: &[&str] = &[
    "here's my",
    "here is my",
    "here's the translation",
    "here is the translation",
    "here's a translation",
    "here is a translation",
    "i will translate",
    "i'll translate",
    "i will now",
    "i'll now",
    "i'll start",
    "i will start",
    "let me ",
    "let's translate",
    "my approach",
    "to translate this",
    "translation notes",
    "translator's note",
    "note:",
    "notes:",
    "analysis:",
    "approach:",
    "plan:",
    "thinking:",
    "step 1",
    "okay, so",
    "sure, here",
    "sure! here",
    "certainly",
];

/// 序数词，后接第一人称时视为计划陈述
const ORDINALS: &[&str] = &["first", "second", "third", "next", "then", "finally", "lastly", "1.", "2.", "3."];

/// 第一人称计划短语
const FIRST_PERSON: &[&str] = &["i will", "i'll", "i need", "i should", "i am going", "i'm going", "let me", "we will", "we'll"];

/// 叙事标点
const NARRATIVE_MARKS: &[char] = &[
    '"', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '「', '」', '『', '』', '—', '―', '*', '_',
];

/// 泄露信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeakSignal {
    /// 输出为空
    EmptyOutput,
    /// 某行以元叙述开头
    MetaPhrasing { line: String },
    /// 源文有叙事标点而译文开头完全没有
    MissingNarrativeMarks,
}

impl LeakSignal {
    pub fn describe(&self) -> String {
        match self {
            LeakSignal::EmptyOutput => "empty output".to_string(),
            LeakSignal::MetaPhrasing { line } => format!("meta phrasing: {}", preview(line, 80)),
            LeakSignal::MissingNarrativeMarks => "narrative punctuation missing".to_string(),
        }
    }
}

fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push('…');
    }
    out
}

fn initial_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(INSPECTED_LINES)
        .collect()
}

/// 去掉列表符号、标题符号等结构前缀
fn strip_structure(line: &str) -> &str {
    line.trim_start_matches(|c: char| matches!(c, '#' | '-' | '>' | '•') || c.is_whitespace())
        .trim_start_matches("**")
        .trim_start()
}

fn is_meta_line(line: &str) -> bool {
    let lowered = strip_structure(line).to_lowercase();

    if META_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return true;
    }

    ORDINALS.iter().any(|ordinal| {
        lowered
            .strip_prefix(ordinal)
            .map(|rest| rest.trim_start_matches([',', ':', ' ']))
            .map(|rest| FIRST_PERSON.iter().any(|fp| rest.starts_with(fp)))
            .unwrap_or(false)
    })
}

fn has_narrative_marks(lines: &[&str]) -> bool {
    lines.iter().any(|l| l.contains(NARRATIVE_MARKS))
}

/// 检测生成层输出是否为评论而非译文
pub fn detect_leak(output: &str, source: &str) -> Option<LeakSignal> {
    let lines = initial_lines(output);
    if lines.is_empty() {
        return Some(LeakSignal::EmptyOutput);
    }

    if let Some(line) = lines.iter().find(|l| is_meta_line(l)) {
        return Some(LeakSignal::MetaPhrasing {
            line: line.to_string(),
        });
    }

    let source_lines = initial_lines(source);
    if has_narrative_marks(&source_lines) && !has_narrative_marks(&lines) {
        return Some(LeakSignal::MissingNarrativeMarks);
    }

    None
}
