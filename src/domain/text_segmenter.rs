//! 章节文本分割器
//!
//! 把章节原文切成翻译片段：
//! 1. 以空行分段（支持 \n 和 \r\n）
//! 2. 只含插图标记的行单独成段（插图通常独占一行）
//! 3. 只有引号的行合并到前一个片段

use crate::domain::segment_classifier::scan_markers;

/// 分割配置
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// 单个片段的最大字符数，超过时在句末标点处切开（0 表示不限制）
    pub max_chars: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self { max_chars: 2000 }
    }
}

/// 检查是否为句末标点
#[inline]
fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '。' | '？' | '！' | '.' | '?' | '!' | '」' | '』')
}

/// 检查行是否只包含引号或空白（应该被合并）
#[inline]
fn is_trivial_line(s: &str) -> bool {
    s.chars().all(|c| {
        matches!(
            c,
            '"' | '\u{201C}' | '\u{201D}' | '\'' | '\u{2018}' | '\u{2019}' | '「' | '」' | '『' | '』' | ' ' | '\t'
        )
    })
}

/// 行内除标记外没有其他内容
#[inline]
fn is_marker_line(line: &str) -> bool {
    let markers = scan_markers(line);
    if markers.is_empty() {
        return false;
    }
    let mut rest = String::with_capacity(line.len());
    let mut cursor = 0;
    for marker in &markers {
        rest.push_str(&line[cursor..marker.start]);
        cursor = marker.end;
    }
    rest.push_str(&line[cursor..]);
    rest.trim().is_empty()
}

/// 把超长段落在句末标点处切开
fn split_long(paragraph: String, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || paragraph.chars().count() <= max_chars {
        return vec![paragraph];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in paragraph.chars() {
        current.push(ch);
        count += 1;
        if count >= max_chars && is_sentence_end(ch) {
            pieces.push(std::mem::take(&mut current).trim().to_string());
            count = 0;
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// 把当前段落落成片段
fn flush(paragraph: &mut Vec<String>, segments: &mut Vec<String>, config: &SegmentConfig) {
    if paragraph.is_empty() {
        return;
    }
    let joined = paragraph.join("\n");
    paragraph.clear();
    segments.extend(split_long(joined, config.max_chars));
}

/// 对章节文本进行分段
pub fn segment_text(text: &str, config: &SegmentConfig) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut paragraph, &mut segments, config);
            continue;
        }

        if is_marker_line(line) {
            flush(&mut paragraph, &mut segments, config);
            segments.push(line.to_string());
            continue;
        }

        // 只有引号的行合并到前一行（段落为空时合并到前一个片段）
        if is_trivial_line(line) {
            if let Some(last) = paragraph.last_mut() {
                last.push_str(line);
            } else if let Some(last) = segments.last_mut() {
                last.push_str(line);
            }
            continue;
        }

        paragraph.push(line.to_string());
    }
    flush(&mut paragraph, &mut segments, config);

    segments
}

/// 使用默认配置分段（便捷方法）
pub fn segment_text_default(text: &str) -> Vec<String> {
    segment_text(text, &SegmentConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let text = "第一段第一行。\n第一段第二行。\n\n第二段。\r\n\r\n第三段。";
        let segments = segment_text_default(text);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], "第一段第一行。\n第一段第二行。");
        assert_eq!(segments[1], "第二段。");
        assert_eq!(segments[2], "第三段。");
    }

    #[test]
    fn test_marker_line_forms_own_segment() {
        let text = "彼は振り返った。\n[[illustration:img-1]]\n雨が降っていた。";
        let segments = segment_text_default(text);
        assert_eq!(
            segments,
            vec![
                "彼は振り返った。".to_string(),
                "[[illustration:img-1]]".to_string(),
                "雨が降っていた。".to_string(),
            ]
        );
    }

    #[test]
    fn test_inline_marker_stays_in_paragraph() {
        let text = "挿絵の前の文 [[illustration:img-1]] 挿絵の後の文";
        let segments = segment_text_default(text);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].contains("[[illustration:img-1]]"));
    }

    #[test]
    fn test_quote_only_line_merged() {
        let text = "「行くぞ\n」\n\n次の段落。";
        let segments = segment_text_default(text);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], "「行くぞ」");
    }

    #[test]
    fn test_quote_only_line_after_blank_merges_into_previous_segment() {
        let text = "前の段落。\n\n\"";
        let segments = segment_text_default(text);
        assert_eq!(segments, vec!["前の段落。\"".to_string()]);
    }

    #[test]
    fn test_long_paragraph_split_at_sentence_end() {
        let config = SegmentConfig { max_chars: 5 };
        let segments = segment_text("あいうえお。かきくけこ。さし", &config);
        assert_eq!(segments, vec!["あいうえお。", "かきくけこ。", "さし"]);
    }

    #[test]
    fn test_trivial_line_detection() {
        assert!(is_trivial_line("\""));
        assert!(is_trivial_line("」 "));
        assert!(!is_trivial_line("内容"));
        assert!(is_marker_line(" [[illustration:a]] [[illustration:b]] "));
        assert!(!is_marker_line("text [[illustration:a]]"));
    }
}
