//! 片段分类器（带前瞻缓冲）
//!
//! 按文档顺序遍历章节片段：
//! 1. 片段内含插图标记 -> DIRECT，解析其 asset_key，深度推理提示
//! 2. 否则扫描前瞻窗口内的后续片段，找到标记 -> LOOKAHEAD，轻量推理提示
//! 3. 否则 -> STANDARD，无推理提示
//!
//! 前瞻窗口大小 k 从当前片段起算，覆盖其后 k - 1 个片段；k = 0 或 1 时不做前瞻。
//! 窗口内出现多张插图时取最近的一张；同一片段内有多个标记时取阅读顺序第一个。

use serde::{Deserialize, Serialize};

use crate::domain::volume::{AssetKey, Chapter, Fingerprint, SegmentId};

/// 插图标记前缀：`[[illustration:KEY]]`
pub const MARKER_PREFIX: &str = "[[illustration:";
/// 插图标记后缀
pub const MARKER_SUFFIX: &str = "]]";
/// 默认前瞻窗口
pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 3;

/// 片段分类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentTag {
    Standard,
    Direct,
    Lookahead,
}

impl SegmentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentTag::Standard => "STANDARD",
            SegmentTag::Direct => "DIRECT",
            SegmentTag::Lookahead => "LOOKAHEAD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "STANDARD" => Some(SegmentTag::Standard),
            "DIRECT" => Some(SegmentTag::Direct),
            "LOOKAHEAD" => Some(SegmentTag::Lookahead),
            _ => None,
        }
    }

    /// 是否走有序的视觉通道
    pub fn is_visual(&self) -> bool {
        !matches!(self, SegmentTag::Standard)
    }
}

impl std::fmt::Display for SegmentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 推理深度提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    None,
    Light,
    Deep,
}

impl ReasoningDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningDepth::None => "none",
            ReasoningDepth::Light => "light",
            ReasoningDepth::Deep => "deep",
        }
    }
}

/// 分类后的片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSegment {
    pub chapter: usize,
    pub index: usize,
    pub text: String,
    pub tag: SegmentTag,
    /// DIRECT 时解析出的插图
    pub asset_key: Option<AssetKey>,
    /// LOOKAHEAD 时前方最近的插图
    pub lookahead_key: Option<AssetKey>,
    /// 到前方插图的片段距离
    pub lookahead_distance: Option<usize>,
    pub depth: ReasoningDepth,
}

impl ClassifiedSegment {
    pub fn id(&self) -> SegmentId {
        SegmentId::new(self.chapter, self.index)
    }

    /// 该片段需要的插图（DIRECT 或 LOOKAHEAD）
    pub fn visual_key(&self) -> Option<&AssetKey> {
        self.asset_key.as_ref().or(self.lookahead_key.as_ref())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_text(&self.text)
    }
}

/// 文本中的一个插图标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub key: AssetKey,
    /// 标记在原文中的字节区间
    pub start: usize,
    pub end: usize,
}

impl Marker {
    pub fn render(&self) -> String {
        render_marker(&self.key)
    }
}

/// 生成标准标记文本
pub fn render_marker(key: &AssetKey) -> String {
    format!("{}{}{}", MARKER_PREFIX, key, MARKER_SUFFIX)
}

/// 扫描文本中所有合法标记（按出现顺序）
pub fn scan_markers(text: &str) -> Vec<Marker> {
    let mut markers = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(MARKER_PREFIX) {
        let start = cursor + offset;
        let key_start = start + MARKER_PREFIX.len();
        let Some(len) = text[key_start..].find(MARKER_SUFFIX) else {
            break;
        };
        let end = key_start + len + MARKER_SUFFIX.len();

        match AssetKey::new(&text[key_start..key_start + len]) {
            Ok(key) => {
                markers.push(Marker { key, start, end });
                cursor = end;
            }
            // 非法标记：跳过前缀继续扫描
            Err(_) => cursor = key_start,
        }
    }

    markers
}

/// 文本中引用的插图标识
pub fn find_markers(text: &str) -> Vec<AssetKey> {
    scan_markers(text).into_iter().map(|m| m.key).collect()
}

/// 对一个章节进行分类
pub fn classify(chapter: &Chapter, lookahead_window: usize) -> Vec<ClassifiedSegment> {
    let segments = chapter.segments();
    let first_markers: Vec<Option<AssetKey>> = segments
        .iter()
        .map(|s| find_markers(s.text()).into_iter().next())
        .collect();

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let mut classified = ClassifiedSegment {
                chapter: chapter.number(),
                index: segment.index(),
                text: segment.text().to_string(),
                tag: SegmentTag::Standard,
                asset_key: None,
                lookahead_key: None,
                lookahead_distance: None,
                depth: ReasoningDepth::None,
            };

            if let Some(key) = &first_markers[i] {
                classified.tag = SegmentTag::Direct;
                classified.asset_key = Some(key.clone());
                classified.depth = ReasoningDepth::Deep;
                return classified;
            }

            let end = (i + lookahead_window).min(segments.len());
            let nearest = ((i + 1)..end)
                .find_map(|j| first_markers[j].as_ref().map(|key| (j - i, key)));

            if let Some((distance, key)) = nearest {
                classified.tag = SegmentTag::Lookahead;
                classified.lookahead_key = Some(key.clone());
                classified.lookahead_distance = Some(distance);
                classified.depth = ReasoningDepth::Light;
            }

            classified
        })
        .collect()
}

/// 去掉标记后的待翻译文本，以及标记的位置
///
/// 标记不发送给生成层，翻译完成后按原位置（正文之前/之后）重新拼回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub prose: String,
    leading: Vec<AssetKey>,
    trailing: Vec<AssetKey>,
}

impl Passage {
    pub fn parse(text: &str) -> Self {
        let markers = scan_markers(text);
        let mut prose = String::with_capacity(text.len());
        let mut leading = Vec::new();
        let mut trailing = Vec::new();
        let mut cursor = 0;

        for marker in markers {
            let between = &text[cursor..marker.start];
            prose.push_str(between);
            if prose.trim().is_empty() {
                leading.push(marker.key);
            } else {
                trailing.push(marker.key);
            }
            cursor = marker.end;
        }
        prose.push_str(&text[cursor..]);

        let prose = prose
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            prose,
            leading,
            trailing,
        }
    }

    /// 只有标记、没有需要翻译的正文
    pub fn is_marker_only(&self) -> bool {
        self.prose.is_empty()
    }

    /// 把译文与标记重新拼合
    pub fn reassemble(&self, translated: &str) -> String {
        let mut parts: Vec<String> = self.leading.iter().map(render_marker).collect();
        let translated = translated.trim();
        if !translated.is_empty() {
            parts.push(translated.to_string());
        }
        parts.extend(self.trailing.iter().map(render_marker));
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::SourceSegment;

    fn chapter(texts: &[&str]) -> Chapter {
        let segments = texts
            .iter()
            .enumerate()
            .map(|(i, t)| SourceSegment::new(i, *t).unwrap())
            .collect();
        Chapter::new(1, "Chapter", segments).unwrap()
    }

    fn key(k: &str) -> AssetKey {
        AssetKey::new(k).unwrap()
    }

    #[test]
    fn test_lookahead_window_three_tags_preceding_segment() {
        let ch = chapter(&["A", "B [[illustration:X]]", "C"]);
        let classified = classify(&ch, 3);

        assert_eq!(classified[0].tag, SegmentTag::Lookahead);
        assert_eq!(classified[0].lookahead_key, Some(key("X")));
        assert_eq!(classified[0].lookahead_distance, Some(1));
        assert_eq!(classified[0].depth, ReasoningDepth::Light);

        assert_eq!(classified[1].tag, SegmentTag::Direct);
        assert_eq!(classified[1].asset_key, Some(key("X")));
        assert_eq!(classified[1].depth, ReasoningDepth::Deep);

        assert_eq!(classified[2].tag, SegmentTag::Standard);
        assert_eq!(classified[2].depth, ReasoningDepth::None);
    }

    #[test]
    fn test_lookahead_window_one_disables_lookahead() {
        let ch = chapter(&["A", "B [[illustration:X]]", "C"]);
        let classified = classify(&ch, 1);
        assert_eq!(classified[0].tag, SegmentTag::Standard);
        assert_eq!(classified[0].lookahead_key, None);
        assert_eq!(classified[1].tag, SegmentTag::Direct);
    }

    #[test]
    fn test_window_zero_is_safe() {
        let ch = chapter(&["A", "[[illustration:X]]"]);
        let classified = classify(&ch, 0);
        assert_eq!(classified[0].tag, SegmentTag::Standard);
        assert_eq!(classified[1].tag, SegmentTag::Direct);
    }

    #[test]
    fn test_marker_outside_window_is_ignored() {
        let ch = chapter(&["A", "B", "C", "[[illustration:X]]"]);
        let classified = classify(&ch, 3);
        assert_eq!(classified[0].tag, SegmentTag::Standard);
        assert_eq!(classified[1].tag, SegmentTag::Lookahead);
        assert_eq!(classified[1].lookahead_distance, Some(2));
        assert_eq!(classified[2].tag, SegmentTag::Lookahead);
    }

    #[test]
    fn test_nearest_illustration_wins() {
        let ch = chapter(&["A", "[[illustration:near]]", "[[illustration:far]]"]);
        let classified = classify(&ch, 5);
        assert_eq!(classified[0].lookahead_key, Some(key("near")));
    }

    #[test]
    fn test_first_marker_in_segment_wins() {
        let ch = chapter(&["A", "[[illustration:one]] [[illustration:two]]"]);
        let classified = classify(&ch, 3);
        assert_eq!(classified[0].lookahead_key, Some(key("one")));
        assert_eq!(classified[1].asset_key, Some(key("one")));
    }

    #[test]
    fn test_scan_skips_malformed_markers() {
        let markers = scan_markers("x [[illustration:]] y [[illustration:ok]] [[illustration:open");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].key, key("ok"));
        assert_eq!(markers[0].render(), "[[illustration:ok]]");
    }

    #[test]
    fn test_passage_strips_and_reattaches_markers() {
        let passage = Passage::parse("[[illustration:a]]\n「行くぞ」と彼は言った。 [[illustration:b]]");
        assert_eq!(passage.prose, "「行くぞ」と彼は言った。");
        assert!(!passage.is_marker_only());
        assert_eq!(
            passage.reassemble("\"Let's go,\" he said."),
            "[[illustration:a]]\n\"Let's go,\" he said.\n[[illustration:b]]"
        );
    }

    #[test]
    fn test_marker_only_passage() {
        let passage = Passage::parse("  [[illustration:a]]  ");
        assert!(passage.is_marker_only());
        assert_eq!(passage.reassemble(""), "[[illustration:a]]");
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in [SegmentTag::Standard, SegmentTag::Direct, SegmentTag::Lookahead] {
            assert_eq!(SegmentTag::from_str(tag.as_str()), Some(tag));
        }
        assert!(SegmentTag::Lookahead.is_visual());
        assert!(!SegmentTag::Standard.is_visual());
    }
}
