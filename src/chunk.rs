//! Chapter segmentation and display-chunk splitting.
//!
//! Pure functions over text. All offsets are character offsets, matching
//! the char positions persisted as reading progress.

use regex::Regex;
use std::sync::OnceLock;

/// Chapter names and their starting character offsets, parallel and ordered
/// by appearance. Both empty when no headings were recognized (the caller
/// treats the whole text as one unnamed chapter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterMap {
    /// Heading labels, e.g. `"第一卷 洪荒 第三章 觉醒"`.
    pub names: Vec<String>,
    /// Char offset of each heading line's start within the full text.
    pub offsets: Vec<usize>,
}

impl ChapterMap {
    /// Number of recognized chapters.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no headings were recognized.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Result of splitting one chapter's text into bounded display chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitText {
    /// Contiguous substrings whose concatenation is the input text.
    pub chunks: Vec<String>,
    /// Char offset of each chunk's start; strictly increasing, first is 0.
    /// Holds a single 0 when the input was empty.
    pub offsets: Vec<usize>,
    /// Index of the chunk covering the requested resume offset.
    pub resume_index: usize,
}

fn volume_anchored() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^第([一二三四五六七八九十\d]+)卷\s*(.*)").unwrap())
}

fn chapter_anchored() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^第([一二三四五六七八九十百千\d]+)章\s*(.*)").unwrap())
}

fn volume_anywhere() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"第([一二三四五六七八九十\d]+)卷\s*(.*)").unwrap())
}

fn chapter_anywhere() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"第([一二三四五六七八九十百千\d]+)章\s*(.*)").unwrap())
}

/// Scan `text` for volume/chapter headings and return their labels and
/// starting char offsets.
///
/// The primary pass matches headings anchored at line start. If that pass
/// yields nothing, a fallback pass re-scans with the same patterns matched
/// anywhere within the line, which handles texts with indented headings.
pub fn segment_chapters(text: &str) -> ChapterMap {
    let map = scan(text, volume_anchored(), chapter_anchored());
    if !map.is_empty() {
        return map;
    }
    scan(text, volume_anywhere(), chapter_anywhere())
}

fn scan(text: &str, volume: &Regex, chapter: &Regex) -> ChapterMap {
    let mut map = ChapterMap::default();
    let mut pending_volume: Option<String> = None;
    let mut offset = 0usize;

    for line in text.split('\n') {
        // Each line contributes its chars plus one separator.
        let line_chars = line.chars().count() + 1;

        if let Some(m) = volume.find(line) {
            pending_volume = Some(m.as_str().to_string());
            offset += line_chars;
            continue;
        }

        if let Some(m) = chapter.find(line) {
            let label = match pending_volume.take() {
                Some(vol) => format!("{} {}", vol, m.as_str()),
                None => m.as_str().to_string(),
            };
            map.names.push(label);
            map.offsets.push(offset);
        }
        offset += line_chars;
    }

    map
}

const SENTENCE_ENDS: &[char] = &['。', '！', '？', '…', '.', '!', '?', '；', ';'];

/// Split `text` into chunks of at most `budget` chars and locate the chunk
/// covering `resume_offset`.
///
/// Break points prefer the last paragraph break in the window, then the
/// last sentence-ending punctuation, then a hard break at the budget.
/// Concatenating the chunks reproduces `text` exactly.
pub fn split_text(text: &str, resume_offset: usize, budget: usize) -> SplitText {
    let budget = budget.max(1);
    let chars: Vec<char> = text.chars().collect();

    if chars.is_empty() {
        return SplitText {
            chunks: Vec::new(),
            offsets: vec![0],
            resume_index: 0,
        };
    }

    let mut chunks = Vec::new();
    let mut offsets = Vec::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let window_end = (pos + budget).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            break_point(&chars, pos, window_end)
        };

        offsets.push(pos);
        chunks.push(chars[pos..end].iter().collect());
        pos = end;
    }

    let resume_index = resume_index(&offsets, resume_offset);

    SplitText {
        chunks,
        offsets,
        resume_index,
    }
}

/// Pick the break position in `(start, end]`, preferring a paragraph break,
/// then a sentence end, falling back to the budget boundary.
fn break_point(chars: &[char], start: usize, end: usize) -> usize {
    let window = &chars[start..end];

    if let Some(i) = window.iter().rposition(|&c| c == '\n') {
        if i > 0 {
            return start + i + 1;
        }
    }
    if let Some(i) = window.iter().rposition(|c| SENTENCE_ENDS.contains(c)) {
        if i > 0 {
            return start + i + 1;
        }
    }
    end
}

/// Greatest index whose offset does not exceed `resume_offset`.
fn resume_index(offsets: &[usize], resume_offset: usize) -> usize {
    offsets
        .iter()
        .rposition(|&o| o <= resume_offset)
        .unwrap_or(0)
}
