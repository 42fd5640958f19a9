//! Plain-text source: a managed local file segmented into chapters by
//! heading recognition.

use crate::chunk::{ChapterMap, segment_chapters};
use crate::db::Book;
use crate::error::{AppError, Result};
use crate::import::{decode_text, detect_encoding};
use crate::source::TextSource;
use std::path::Path;
use tracing::debug;

/// Text source for local plain-text books. Holds the decoded text and
/// chapter map in memory for the lifetime of the session.
pub struct TxtSource {
    chars: Vec<char>,
    map: ChapterMap,
    book_name: String,
}

impl TxtSource {
    /// Create an unopened source.
    pub fn new() -> Self {
        Self {
            chars: Vec::new(),
            map: ChapterMap::default(),
            book_name: String::new(),
        }
    }

    /// Char offset of a chapter's start within the whole text.
    fn chapter_start(&self, index: i64) -> usize {
        if self.map.is_empty() {
            return 0;
        }
        self.map
            .offsets
            .get(index as usize)
            .copied()
            .unwrap_or(self.chars.len())
    }
}

impl Default for TxtSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSource for TxtSource {
    fn open(&mut self, book: &mut Book) -> Result<()> {
        let bytes = std::fs::read(Path::new(&book.path))?;

        let label = match &book.encoding {
            Some(label) => label.clone(),
            None => {
                let detected = detect_encoding(&bytes)?;
                book.encoding = Some(detected.to_string());
                detected.to_string()
            }
        };
        let text = decode_text(&bytes, &label)?;

        self.chars = text.chars().collect();
        self.map = segment_chapters(&text);
        self.book_name = book.name.clone();
        debug!(name = %book.name, chapters = self.map.len(), "opened text book");

        book.chapter_count = self.chapter_count();
        book.text_total = self.chars.len() as i64;
        Ok(())
    }

    fn chapter_count(&self) -> i64 {
        // A text with no recognized headings reads as one unnamed chapter.
        self.map.len().max(1) as i64
    }

    fn chapter_title(&self, index: i64) -> String {
        if self.map.is_empty() {
            if index == 0 {
                return self.book_name.clone();
            }
            return String::new();
        }
        self.map
            .names
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn chapter_text(&mut self, index: i64) -> Result<String> {
        if index < 0 || index >= self.chapter_count() {
            return Err(AppError::NotFound(format!(
                "Chapter {} out of range",
                index
            )));
        }
        if self.map.is_empty() {
            return Ok(self.chars.iter().collect());
        }

        let start = self.map.offsets[index as usize];
        let end = self
            .map
            .offsets
            .get(index as usize + 1)
            .copied()
            .unwrap_or(self.chars.len());
        Ok(self.chars[start..end].iter().collect())
    }

    fn text_offset(&self, chapter_index: i64, chapter_offset: i64) -> i64 {
        self.chapter_start(chapter_index) as i64 + chapter_offset
    }
}
