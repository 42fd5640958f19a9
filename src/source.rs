//! Text sources: where chapter text comes from for each book format.

pub(crate) mod remote;
pub(crate) mod txt;

pub use remote::RemoteSource;
pub use txt::TxtSource;

use crate::config::Config;
use crate::db::{Book, BookFormat};
use crate::error::{AppError, Result};

/// A position change to report to the backing source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Chapter the reader is in.
    pub chapter_index: i64,
    /// Char offset within that chapter.
    pub chapter_offset: i64,
    /// Label of that chapter.
    pub chapter_name: String,
}

/// Backend that provides chapter titles and text for one open book.
///
/// Sources are stateful: `open` must be called once before any other
/// method, and may rewrite the book's stored position when the backend
/// holds a more recent one.
pub trait TextSource: Send {
    /// Load the book and reconcile its position with the backend.
    fn open(&mut self, book: &mut Book) -> Result<()>;

    /// Number of chapters the source knows about.
    fn chapter_count(&self) -> i64;

    /// Label for a chapter, empty when the index is out of range.
    fn chapter_title(&self, index: i64) -> String;

    /// Full text of one chapter.
    fn chapter_text(&mut self, index: i64) -> Result<String>;

    /// Report a position change to the backend. Local sources keep
    /// nothing outside the database and ignore this.
    fn push_progress(&mut self, _update: &ProgressUpdate) -> Result<()> {
        Ok(())
    }

    /// Cumulative char offset of a position within the whole book.
    /// Sources without a whole-book view fall back to the chapter offset.
    fn text_offset(&self, _chapter_index: i64, chapter_offset: i64) -> i64 {
        chapter_offset
    }
}

/// Build the text source for a book's format.
pub fn source_for(book: &Book, config: &Config) -> Result<Box<dyn TextSource>> {
    match book.format {
        BookFormat::PlainText => Ok(Box::new(TxtSource::new())),
        BookFormat::RemoteSync => Ok(Box::new(RemoteSource::new(config)?)),
        other => Err(AppError::UnsupportedFormat(format!(
            "No text source for {:?} books",
            other
        ))),
    }
}
