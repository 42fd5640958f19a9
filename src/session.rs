//! Reading session: one open book, its chunked chapter text, and the
//! progress and reading-time bookkeeping around position changes.

use crate::chunk::split_text;
use crate::config::Config;
use crate::db::{
    Book, BookFormat, Database, ReadingMode, ReadingTimeEntry, TimeTotals, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::source::{ProgressUpdate, TextSource, source_for};
use std::time::Instant;
use tracing::{debug, info};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No book open.
    Closed,
    /// A book is being opened; the session is not yet usable.
    Opening,
    /// A book is open and chapter text is loaded.
    Ready,
    /// Opening failed; only `open` and `close` are meaningful.
    Error,
}

/// Outcome of a chapter navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterChange {
    /// Moved to the chapter.
    Moved {
        /// New chapter index.
        index: i64,
        /// New chapter label.
        name: String,
    },
    /// Already at the first chapter; nothing changed.
    AtFirst,
    /// Already at the last chapter; nothing changed.
    AtLast,
}

/// Snapshot returned by a successful open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedBook {
    /// Display name.
    pub name: String,
    /// Chapter the session resumed in.
    pub chapter_index: i64,
    /// Label of that chapter.
    pub chapter_name: String,
    /// Chunk covering the persisted offset.
    pub chunk_index: usize,
    /// Chunks in the current chapter.
    pub chunk_count: usize,
}

/// Reading-time rollups for the open book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Today's totals.
    pub today: TimeTotals,
    /// This week's totals.
    pub week: TimeTotals,
    /// This month's totals.
    pub month: TimeTotals,
    /// This year's totals.
    pub year: TimeTotals,
    /// All-time totals.
    pub all: TimeTotals,
}

/// One open book and its reading position.
///
/// Sessions are single-threaded state machines; the generation counter
/// lets callers running work off-thread discard results that arrive
/// after the session moved on to another book.
pub struct ReadingSession {
    db: Database,
    config: Config,
    state: SessionState,
    generation: u64,
    mode: ReadingMode,
    book: Option<Book>,
    source: Option<Box<dyn TextSource>>,
    chunks: Vec<String>,
    chunk_offsets: Vec<usize>,
    chunk_index: usize,
    last_tick: Option<Instant>,
}

impl ReadingSession {
    /// Create a closed session.
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config,
            state: SessionState::Closed,
            generation: 0,
            mode: ReadingMode::Read,
            book: None,
            source: None,
            chunks: Vec::new(),
            chunk_offsets: Vec::new(),
            chunk_index: 0,
            last_tick: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Monotonic counter bumped on every open and close. Results computed
    /// for an older generation must be dropped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// How recorded time is classified.
    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    /// Change how recorded time is classified.
    pub fn set_mode(&mut self, mode: ReadingMode) {
        self.mode = mode;
    }

    /// The open book, if any.
    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    /// Chunks of the current chapter.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Index of the chunk the reader is on.
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Text of the chunk the reader is on.
    pub fn chunk(&self) -> Option<&str> {
        self.chunks.get(self.chunk_index).map(String::as_str)
    }

    /// Open a book by md5 and resume at its persisted position.
    ///
    /// Remote books adopt the service's position as the truth and persist
    /// it locally; nothing is echoed back to the service on open.
    pub fn open(&mut self, md5: &str) -> Result<OpenedBook> {
        self.close();
        self.state = SessionState::Opening;

        match self.open_inner(md5) {
            Ok(opened) => {
                self.state = SessionState::Ready;
                self.last_tick = Some(Instant::now());
                info!(name = %opened.name, chapter = opened.chapter_index, "opened book");
                Ok(opened)
            }
            Err(e) => {
                self.state = SessionState::Error;
                self.book = None;
                self.source = None;
                Err(e)
            }
        }
    }

    fn open_inner(&mut self, md5: &str) -> Result<OpenedBook> {
        let mut book = self
            .db
            .get_book(md5)?
            .ok_or_else(|| AppError::NotFound(md5.to_string()))?;

        let mut source = source_for(&book, &self.config)?;
        source.open(&mut book)?;

        book.chapter_index = book
            .chapter_index
            .clamp(0, (source.chapter_count() - 1).max(0));

        if book.format == BookFormat::RemoteSync {
            book.updated_at = now_timestamp();
            self.db.update_book(&book)?;
        }

        let text = source.chapter_text(book.chapter_index)?;
        book.chapter_name = source.chapter_title(book.chapter_index);

        let split = split_text(
            &text,
            book.chapter_offset.max(0) as usize,
            self.config.chunk_chars,
        );
        self.chunks = split.chunks;
        self.chunk_offsets = split.offsets;
        self.chunk_index = split.resume_index;

        let opened = OpenedBook {
            name: book.name.clone(),
            chapter_index: book.chapter_index,
            chapter_name: book.chapter_name.clone(),
            chunk_index: self.chunk_index,
            chunk_count: self.chunks.len(),
        };
        self.book = Some(book);
        self.source = Some(source);
        Ok(opened)
    }

    /// Jump to a chapter. Out-of-range requests report the boundary and
    /// change nothing.
    pub fn goto_chapter(&mut self, index: i64) -> Result<ChapterChange> {
        let (book, source) = match (&mut self.book, &mut self.source) {
            (Some(book), Some(source)) if self.state == SessionState::Ready => (book, source),
            _ => return Err(AppError::Internal("No open book".to_string())),
        };

        if index < 0 {
            return Ok(ChapterChange::AtFirst);
        }
        if index >= source.chapter_count() {
            return Ok(ChapterChange::AtLast);
        }

        let text = source.chapter_text(index)?;
        let name = source.chapter_title(index);

        book.chapter_index = index;
        book.chapter_offset = 0;
        book.chapter_name = name.clone();
        book.text_offset = source.text_offset(index, 0);
        book.updated_at = now_timestamp();

        source.push_progress(&ProgressUpdate {
            chapter_index: index,
            chapter_offset: 0,
            chapter_name: name.clone(),
        })?;
        self.db.update_book(book)?;

        let split = split_text(&text, 0, self.config.chunk_chars);
        self.chunks = split.chunks;
        self.chunk_offsets = split.offsets;
        self.chunk_index = 0;
        self.generation += 1;
        self.last_tick = Some(Instant::now());

        debug!(chapter = index, name = %name, "moved to chapter");
        Ok(ChapterChange::Moved { index, name })
    }

    /// Move to the next chapter.
    pub fn next_chapter(&mut self) -> Result<ChapterChange> {
        let current = self
            .book
            .as_ref()
            .map(|b| b.chapter_index)
            .ok_or_else(|| AppError::Internal("No open book".to_string()))?;
        self.goto_chapter(current + 1)
    }

    /// Move to the previous chapter.
    pub fn prev_chapter(&mut self) -> Result<ChapterChange> {
        let current = self
            .book
            .as_ref()
            .map(|b| b.chapter_index)
            .ok_or_else(|| AppError::Internal("No open book".to_string()))?;
        self.goto_chapter(current - 1)
    }

    /// Move the in-memory position to a chunk without touching storage or
    /// the remote service. Returns false when the index is out of range.
    pub fn sync_position(&mut self, chunk_index: usize) -> bool {
        if chunk_index >= self.chunks.len() {
            return false;
        }
        self.chunk_index = chunk_index;
        if let Some(book) = &mut self.book {
            book.chapter_offset = self.chunk_offsets[chunk_index] as i64;
        }
        true
    }

    /// Persist the position at a chunk and account the time spent since
    /// the last record as reading time over that chunk.
    ///
    /// Remote books report the position to the service first; a push
    /// failure leaves local state unchanged so the caller can retry.
    pub fn record_position(&mut self, chunk_index: usize) -> Result<()> {
        if chunk_index >= self.chunks.len() {
            return Err(AppError::Internal(format!(
                "Chunk {} out of range",
                chunk_index
            )));
        }
        self.chunk_index = chunk_index;

        let (book, source) = match (&mut self.book, &mut self.source) {
            (Some(book), Some(source)) if self.state == SessionState::Ready => (book, source),
            _ => return Err(AppError::Internal("No open book".to_string())),
        };

        let offset = self.chunk_offsets[chunk_index];
        let words = self.chunks[chunk_index].chars().count() as i64;
        let seconds = self
            .last_tick
            .map(|t| t.elapsed().as_secs() as i64)
            .unwrap_or(0);

        book.chapter_offset = offset as i64;
        book.text_offset = source.text_offset(book.chapter_index, offset as i64);
        book.updated_at = now_timestamp();

        source.push_progress(&ProgressUpdate {
            chapter_index: book.chapter_index,
            chapter_offset: book.chapter_offset,
            chapter_name: book.chapter_name.clone(),
        })?;

        self.db.save_time_read(&ReadingTimeEntry {
            id: 0,
            md5: book.md5.clone(),
            book_name: book.name.clone(),
            chapter_index: book.chapter_index,
            mode: self.mode,
            timestamp: now_timestamp(),
            words,
            seconds,
        })?;
        self.db.update_book(book)?;

        self.last_tick = Some(Instant::now());
        Ok(())
    }

    /// Reading-time rollups for the open book, or the whole library when
    /// no book is open.
    pub fn stats(&self) -> Result<SessionStats> {
        let md5 = self.book.as_ref().map(|b| b.md5.as_str());
        Ok(SessionStats {
            today: self.db.time_today(md5)?,
            week: self.db.time_this_week(md5)?,
            month: self.db.time_this_month(md5)?,
            year: self.db.time_this_year(md5)?,
            all: self.db.time_all(md5)?,
        })
    }

    /// Drop the open book and return to the closed state.
    pub fn close(&mut self) {
        self.generation += 1;
        self.state = SessionState::Closed;
        self.book = None;
        self.source = None;
        self.chunks.clear();
        self.chunk_offsets.clear();
        self.chunk_index = 0;
        self.last_tick = None;
    }
}
