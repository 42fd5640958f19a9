//! Entities and the SQLite-backed store.

mod schema;

pub use schema::Database;

use chrono::{DateTime, Datelike, Local, Utc};
use serde::{Deserialize, Serialize};

/// Book formats known to the library.
///
/// Only plain text and remote sync have a working text source; the other
/// tags exist so imported metadata survives a future format handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// Local plain-text file.
    PlainText,
    /// Book synced from a companion reading app's web service.
    RemoteSync,
    /// EPUB format (not yet readable).
    Epub,
    /// MOBI format (not yet readable).
    Mobi,
    /// PDF format (not yet readable).
    Pdf,
    /// DJVU format (not yet readable).
    Djvu,
}

impl BookFormat {
    /// Integer code stored in the database.
    pub fn code(self) -> i64 {
        match self {
            BookFormat::PlainText => 0,
            BookFormat::RemoteSync => 1,
            BookFormat::Epub => 2,
            BookFormat::Mobi => 3,
            BookFormat::Pdf => 4,
            BookFormat::Djvu => 5,
        }
    }

    /// Decode a stored integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(BookFormat::PlainText),
            1 => Some(BookFormat::RemoteSync),
            2 => Some(BookFormat::Epub),
            3 => Some(BookFormat::Mobi),
            4 => Some(BookFormat::Pdf),
            5 => Some(BookFormat::Djvu),
            _ => None,
        }
    }
}

/// How the time in a reading-time entry was spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    /// Reading on screen.
    Read,
    /// Listening via text-to-speech.
    Listen,
}

impl ReadingMode {
    /// Integer code stored in the database.
    pub fn code(self) -> i64 {
        match self {
            ReadingMode::Read => 0,
            ReadingMode::Listen => 1,
        }
    }

    /// Decode a stored integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ReadingMode::Read),
            1 => Some(ReadingMode::Listen),
            _ => None,
        }
    }
}

/// A library entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Row id (0 until stored).
    pub id: i64,
    /// Content hash of the stored file, or a synthetic id for remote
    /// sources. Unique key.
    pub md5: String,
    /// Managed-storage path, or the remote base URL for synced books.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Author (may be empty).
    pub author: String,
    /// File format.
    pub format: BookFormat,
    /// Text encoding label, used only for plain-text books.
    pub encoding: Option<String>,
    /// Current chapter index.
    pub chapter_index: i64,
    /// Cached label of the current chapter.
    pub chapter_name: String,
    /// Total chapters.
    pub chapter_count: i64,
    /// Char offset read up to within the current chapter.
    pub chapter_offset: i64,
    /// Cumulative chars read across the whole book.
    pub text_offset: i64,
    /// Total chars in the book.
    pub text_total: i64,
    /// Positive values pin the book to the top of library views.
    pub sort_weight: f64,
    /// Creation timestamp, epoch seconds.
    pub created_at: i64,
    /// Last update timestamp, epoch seconds.
    pub updated_at: i64,
}

impl Book {
    /// Create a remote-synced book pointing at the companion app's web
    /// service. Identity is a synthetic hash of name and author since
    /// there is no local file to hash.
    pub fn remote(url: &str, name: &str, author: &str) -> Self {
        let digest = md5::compute(format!("{}:{}", name, author).as_bytes());
        let now = now_timestamp();
        Self {
            id: 0,
            md5: format!("{:x}", digest),
            path: url.to_string(),
            name: name.to_string(),
            author: author.to_string(),
            format: BookFormat::RemoteSync,
            encoding: None,
            chapter_index: 0,
            chapter_name: String::new(),
            chapter_count: 0,
            chapter_offset: 0,
            text_offset: 0,
            text_total: 0,
            sort_weight: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One (book, chapter, day) reading-time accumulation bucket.
///
/// The calendar fields used as query filters (day, week, month, year) are
/// derived from `timestamp` at write time and live only in the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingTimeEntry {
    /// Row id (0 until stored).
    pub id: i64,
    /// Book identity.
    pub md5: String,
    /// Denormalized book name snapshot.
    pub book_name: String,
    /// Chapter the time was spent in.
    pub chapter_index: i64,
    /// Reading or listening.
    pub mode: ReadingMode,
    /// Datetime of the bucket's earliest write, epoch seconds.
    pub timestamp: i64,
    /// Chars covered in this accumulation.
    pub words: i64,
    /// Elapsed time in seconds.
    pub seconds: i64,
}

/// Calendar fields derived from a timestamp, used as query filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    /// Day of month, 1-31.
    pub day: u32,
    /// Week of year (weeks start on Monday).
    pub week: u32,
    /// Month, 1-12.
    pub month: u32,
    /// Calendar year.
    pub year: i32,
}

/// Derive the local calendar fields for an epoch-seconds timestamp.
pub fn calendar_day(timestamp: i64) -> CalendarDay {
    let dt: DateTime<Local> = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .with_timezone(&Local);
    CalendarDay {
        day: dt.day(),
        week: week_of_year(&dt),
        month: dt.month(),
        year: dt.year(),
    }
}

/// Week of year with Monday as the first day (strftime `%W`).
fn week_of_year(dt: &DateTime<Local>) -> u32 {
    dt.format("%W").to_string().parse().unwrap_or(0)
}

/// Filter for reading-time queries; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TimeFilter {
    /// Restrict to one book; `None` aggregates the whole library.
    pub md5: Option<String>,
    /// Day of month.
    pub day: Option<u32>,
    /// Week of year.
    pub week: Option<u32>,
    /// Month.
    pub month: Option<u32>,
    /// Year.
    pub year: Option<i32>,
}

/// Summed reading time and chars over a set of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeTotals {
    /// Total elapsed seconds.
    pub seconds: i64,
    /// Total chars covered.
    pub words: i64,
}

/// Current time as epoch seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}
