//! Book file import: encoding detection, content hashing and copying
//! imported files into managed storage.

use crate::chunk::segment_chapters;
use crate::config::Config;
use crate::db::{Book, BookFormat, Database, now_timestamp};
use crate::error::{AppError, Result};
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Encodings tried in order when sniffing a text file. Windows-1252 is
/// last since it accepts any byte sequence.
const CANDIDATE_ENCODINGS: &[&str] = &["UTF-8", "GBK", "gb18030", "Big5", "windows-1252"];

/// Outcome of a batch import. Failed files never abort the batch;
/// successes are committed and failures collected.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Books stored, in input order.
    pub imported: Vec<Book>,
    /// Files that could not be imported, with the reason.
    pub failures: Vec<(PathBuf, AppError)>,
}

impl ImportReport {
    /// Whether every file imported cleanly.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sniff the text encoding of raw file bytes by trial decoding.
///
/// Returns the label of the first candidate that decodes without
/// replacement characters.
pub fn detect_encoding(bytes: &[u8]) -> Result<&'static str> {
    for &label in CANDIDATE_ENCODINGS {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| AppError::Encoding(format!("Unknown encoding label: {}", label)))?;
        let (_, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return Ok(label);
        }
    }
    Err(AppError::Encoding(
        "Could not detect text encoding".to_string(),
    ))
}

/// Decode file bytes with a known encoding label.
pub fn decode_text(bytes: &[u8], label: &str) -> Result<String> {
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| AppError::Encoding(format!("Unknown encoding label: {}", label)))?;
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(AppError::Encoding(format!(
            "Text does not decode as {}",
            label
        )));
    }
    Ok(text.into_owned())
}

/// Import one book file into the library.
///
/// Reads and decodes the file, hashes its bytes for identity, copies it
/// into managed storage and stores the metadata row. Re-importing the
/// same content is a no-op for reading progress.
pub fn import_book(db: &Database, config: &Config, path: &Path) -> Result<Book> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "txt" {
        return Err(AppError::UnsupportedFormat(format!(
            "No import handler for .{} files",
            extension
        )));
    }

    let bytes = std::fs::read(path)?;
    let md5 = format!("{:x}", md5::compute(&bytes));
    let label = detect_encoding(&bytes)?;
    let text = decode_text(&bytes, label)?;
    debug!(path = %path.display(), encoding = label, "decoded book file");

    let map = segment_chapters(&text);
    if map.is_empty() {
        warn!(path = %path.display(), "no chapter headings recognized");
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string();

    config.ensure_dirs()?;
    let dest = config.books_dir.join(format!("{}.txt", md5));
    if !dest.exists() {
        std::fs::copy(path, &dest)?;
    }

    let now = now_timestamp();
    let book = Book {
        id: 0,
        md5,
        path: dest.to_string_lossy().into_owned(),
        name,
        author: String::new(),
        format: BookFormat::PlainText,
        encoding: Some(label.to_string()),
        chapter_index: 0,
        chapter_name: String::new(),
        chapter_count: map.len().max(1) as i64,
        chapter_offset: 0,
        text_offset: 0,
        text_total: text.chars().count() as i64,
        sort_weight: 0.0,
        created_at: now,
        updated_at: now,
    };

    let stored = db.upsert_book(&book)?;
    info!(name = %stored.name, chapters = stored.chapter_count, "imported book");
    Ok(stored)
}

/// Import a batch of files. One failed file never aborts the batch.
pub fn import_books(db: &Database, config: &Config, paths: &[PathBuf]) -> ImportReport {
    let mut report = ImportReport::default();
    for path in paths {
        match import_book(db, config, path) {
            Ok(book) => report.imported.push(book),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "import failed");
                report.failures.push((path.clone(), e));
            }
        }
    }
    report
}
