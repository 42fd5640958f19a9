//! Remote-sync source: chapter text and reading position served by a
//! companion reading app's web service.
//!
//! The book's stored path carries the service base URL plus a `bn` query
//! parameter holding the book's index on the remote shelf.

use crate::config::Config;
use crate::db::Book;
use crate::error::{AppError, Result};
use crate::source::{ProgressUpdate, TextSource};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Text source backed by the remote sync service.
pub struct RemoteSource {
    client: Client,
    base: String,
    book_url: String,
    name: String,
    author: String,
    chapters: Vec<ChapterInfo>,
}

/// Common response wrapper used by every service endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(rename = "isSuccess")]
    pub is_success: bool,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: String,
    #[serde(default)]
    pub data: Option<T>,
}

/// One shelf entry from `getBookshelf`.
#[derive(Debug, Deserialize)]
pub(crate) struct ShelfBook {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "bookUrl", default)]
    pub book_url: String,
    #[serde(rename = "durChapterIndex", default)]
    pub dur_chapter_index: i64,
    #[serde(rename = "durChapterPos", default)]
    pub dur_chapter_pos: i64,
    #[serde(rename = "durChapterTitle", default)]
    pub dur_chapter_title: String,
}

/// One entry from `getChapterList`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChapterInfo {
    #[serde(default)]
    pub title: String,
}

/// Body for `saveBookProgress`.
#[derive(Debug, Serialize)]
pub(crate) struct SaveProgressPayload {
    pub name: String,
    pub author: String,
    #[serde(rename = "durChapterIndex")]
    pub dur_chapter_index: i64,
    #[serde(rename = "durChapterPos")]
    pub dur_chapter_pos: i64,
    /// Update time in epoch milliseconds.
    #[serde(rename = "durChapterTime")]
    pub dur_chapter_time: i64,
    #[serde(rename = "durChapterTitle")]
    pub dur_chapter_title: String,
}

/// Split a stored shelf URL into the service base and the shelf index
/// carried in its `bn` parameter. A URL without `bn` means slot 0.
pub(crate) fn split_shelf_url(path: &str) -> Result<(String, usize)> {
    let (base, query) = match path.split_once('?') {
        Some((base, query)) => (base, query),
        None => (path, ""),
    };

    let bn = match query.split('&').find_map(|pair| pair.strip_prefix("bn=")) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| AppError::Remote(format!("Invalid shelf index: {}", raw)))?,
        None => 0,
    };

    Ok((base.trim_end_matches('/').to_string(), bn))
}

fn take_data<T>(envelope: ApiEnvelope<T>) -> Result<T> {
    if !envelope.is_success {
        return Err(AppError::Remote(envelope.error_msg));
    }
    envelope
        .data
        .ok_or_else(|| AppError::Remote("Response carried no data".to_string()))
}

impl RemoteSource {
    /// Create an unopened source with the configured request timeout.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.remote_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base: String::new(),
            book_url: String::new(),
            name: String::new(),
            author: String::new(),
            chapters: Vec::new(),
        })
    }
}

impl TextSource for RemoteSource {
    fn open(&mut self, book: &mut Book) -> Result<()> {
        let (base, bn) = split_shelf_url(&book.path)?;

        let shelf: Vec<ShelfBook> = take_data(
            self.client
                .get(format!("{}/getBookshelf", base))
                .send()?
                .json()?,
        )?;
        let entry = shelf.into_iter().nth(bn).ok_or_else(|| {
            AppError::Remote(format!("No book at shelf index {}", bn))
        })?;

        let chapters: Vec<ChapterInfo> = take_data(
            self.client
                .get(format!(
                    "{}/getChapterList?url={}",
                    base,
                    urlencoding::encode(&entry.book_url)
                ))
                .send()?
                .json()?,
        )?;
        debug!(name = %entry.name, chapters = chapters.len(), "opened remote book");

        // The service's position is the truth on open.
        book.name = entry.name.clone();
        book.author = entry.author.clone();
        book.chapter_index = entry.dur_chapter_index;
        book.chapter_offset = entry.dur_chapter_pos;
        book.chapter_name = entry.dur_chapter_title.clone();
        book.chapter_count = chapters.len() as i64;

        self.base = base;
        self.book_url = entry.book_url;
        self.name = entry.name;
        self.author = entry.author;
        self.chapters = chapters;
        Ok(())
    }

    fn chapter_count(&self) -> i64 {
        self.chapters.len() as i64
    }

    fn chapter_title(&self, index: i64) -> String {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.chapters.get(i))
            .map(|c| c.title.clone())
            .unwrap_or_default()
    }

    fn chapter_text(&mut self, index: i64) -> Result<String> {
        if index < 0 || index >= self.chapter_count() {
            return Err(AppError::NotFound(format!(
                "Chapter {} out of range",
                index
            )));
        }
        take_data(
            self.client
                .get(format!(
                    "{}/getBookContent?url={}&index={}",
                    self.base,
                    urlencoding::encode(&self.book_url),
                    index
                ))
                .send()?
                .json()?,
        )
    }

    fn push_progress(&mut self, update: &ProgressUpdate) -> Result<()> {
        let payload = SaveProgressPayload {
            name: self.name.clone(),
            author: self.author.clone(),
            dur_chapter_index: update.chapter_index,
            dur_chapter_pos: update.chapter_offset,
            dur_chapter_time: crate::db::now_timestamp() * 1000,
            dur_chapter_title: update.chapter_name.clone(),
        };

        let envelope: ApiEnvelope<serde_json::Value> = self
            .client
            .post(format!("{}/saveBookProgress", self.base))
            .json(&payload)
            .send()?
            .json()?;
        if !envelope.is_success {
            return Err(AppError::Remote(envelope.error_msg));
        }
        info!(chapter = update.chapter_index, "pushed progress to remote");
        Ok(())
    }
}
