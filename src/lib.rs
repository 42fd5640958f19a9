//! # Lectern
//!
//! Library core of a desktop e-book reader: book import and storage,
//! chapter segmentation and display chunking, reading sessions over local
//! and remote text sources, and per-day reading-time accounting.
//!
//! ## Features
//!
//! - Plain-text import with encoding detection and content hashing
//! - Chapter recognition from volume/chapter headings
//! - Display chunking with paragraph- and sentence-aware break points
//! - Reading progress persisted per book, resumable mid-chapter
//! - Sync with a companion reading app's web service
//! - Reading-time buckets per book, chapter, mode and calendar day

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod session;
pub mod source;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use db::Database;
pub use error::{AppError, Result};
pub use session::ReadingSession;
