//! Configuration loading and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration, constructed once at application startup and passed
/// down to the store and sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and managed book copies.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory imported book files are copied into.
    #[serde(default = "default_books_dir")]
    pub books_dir: PathBuf,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub database: PathBuf,

    /// Timeout for remote sync requests, in seconds.
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,

    /// Maximum characters per display chunk.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            books_dir: default_books_dir(),
            database: default_db_path(),
            remote_timeout_secs: default_remote_timeout(),
            chunk_chars: default_chunk_chars(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lectern")
}

fn default_books_dir() -> PathBuf {
    default_data_dir().join("books")
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("lectern.db")
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_chunk_chars() -> usize {
    1000
}

impl Config {
    /// Build a configuration rooted at the given data directory.
    pub fn at(data_dir: PathBuf) -> Self {
        Self {
            books_dir: data_dir.join("books"),
            database: data_dir.join("lectern.db"),
            data_dir,
            remote_timeout_secs: default_remote_timeout(),
            chunk_chars: default_chunk_chars(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Create the data and books directories if missing.
    pub fn ensure_dirs(&self) -> crate::error::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.books_dir)?;
        Ok(())
    }
}
