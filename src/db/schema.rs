use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Database wrapper for serialized access from worker threads.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Ordered schema migrations, applied by comparing against
/// `PRAGMA user_version`. Appended to, never edited.
const MIGRATIONS: &[fn(&Connection) -> rusqlite::Result<()>] =
    &[migrate_base, migrate_add_columns, migrate_rename_kind];

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Apply pending schema migrations. Safe to run on every open.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to read schema version: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(version as usize) {
            migration(&conn)
                .map_err(|e| AppError::Internal(format!("Migration {} failed: {}", i + 1, e)))?;
            conn.pragma_update(None, "user_version", (i + 1) as i64)
                .map_err(|e| AppError::Internal(format!("Failed to set schema version: {}", e)))?;
        }

        Ok(())
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert or update a book from the import path.
    ///
    /// On md5 conflict the existing row's reading progress and pin state
    /// (`created_at`, `chapter_name`, `chapter_index`, `chapter_offset`,
    /// `text_offset`, `sort_weight`) are copied onto the incoming record
    /// before writing, so a re-import never regresses progress.
    /// Returns the stored record with its assigned id.
    pub fn upsert_book(&self, book: &Book) -> Result<Book> {
        let conn = self.conn.lock();

        let mut record = book.clone();
        if let Some(existing) = Self::book_by_md5(&conn, &book.md5)? {
            record.created_at = existing.created_at;
            record.chapter_name = existing.chapter_name;
            record.chapter_index = existing.chapter_index;
            record.chapter_offset = existing.chapter_offset;
            record.text_offset = existing.text_offset;
            record.sort_weight = existing.sort_weight;
        }

        Self::write_book(&conn, &record)?;
        Self::book_by_md5(&conn, &record.md5)?
            .ok_or_else(|| AppError::Internal(format!("Book vanished after write: {}", record.md5)))
    }

    /// Insert or update a book from the progress path: the incoming record
    /// is the authoritative current state and overwrites the stored row.
    pub fn update_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        Self::write_book(&conn, book)
    }

    fn write_book(conn: &Connection, book: &Book) -> Result<()> {
        conn.execute(
            "INSERT INTO books
             (md5, path, name, author, fmt, encoding, chapter_index, chapter_name,
              chapter_count, chapter_offset, text_offset, text_total, sort_weight,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT (md5) DO UPDATE SET
                path = excluded.path,
                name = excluded.name,
                author = excluded.author,
                fmt = excluded.fmt,
                encoding = excluded.encoding,
                chapter_index = excluded.chapter_index,
                chapter_name = excluded.chapter_name,
                chapter_count = excluded.chapter_count,
                chapter_offset = excluded.chapter_offset,
                text_offset = excluded.text_offset,
                text_total = excluded.text_total,
                sort_weight = excluded.sort_weight,
                updated_at = excluded.updated_at",
            params![
                book.md5,
                book.path,
                book.name,
                book.author,
                book.format.code(),
                book.encoding,
                book.chapter_index,
                book.chapter_name,
                book.chapter_count,
                book.chapter_offset,
                book.text_offset,
                book.text_total,
                book.sort_weight,
                book.created_at,
                book.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save book: {}", e)))?;
        Ok(())
    }

    /// Delete a book by md5. Returns false when the row was absent.
    pub fn delete_book(&self, md5: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE md5 = ?1", params![md5])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Point lookup by md5.
    pub fn get_book(&self, md5: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        Self::book_by_md5(&conn, md5)
    }

    fn book_by_md5(conn: &Connection, md5: &str) -> Result<Option<Book>> {
        conn.query_row(
            &format!("SELECT {} FROM books WHERE md5 = ?1", BOOK_COLUMNS),
            params![md5],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Substring search on the name, pinned books first, most recent next.
    /// The pattern is wildcard-wrapped when the caller supplied none.
    pub fn search_books(&self, name_pattern: &str, limit: usize) -> Result<Vec<Book>> {
        let pattern = if name_pattern.contains('%') {
            name_pattern.to_string()
        } else {
            format!("%{}%", name_pattern)
        };

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books WHERE name LIKE ?1
                 ORDER BY sort_weight DESC, updated_at DESC LIMIT ?2",
                BOOK_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params![pattern, limit as i64], Self::row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to search books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// All books, pinned books first, most recent next.
    pub fn iter_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books ORDER BY sort_weight DESC, updated_at DESC",
                BOOK_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], Self::row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Current maximum sort weight, 0.0 when the library is empty.
    /// Used to compute the next pin rank.
    pub fn max_sort_weight(&self) -> Result<f64> {
        let conn = self.conn.lock();
        let max: Option<f64> = conn
            .query_row("SELECT MAX(sort_weight) FROM books", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to get max sort weight: {}", e)))?;
        Ok(max.unwrap_or(0.0))
    }

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        let fmt_code: i64 = row.get(5)?;
        let format = BookFormat::from_code(fmt_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Integer,
                format!("unknown book format code {}", fmt_code).into(),
            )
        })?;

        Ok(Book {
            id: row.get(0)?,
            md5: row.get(1)?,
            path: row.get(2)?,
            name: row.get(3)?,
            author: row.get(4)?,
            format,
            encoding: row.get(6)?,
            chapter_index: row.get(7)?,
            chapter_name: row.get(8)?,
            chapter_count: row.get(9)?,
            chapter_offset: row.get(10)?,
            text_offset: row.get(11)?,
            text_total: row.get(12)?,
            sort_weight: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    // ========== READING TIME OPERATIONS ==========

    /// Merge-or-insert a reading-time entry.
    ///
    /// At most one row exists per (md5, mode, chapter, calendar day): any
    /// rows already in that bucket are folded into the incoming entry
    /// (summing words and seconds, keeping the earliest row's id and
    /// timestamp) and the extras are deleted. Returns the persisted entry.
    pub fn save_time_read(&self, entry: &ReadingTimeEntry) -> Result<ReadingTimeEntry> {
        let conn = self.conn.lock();

        let day = calendar_day(entry.timestamp);
        let existing =
            Self::bucket_entries(&conn, &entry.md5, entry.mode, entry.chapter_index, day)?;

        let mut merged = entry.clone();
        if let Some(first) = existing.first() {
            merged.id = first.id;
            merged.timestamp = first.timestamp;
        }
        for old in &existing {
            merged.words += old.words;
            merged.seconds += old.seconds;
        }
        if existing.len() > 1 {
            warn!(
                md5 = %entry.md5,
                chapter = entry.chapter_index,
                rows = existing.len(),
                "collapsing duplicate reading-time rows"
            );
        }

        let cal = calendar_day(merged.timestamp);
        if merged.id == 0 {
            conn.execute(
                "INSERT INTO reading_time
                 (md5, book_name, chapter_index, mode, timestamp, day, week, month, year,
                  words, seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    merged.md5,
                    merged.book_name,
                    merged.chapter_index,
                    merged.mode.code(),
                    merged.timestamp,
                    cal.day,
                    cal.week,
                    cal.month,
                    cal.year,
                    merged.words,
                    merged.seconds,
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to save reading time: {}", e)))?;
            merged.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE reading_time SET
                    md5 = ?2, book_name = ?3, chapter_index = ?4, mode = ?5, timestamp = ?6,
                    day = ?7, week = ?8, month = ?9, year = ?10, words = ?11, seconds = ?12
                 WHERE id = ?1",
                params![
                    merged.id,
                    merged.md5,
                    merged.book_name,
                    merged.chapter_index,
                    merged.mode.code(),
                    merged.timestamp,
                    cal.day,
                    cal.week,
                    cal.month,
                    cal.year,
                    merged.words,
                    merged.seconds,
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update reading time: {}", e)))?;
        }

        for stale in existing.iter().skip(1) {
            conn.execute("DELETE FROM reading_time WHERE id = ?1", params![stale.id])
                .map_err(|e| {
                    AppError::Internal(format!("Failed to delete duplicate entry: {}", e))
                })?;
        }

        Ok(merged)
    }

    fn bucket_entries(
        conn: &Connection,
        md5: &str,
        mode: ReadingMode,
        chapter_index: i64,
        day: CalendarDay,
    ) -> Result<Vec<ReadingTimeEntry>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM reading_time
                 WHERE md5 = ?1 AND mode = ?2 AND chapter_index = ?3
                   AND day = ?4 AND month = ?5 AND year = ?6
                 ORDER BY timestamp ASC",
                ENTRY_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(
                params![md5, mode.code(), chapter_index, day.day, day.month, day.year],
                Self::row_to_entry,
            )
            .map_err(|e| AppError::Internal(format!("Failed to query reading time: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect entries: {}", e)))?;

        Ok(entries)
    }

    /// Reading-time entries matching the filter, oldest first.
    pub fn query_time(&self, filter: &TimeFilter) -> Result<Vec<ReadingTimeEntry>> {
        let (where_clause, values) = Self::filter_clause(filter);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM reading_time WHERE {} ORDER BY timestamp ASC",
                ENTRY_COLUMNS, where_clause
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params_from_iter(values), Self::row_to_entry)
            .map_err(|e| AppError::Internal(format!("Failed to query reading time: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect entries: {}", e)))?;

        Ok(entries)
    }

    /// Sum seconds and words over all entries matching the filter.
    pub fn aggregate_time(&self, filter: &TimeFilter) -> Result<TimeTotals> {
        let (where_clause, values) = Self::filter_clause(filter);

        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(seconds), 0), COALESCE(SUM(words), 0)
                 FROM reading_time WHERE {}",
                where_clause
            ),
            params_from_iter(values),
            |row| {
                Ok(TimeTotals {
                    seconds: row.get(0)?,
                    words: row.get(1)?,
                })
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to aggregate reading time: {}", e)))
    }

    fn filter_clause(filter: &TimeFilter) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(md5) = &filter.md5 {
            conditions.push("md5 = ?");
            values.push(Value::Text(md5.clone()));
        }
        if let Some(day) = filter.day {
            conditions.push("day = ?");
            values.push(Value::Integer(day as i64));
        }
        if let Some(week) = filter.week {
            conditions.push("week = ?");
            values.push(Value::Integer(week as i64));
        }
        if let Some(month) = filter.month {
            conditions.push("month = ?");
            values.push(Value::Integer(month as i64));
        }
        if let Some(year) = filter.year {
            conditions.push("year = ?");
            values.push(Value::Integer(year as i64));
        }

        let clause = if conditions.is_empty() {
            "1".to_string()
        } else {
            conditions.join(" AND ")
        };
        (clause, values)
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReadingTimeEntry> {
        let mode_code: i64 = row.get(4)?;
        let mode = ReadingMode::from_code(mode_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Integer,
                format!("unknown reading mode code {}", mode_code).into(),
            )
        })?;

        Ok(ReadingTimeEntry {
            id: row.get(0)?,
            md5: row.get(1)?,
            book_name: row.get(2)?,
            chapter_index: row.get(3)?,
            mode,
            timestamp: row.get(5)?,
            words: row.get(6)?,
            seconds: row.get(7)?,
        })
    }

    // ========== AGGREGATE CONVENIENCE ==========

    /// Totals for today, optionally restricted to one book.
    pub fn time_today(&self, md5: Option<&str>) -> Result<TimeTotals> {
        let today = calendar_day(now_timestamp());
        self.aggregate_time(&TimeFilter {
            md5: md5.map(str::to_string),
            day: Some(today.day),
            month: Some(today.month),
            year: Some(today.year),
            ..TimeFilter::default()
        })
    }

    /// Totals for the current week.
    pub fn time_this_week(&self, md5: Option<&str>) -> Result<TimeTotals> {
        let today = calendar_day(now_timestamp());
        self.aggregate_time(&TimeFilter {
            md5: md5.map(str::to_string),
            week: Some(today.week),
            year: Some(today.year),
            ..TimeFilter::default()
        })
    }

    /// Totals for the current month.
    pub fn time_this_month(&self, md5: Option<&str>) -> Result<TimeTotals> {
        let today = calendar_day(now_timestamp());
        self.aggregate_time(&TimeFilter {
            md5: md5.map(str::to_string),
            month: Some(today.month),
            year: Some(today.year),
            ..TimeFilter::default()
        })
    }

    /// Totals for the current year.
    pub fn time_this_year(&self, md5: Option<&str>) -> Result<TimeTotals> {
        let today = calendar_day(now_timestamp());
        self.aggregate_time(&TimeFilter {
            md5: md5.map(str::to_string),
            year: Some(today.year),
            ..TimeFilter::default()
        })
    }

    /// All-time totals.
    pub fn time_all(&self, md5: Option<&str>) -> Result<TimeTotals> {
        self.aggregate_time(&TimeFilter {
            md5: md5.map(str::to_string),
            ..TimeFilter::default()
        })
    }
}

const BOOK_COLUMNS: &str = "id, md5, path, name, author, fmt, encoding, chapter_index, \
     chapter_name, chapter_count, chapter_offset, text_offset, text_total, sort_weight, \
     created_at, updated_at";

const ENTRY_COLUMNS: &str =
    "id, md5, book_name, chapter_index, mode, timestamp, words, seconds";

/// Initial schema. Early shape: books had no author, chapter_name or
/// sort_weight, and the reading-time mode column was named `kind`.
fn migrate_base(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY,
            md5 TEXT NOT NULL UNIQUE,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            fmt INTEGER NOT NULL DEFAULT 0,
            encoding TEXT,
            chapter_index INTEGER NOT NULL DEFAULT 0,
            chapter_count INTEGER NOT NULL DEFAULT 0,
            chapter_offset INTEGER NOT NULL DEFAULT 0,
            text_offset INTEGER NOT NULL DEFAULT 0,
            text_total INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reading_time (
            id INTEGER PRIMARY KEY,
            md5 TEXT NOT NULL,
            book_name TEXT NOT NULL,
            kind INTEGER NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL,
            day INTEGER NOT NULL,
            week INTEGER NOT NULL,
            month INTEGER NOT NULL,
            year INTEGER NOT NULL,
            words INTEGER NOT NULL DEFAULT 0,
            seconds INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_books_name ON books(name);
        CREATE INDEX IF NOT EXISTS idx_books_updated ON books(updated_at);
        CREATE INDEX IF NOT EXISTS idx_books_path ON books(path);

        CREATE INDEX IF NOT EXISTS idx_rt_md5_day ON reading_time(md5, day);
        CREATE INDEX IF NOT EXISTS idx_rt_day ON reading_time(day);
        CREATE INDEX IF NOT EXISTS idx_rt_month ON reading_time(month);
        CREATE INDEX IF NOT EXISTS idx_rt_year ON reading_time(year);
        CREATE INDEX IF NOT EXISTS idx_rt_md5_year_month ON reading_time(md5, year, month);
        CREATE INDEX IF NOT EXISTS idx_rt_md5_year_week ON reading_time(md5, year, week);
        CREATE INDEX IF NOT EXISTS idx_rt_year_month ON reading_time(year, month);
        CREATE INDEX IF NOT EXISTS idx_rt_year_week ON reading_time(year, week);
        "#,
    )
}

/// Additive columns, each guarded by a presence check so partially
/// migrated databases from before versioning converge to the same shape.
fn migrate_add_columns(conn: &Connection) -> rusqlite::Result<()> {
    if !column_exists(conn, "books", "author")? {
        conn.execute(
            "ALTER TABLE books ADD COLUMN author TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    if !column_exists(conn, "books", "chapter_name")? {
        conn.execute(
            "ALTER TABLE books ADD COLUMN chapter_name TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    if !column_exists(conn, "books", "sort_weight")? {
        conn.execute(
            "ALTER TABLE books ADD COLUMN sort_weight REAL NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !column_exists(conn, "reading_time", "chapter_index")? {
        conn.execute(
            "ALTER TABLE reading_time ADD COLUMN chapter_index INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

/// Rename the legacy `kind` column to `mode`. When in-place rename is
/// unsupported, fall back to add-new-column plus copy, leaving the old
/// column in place rather than risk data loss.
fn migrate_rename_kind(conn: &Connection) -> rusqlite::Result<()> {
    if column_exists(conn, "reading_time", "mode")? {
        return Ok(());
    }
    if !column_exists(conn, "reading_time", "kind")? {
        conn.execute(
            "ALTER TABLE reading_time ADD COLUMN mode INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        return Ok(());
    }

    match conn.execute("ALTER TABLE reading_time RENAME COLUMN kind TO mode", []) {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(error = %e, "column rename unsupported, copying data instead");
            conn.execute(
                "ALTER TABLE reading_time ADD COLUMN mode INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            conn.execute(
                "UPDATE reading_time SET mode = kind WHERE kind IS NOT NULL",
                [],
            )?;
            Ok(())
        }
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
