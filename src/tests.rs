use crate::chunk::{segment_chapters, split_text};
use crate::config::Config;
use crate::db::{
    Book, BookFormat, Database, ReadingMode, ReadingTimeEntry, TimeFilter, calendar_day,
    now_timestamp,
};
use crate::error::AppError;
use crate::import::{decode_text, detect_encoding, import_book, import_books};
use crate::session::{ChapterChange, ReadingSession, SessionState};
use crate::source::remote::{ApiEnvelope, SaveProgressPayload, ShelfBook, split_shelf_url};
use rusqlite::Connection;
use std::path::PathBuf;

// Noon UTC stays on one local calendar day for any timezone offset.
const NOON_TS: i64 = 1_750_000_000;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn sample_book(md5: &str, name: &str) -> Book {
    Book {
        id: 0,
        md5: md5.to_string(),
        path: format!("/books/{}.txt", md5),
        name: name.to_string(),
        author: String::new(),
        format: BookFormat::PlainText,
        encoding: Some("UTF-8".to_string()),
        chapter_index: 0,
        chapter_name: String::new(),
        chapter_count: 1,
        chapter_offset: 0,
        text_offset: 0,
        text_total: 100,
        sort_weight: 0.0,
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    }
}

fn sample_entry(md5: &str, timestamp: i64, words: i64, seconds: i64) -> ReadingTimeEntry {
    ReadingTimeEntry {
        id: 0,
        md5: md5.to_string(),
        book_name: "Test Book".to_string(),
        chapter_index: 0,
        mode: ReadingMode::Read,
        timestamp,
        words,
        seconds,
    }
}

fn write_book_file(dir: &std::path::Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Three-chapter fixture text with a long first chapter body.
fn chaptered_text() -> String {
    let body: String = "这是一句话。".repeat(150);
    format!("第一章 起点\n{}\n第二章 中途\n短文。\n第三章 终点\n结尾。", body)
}

// ========== CHUNKER ==========

#[test]
fn split_empty_text() {
    let split = split_text("", 0, 100);
    assert!(split.chunks.is_empty());
    assert_eq!(split.offsets, vec![0]);
    assert_eq!(split.resume_index, 0);
}

#[test]
fn split_covers_text_exactly() {
    let text = "一句。二句。三句。\n段落二开始。又一句。".repeat(20);
    let split = split_text(&text, 0, 17);

    assert_eq!(split.chunks.concat(), text);
    assert_eq!(split.offsets[0], 0);
    for pair in split.offsets.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    for (chunk, offset) in split.chunks.iter().zip(&split.offsets) {
        assert!(chunk.chars().count() <= 17);
        let expected: String = text.chars().skip(*offset).take(chunk.chars().count()).collect();
        assert_eq!(*chunk, expected);
    }
}

#[test]
fn split_prefers_paragraph_break() {
    let text = "甲甲甲甲甲\n乙乙乙乙乙乙乙乙乙乙乙乙";
    let split = split_text(text, 0, 10);
    assert_eq!(split.chunks[0], "甲甲甲甲甲\n");
}

#[test]
fn split_prefers_sentence_end_without_newline() {
    let text = "甲甲甲。乙乙乙乙乙乙乙乙乙乙乙乙";
    let split = split_text(text, 0, 10);
    assert_eq!(split.chunks[0], "甲甲甲。");
}

#[test]
fn split_hard_break_when_no_punctuation() {
    let text = "甲".repeat(25);
    let split = split_text(&text, 0, 10);
    assert_eq!(split.offsets, vec![0, 10, 20]);
}

#[test]
fn split_resume_lands_on_covering_chunk() {
    let text = "甲".repeat(100);
    let split = split_text(&text, 35, 10);
    assert_eq!(split.resume_index, 3);

    let past_end = split_text(&text, 5000, 10);
    assert_eq!(past_end.resume_index, past_end.chunks.len() - 1);
}

// ========== CHAPTER SEGMENTATION ==========

#[test]
fn segment_finds_chapters_with_offsets() {
    let text = "前言\n第一章 起点\n正文甲\n第二章 终点\n正文乙";
    let map = segment_chapters(text);
    assert_eq!(map.names, vec!["第一章 起点", "第二章 终点"]);
    assert_eq!(map.offsets, vec![3, 14]);
}

#[test]
fn segment_merges_volume_into_chapter_label() {
    let text = "第一卷 洪荒\n第一章 开端\n正文";
    let map = segment_chapters(text);
    assert_eq!(map.names, vec!["第一卷 洪荒 第一章 开端"]);
    // The volume line is remembered, not emitted as a chapter.
    assert_eq!(map.offsets, vec![7]);
}

#[test]
fn segment_accepts_numeric_and_compound_numerals() {
    let text = "第1章 阿拉伯\n文\n第一百二十三章 汉字\n文";
    let map = segment_chapters(text);
    assert_eq!(map.len(), 2);
}

#[test]
fn segment_falls_back_to_indented_headings() {
    let text = "　　第一章 缩进\n正文";
    let map = segment_chapters(text);
    assert_eq!(map.names, vec!["第一章 缩进"]);
    assert_eq!(map.offsets, vec![0]);
}

#[test]
fn segment_returns_empty_without_headings() {
    let map = segment_chapters("plain english text\nwith no headings");
    assert!(map.is_empty());
}

// ========== BOOK STORE ==========

#[test]
fn db_upsert_and_get_book() {
    let db = test_db();
    let stored = db.upsert_book(&sample_book("m1", "Alpha")).unwrap();
    assert!(stored.id > 0);

    let fetched = db.get_book("m1").unwrap().unwrap();
    assert_eq!(fetched.name, "Alpha");
    assert_eq!(fetched.format, BookFormat::PlainText);
    assert!(db.get_book("missing").unwrap().is_none());
}

#[test]
fn db_upsert_preserves_progress_on_reimport() {
    let db = test_db();
    let first = db.upsert_book(&sample_book("m1", "Alpha")).unwrap();

    let mut progressed = first.clone();
    progressed.chapter_index = 7;
    progressed.chapter_offset = 123;
    progressed.chapter_name = "第七章".to_string();
    progressed.text_offset = 9000;
    progressed.sort_weight = 2.0;
    db.update_book(&progressed).unwrap();

    // A fresh import record carries zeroed progress and a new created_at.
    let mut reimport = sample_book("m1", "Alpha Renamed");
    reimport.created_at = now_timestamp() + 999;
    let stored = db.upsert_book(&reimport).unwrap();

    assert_eq!(stored.name, "Alpha Renamed");
    assert_eq!(stored.chapter_index, 7);
    assert_eq!(stored.chapter_offset, 123);
    assert_eq!(stored.chapter_name, "第七章");
    assert_eq!(stored.text_offset, 9000);
    assert_eq!(stored.sort_weight, 2.0);
    assert_eq!(stored.created_at, first.created_at);
}

#[test]
fn db_update_book_overwrites() {
    let db = test_db();
    let stored = db.upsert_book(&sample_book("m1", "Alpha")).unwrap();

    let mut current = stored.clone();
    current.chapter_index = 3;
    current.chapter_offset = 42;
    db.update_book(&current).unwrap();

    let fetched = db.get_book("m1").unwrap().unwrap();
    assert_eq!(fetched.chapter_index, 3);
    assert_eq!(fetched.chapter_offset, 42);
}

#[test]
fn db_delete_then_reimport_starts_fresh() {
    let db = test_db();
    let stored = db.upsert_book(&sample_book("m1", "Alpha")).unwrap();

    let mut progressed = stored.clone();
    progressed.chapter_index = 5;
    db.update_book(&progressed).unwrap();

    assert!(db.delete_book("m1").unwrap());
    assert!(!db.delete_book("m1").unwrap());

    let stored = db.upsert_book(&sample_book("m1", "Alpha")).unwrap();
    assert_eq!(stored.chapter_index, 0);
}

#[test]
fn db_search_orders_pinned_then_recent() {
    let db = test_db();

    let mut a = sample_book("m1", "Alpha One");
    a.updated_at = 100;
    let mut b = sample_book("m2", "Alpha Two");
    b.updated_at = 200;
    let mut c = sample_book("m3", "Beta");
    c.sort_weight = 5.0;
    c.updated_at = 50;
    for book in [&a, &b, &c] {
        db.upsert_book(book).unwrap();
    }

    let all = db.iter_books().unwrap();
    let names: Vec<&str> = all.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["Beta", "Alpha Two", "Alpha One"]);

    // Bare substrings are wildcard-wrapped.
    let alphas = db.search_books("Alpha", 10).unwrap();
    assert_eq!(alphas.len(), 2);
    assert_eq!(alphas[0].name, "Alpha Two");

    let limited = db.search_books("%", 2).unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn db_max_sort_weight() {
    let db = test_db();
    assert_eq!(db.max_sort_weight().unwrap(), 0.0);

    let mut book = sample_book("m1", "Alpha");
    book.sort_weight = 5.0;
    db.upsert_book(&book).unwrap();
    assert_eq!(db.max_sort_weight().unwrap(), 5.0);
}

// ========== READING TIME ==========

#[test]
fn db_time_merges_same_day_bucket() {
    let db = test_db();
    db.save_time_read(&sample_entry("m1", NOON_TS, 100, 60)).unwrap();
    db.save_time_read(&sample_entry("m1", NOON_TS + 10, 150, 90)).unwrap();
    let merged = db
        .save_time_read(&sample_entry("m1", NOON_TS + 20, 200, 30))
        .unwrap();

    assert_eq!(merged.words, 450);
    assert_eq!(merged.seconds, 180);
    assert_eq!(merged.timestamp, NOON_TS);

    let rows = db
        .query_time(&TimeFilter {
            md5: Some("m1".to_string()),
            ..TimeFilter::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, merged.id);
}

#[test]
fn db_time_separate_buckets_per_chapter_and_mode() {
    let db = test_db();
    db.save_time_read(&sample_entry("m1", NOON_TS, 100, 60)).unwrap();

    let mut other_chapter = sample_entry("m1", NOON_TS + 5, 10, 6);
    other_chapter.chapter_index = 1;
    db.save_time_read(&other_chapter).unwrap();

    let mut listened = sample_entry("m1", NOON_TS + 5, 20, 12);
    listened.mode = ReadingMode::Listen;
    db.save_time_read(&listened).unwrap();

    let rows = db
        .query_time(&TimeFilter {
            md5: Some("m1".to_string()),
            ..TimeFilter::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn db_time_aggregates_by_calendar_filter() {
    let db = test_db();
    let old_ts = NOON_TS - 90 * 86_400;
    db.save_time_read(&sample_entry("m1", NOON_TS, 100, 60)).unwrap();
    db.save_time_read(&sample_entry("m1", old_ts, 200, 120)).unwrap();
    db.save_time_read(&sample_entry("m2", NOON_TS + 30, 50, 30)).unwrap();

    let cal = calendar_day(NOON_TS);
    let month = db
        .aggregate_time(&TimeFilter {
            md5: Some("m1".to_string()),
            month: Some(cal.month),
            year: Some(cal.year),
            ..TimeFilter::default()
        })
        .unwrap();
    assert_eq!(month.words, 100);
    assert_eq!(month.seconds, 60);

    // No md5 restriction sums the whole library.
    let day = db
        .aggregate_time(&TimeFilter {
            day: Some(cal.day),
            month: Some(cal.month),
            year: Some(cal.year),
            ..TimeFilter::default()
        })
        .unwrap();
    assert_eq!(day.words, 150);
    assert_eq!(day.seconds, 90);

    let all = db.time_all(Some("m1")).unwrap();
    assert_eq!(all.words, 300);
    assert_eq!(all.seconds, 180);
}

#[test]
fn db_time_empty_aggregate_is_zero() {
    let db = test_db();
    let totals = db.time_all(None).unwrap();
    assert_eq!(totals.seconds, 0);
    assert_eq!(totals.words, 0);
}

// ========== MIGRATIONS ==========

#[test]
fn migrate_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lectern.db");

    {
        let db = Database::open(&path).unwrap();
        db.upsert_book(&sample_book("m1", "Alpha")).unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.get_book("m1").unwrap().unwrap().name, "Alpha");
}

#[test]
fn migrate_upgrades_legacy_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE books (
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
            CREATE TABLE reading_time (
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
            PRAGMA user_version = 1;",
        )
        .unwrap();

        let cal = calendar_day(NOON_TS);
        conn.execute(
            "INSERT INTO reading_time
             (md5, book_name, kind, timestamp, day, week, month, year, words, seconds)
             VALUES ('m1', 'Alpha', 1, ?1, ?2, ?3, ?4, ?5, 100, 60)",
            rusqlite::params![NOON_TS, cal.day, cal.week, cal.month, cal.year],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO books
             (md5, path, name, created_at, updated_at)
             VALUES ('m1', '/books/m1.txt', 'Alpha', 1, 1)",
            [],
        )
        .unwrap();
    }

    let db = Database::open(&path).unwrap();

    let book = db.get_book("m1").unwrap().unwrap();
    assert_eq!(book.author, "");
    assert_eq!(book.sort_weight, 0.0);

    let rows = db
        .query_time(&TimeFilter {
            md5: Some("m1".to_string()),
            ..TimeFilter::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].mode, ReadingMode::Listen);
    assert_eq!(rows[0].chapter_index, 0);
}

// ========== IMPORT ==========

#[test]
fn import_detects_encodings() {
    assert_eq!(detect_encoding("第一章 你好".as_bytes()).unwrap(), "UTF-8");

    let (gbk_bytes, _, _) = encoding_rs::GBK.encode("第一章 你好世界");
    let label = detect_encoding(&gbk_bytes).unwrap();
    assert_eq!(label, "GBK");
    assert_eq!(decode_text(&gbk_bytes, label).unwrap(), "第一章 你好世界");
}

#[test]
fn import_txt_book_stores_metadata_and_copy() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().join("data"));
    let db = test_db();

    let text = chaptered_text();
    let path = write_book_file(dir.path(), "我的小说.txt", &text);
    let book = import_book(&db, &config, &path).unwrap();

    assert_eq!(book.name, "我的小说");
    assert_eq!(book.format, BookFormat::PlainText);
    assert_eq!(book.encoding.as_deref(), Some("UTF-8"));
    assert_eq!(book.chapter_count, 3);
    assert_eq!(book.text_total, text.chars().count() as i64);
    assert!(config.books_dir.join(format!("{}.txt", book.md5)).exists());
    assert_eq!(db.get_book(&book.md5).unwrap().unwrap().id, book.id);
}

#[test]
fn import_headless_text_is_one_chapter() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().join("data"));
    let db = test_db();

    let path = write_book_file(dir.path(), "notes.txt", "no headings here\njust text");
    let book = import_book(&db, &config, &path).unwrap();
    assert_eq!(book.chapter_count, 1);
}

#[test]
fn import_reimport_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().join("data"));
    let db = test_db();

    let path = write_book_file(dir.path(), "book.txt", &chaptered_text());
    let book = import_book(&db, &config, &path).unwrap();

    let mut progressed = book.clone();
    progressed.chapter_index = 2;
    progressed.chapter_offset = 50;
    db.update_book(&progressed).unwrap();

    let again = import_book(&db, &config, &path).unwrap();
    assert_eq!(again.md5, book.md5);
    assert_eq!(again.chapter_index, 2);
    assert_eq!(again.chapter_offset, 50);
}

#[test]
fn import_rejects_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().join("data"));
    let db = test_db();

    let path = write_book_file(dir.path(), "book.epub", "data");
    let err = import_book(&db, &config, &path).unwrap_err();
    assert!(matches!(err, AppError::UnsupportedFormat(_)));
}

#[test]
fn import_batch_collects_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().join("data"));
    let db = test_db();

    let good = write_book_file(dir.path(), "good.txt", &chaptered_text());
    let bad = dir.path().join("missing.txt");
    let report = import_books(&db, &config, &[good, bad.clone()]);

    assert!(!report.is_complete());
    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, bad);
    assert!(matches!(report.failures[0].1, AppError::Io(_)));
}

// ========== SESSION ==========

fn session_fixture(text: &str) -> (tempfile::TempDir, Database, Config, String) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::at(dir.path().join("data"));
    config.chunk_chars = 300;
    let db = test_db();

    let path = write_book_file(dir.path(), "book.txt", text);
    let book = import_book(&db, &config, &path).unwrap();
    let md5 = book.md5;
    (dir, db, config, md5)
}

#[test]
fn session_open_resumes_mid_chapter() {
    let text = chaptered_text();
    let (_dir, db, config, md5) = session_fixture(&text);

    let mut progressed = db.get_book(&md5).unwrap().unwrap();
    progressed.chapter_offset = 400;
    db.update_book(&progressed).unwrap();

    let mut session = ReadingSession::new(db, config);
    let opened = session.open(&md5).unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(opened.chapter_index, 0);
    assert_eq!(opened.chapter_name, "第一章 起点");
    assert!(opened.chunk_count > 1);
    assert!(opened.chunk_index > 0);
    assert!(session.chunk().is_some());
}

#[test]
fn session_chapter_navigation_reports_boundaries() {
    let (_dir, db, config, md5) = session_fixture(&chaptered_text());
    let mut session = ReadingSession::new(db.clone(), config);
    session.open(&md5).unwrap();

    assert_eq!(session.prev_chapter().unwrap(), ChapterChange::AtFirst);
    assert_eq!(session.goto_chapter(3).unwrap(), ChapterChange::AtLast);

    let change = session.next_chapter().unwrap();
    assert_eq!(
        change,
        ChapterChange::Moved {
            index: 1,
            name: "第二章 中途".to_string()
        }
    );

    // Navigation persists the new position.
    let stored = db.get_book(&md5).unwrap().unwrap();
    assert_eq!(stored.chapter_index, 1);
    assert_eq!(stored.chapter_offset, 0);
    assert_eq!(stored.chapter_name, "第二章 中途");
}

#[test]
fn session_record_position_accounts_time() {
    let (_dir, db, config, md5) = session_fixture(&chaptered_text());
    let mut session = ReadingSession::new(db.clone(), config);
    session.open(&md5).unwrap();

    let first_chunk_chars = session.chunk().unwrap().chars().count() as i64;
    session.record_position(0).unwrap();
    session.record_position(1).unwrap();

    let stored = db.get_book(&md5).unwrap().unwrap();
    assert!(stored.chapter_offset > 0);
    assert!(stored.text_offset >= stored.chapter_offset);

    let totals = db.time_all(Some(&md5)).unwrap();
    assert!(totals.words >= first_chunk_chars);
}

#[test]
fn session_sync_position_rejects_out_of_range() {
    let (_dir, db, config, md5) = session_fixture(&chaptered_text());
    let mut session = ReadingSession::new(db, config);
    session.open(&md5).unwrap();

    assert!(!session.sync_position(9999));
}

#[test]
fn session_open_missing_book_errors() {
    let db = test_db();
    let mut session = ReadingSession::new(db, Config::default());

    let err = session.open("nope").unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(session.state(), SessionState::Error);
}

#[test]
fn session_open_unreadable_format_errors() {
    let db = test_db();
    let mut book = sample_book("m1", "Scanned");
    book.format = BookFormat::Pdf;
    db.upsert_book(&book).unwrap();

    let mut session = ReadingSession::new(db, Config::default());
    let err = session.open("m1").unwrap_err();
    assert!(matches!(err, AppError::UnsupportedFormat(_)));
    assert_eq!(session.state(), SessionState::Error);
}

#[test]
fn session_generation_bumps_on_open_and_close() {
    let (_dir, db, config, md5) = session_fixture(&chaptered_text());
    let mut session = ReadingSession::new(db, config);
    let g0 = session.generation();

    session.open(&md5).unwrap();
    let g1 = session.generation();
    assert!(g1 > g0);

    session.close();
    assert!(session.generation() > g1);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.book().is_none());
    assert!(session.record_position(0).is_err());
}

#[test]
fn session_stats_roll_up_recorded_time() {
    let (_dir, db, config, md5) = session_fixture(&chaptered_text());
    let mut session = ReadingSession::new(db, config);
    session.open(&md5).unwrap();
    session.record_position(0).unwrap();

    let stats = session.stats().unwrap();
    assert!(stats.today.words > 0);
    assert_eq!(stats.all.words, stats.today.words);
    assert_eq!(stats.year.words, stats.today.words);
}

// ========== REMOTE PROTOCOL ==========

#[test]
fn remote_shelf_url_parsing() {
    let (base, bn) = split_shelf_url("http://10.0.0.5:1122?bn=2").unwrap();
    assert_eq!(base, "http://10.0.0.5:1122");
    assert_eq!(bn, 2);

    let (base, bn) = split_shelf_url("http://host/reader3/?bn=0").unwrap();
    assert_eq!(base, "http://host/reader3");
    assert_eq!(bn, 0);

    // No bn parameter means the first shelf slot.
    let (base, bn) = split_shelf_url("http://host:1122").unwrap();
    assert_eq!(base, "http://host:1122");
    assert_eq!(bn, 0);

    assert!(matches!(
        split_shelf_url("http://host?bn=abc").unwrap_err(),
        AppError::Remote(_)
    ));
}

#[test]
fn remote_shelf_response_deserializes() {
    let json = r#"{
        "isSuccess": true,
        "errorMsg": "",
        "data": [{
            "name": "雪中",
            "author": "烽火",
            "bookUrl": "https://example.com/book/1",
            "durChapterIndex": 12,
            "durChapterPos": 345,
            "durChapterTitle": "第十三章"
        }]
    }"#;
    let envelope: ApiEnvelope<Vec<ShelfBook>> = serde_json::from_str(json).unwrap();
    assert!(envelope.is_success);

    let shelf = envelope.data.unwrap();
    assert_eq!(shelf[0].name, "雪中");
    assert_eq!(shelf[0].dur_chapter_index, 12);
    assert_eq!(shelf[0].dur_chapter_pos, 345);
    assert_eq!(shelf[0].dur_chapter_title, "第十三章");
}

#[test]
fn remote_failure_envelope_carries_message() {
    let json = r#"{"isSuccess": false, "errorMsg": "no such book"}"#;
    let envelope: ApiEnvelope<String> = serde_json::from_str(json).unwrap();
    assert!(!envelope.is_success);
    assert_eq!(envelope.error_msg, "no such book");
    assert!(envelope.data.is_none());
}

#[test]
fn remote_progress_payload_uses_service_field_names() {
    let payload = SaveProgressPayload {
        name: "雪中".to_string(),
        author: "烽火".to_string(),
        dur_chapter_index: 12,
        dur_chapter_pos: 345,
        dur_chapter_time: 1_700_000_000_000,
        dur_chapter_title: "第十三章".to_string(),
    };
    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["durChapterIndex"], 12);
    assert_eq!(value["durChapterPos"], 345);
    assert_eq!(value["durChapterTime"], 1_700_000_000_000i64);
    assert_eq!(value["durChapterTitle"], "第十三章");
    assert_eq!(value["name"], "雪中");
}

// ========== CONFIG / ERRORS ==========

#[test]
fn config_defaults_and_at() {
    let config = Config::default();
    assert_eq!(config.remote_timeout_secs, 10);
    assert_eq!(config.chunk_chars, 1000);

    let rooted = Config::at(PathBuf::from("/tmp/lectern-test"));
    assert_eq!(rooted.books_dir, PathBuf::from("/tmp/lectern-test/books"));
    assert_eq!(rooted.database, PathBuf::from("/tmp/lectern-test/lectern.db"));
}

#[test]
fn config_load_fills_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "chunk_chars = 500\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.chunk_chars, 500);
    assert_eq!(config.remote_timeout_secs, 10);

    assert!(matches!(
        Config::load(&dir.path().join("absent.toml")).unwrap_err(),
        AppError::Config(_)
    ));
}

#[test]
fn error_retryable_classification() {
    assert!(AppError::Remote("timeout".to_string()).is_retryable());
    assert!(AppError::Io(std::io::Error::other("disk")).is_retryable());
    assert!(!AppError::Config("bad".to_string()).is_retryable());
    assert!(!AppError::UnsupportedFormat("pdf".to_string()).is_retryable());
}
