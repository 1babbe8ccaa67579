use crate::error::StoreError;
use crate::util::normalize_line_endings;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS progress (
    owner_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    chars_typed INTEGER NOT NULL DEFAULT 0,
    completed BOOLEAN NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (owner_id, book_id)
);

CREATE INDEX IF NOT EXISTS idx_progress_owner ON progress(owner_id);
"#;

/// Immutable text a session types against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceText {
    pub id: String,
    pub title: String,
    pub author: String,
    pub content: String,
}

/// Durable progress, one per (owner, reference)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub reference_id: String,
    pub owner_id: String,
    pub chars_typed: usize,
    pub completed: bool,
    /// Set by the store on write
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    pub fn new(owner_id: &str, reference_id: &str, chars_typed: usize, completed: bool) -> Self {
        Self {
            reference_id: reference_id.to_string(),
            owner_id: owner_id.to_string(),
            chars_typed,
            completed,
            updated_at: None,
        }
    }
}

/// Library row with the owner's progress, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub total_chars: usize,
    pub progress: Option<ProgressRecord>,
}

pub trait ReferenceSource {
    fn reference(&self, id: &str) -> Result<Option<ReferenceText>, StoreError>;
}

pub trait ProgressStore {
    fn progress(
        &self,
        owner_id: &str,
        reference_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError>;

    /// Insert or replace the single record for (owner, reference)
    fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError>;
}

/// SQLite-backed books and progress
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        if current < 1 {
            self.conn.execute_batch(SCHEMA_V1)?;
            self.conn.execute("PRAGMA user_version = 1", [])?;
        }

        Ok(())
    }

    /// Import a book; returns it with its assigned id. Line breaks are
    /// stored as `'\n'` so every one of them can be typed with Enter.
    pub fn add_book(
        &self,
        title: &str,
        author: &str,
        content: &str,
    ) -> Result<ReferenceText, StoreError> {
        let content = normalize_line_endings(content);
        self.conn.execute(
            "INSERT INTO books (title, author, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![title, author, &content, Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, title, "book added");

        Ok(ReferenceText {
            id: id.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            content,
        })
    }

    /// All books with `owner_id`'s progress, oldest first
    pub fn library(&self, owner_id: &str) -> Result<Vec<BookSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT b.id, b.title, b.author, length(b.content),
                   p.chars_typed, p.completed, p.updated_at
            FROM books b
            LEFT JOIN progress p
              ON p.book_id = CAST(b.id AS TEXT) AND p.owner_id = ?1
            ORDER BY b.id
            "#,
        )?;

        let rows = stmt.query_map([owner_id], |row| {
            let id: i64 = row.get(0)?;
            let chars_typed: Option<i64> = row.get(4)?;
            let progress = match chars_typed {
                Some(chars_typed) => Some(ProgressRecord {
                    reference_id: id.to_string(),
                    owner_id: owner_id.to_string(),
                    chars_typed: chars_typed.max(0) as usize,
                    completed: row.get(5)?,
                    updated_at: parse_timestamp(row.get(6)?, 6)?,
                }),
                None => None,
            };

            Ok(BookSummary {
                id: id.to_string(),
                title: row.get(1)?,
                author: row.get(2)?,
                total_chars: row.get::<_, i64>(3)?.max(0) as usize,
                progress,
            })
        })?;

        let mut books = Vec::new();
        for book in rows {
            books.push(book?);
        }
        Ok(books)
    }
}

fn parse_timestamp(value: String, column: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

impl ReferenceSource for SqliteStore {
    fn reference(&self, id: &str) -> Result<Option<ReferenceText>, StoreError> {
        let Ok(rowid) = id.parse::<i64>() else {
            return Ok(None);
        };

        let book = self
            .conn
            .query_row(
                "SELECT id, title, author, content FROM books WHERE id = ?1",
                [rowid],
                |row| {
                    Ok(ReferenceText {
                        id: row.get::<_, i64>(0)?.to_string(),
                        title: row.get(1)?,
                        author: row.get(2)?,
                        content: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(book)
    }
}

impl ProgressStore for SqliteStore {
    fn progress(
        &self,
        owner_id: &str,
        reference_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT chars_typed, completed, updated_at
                FROM progress
                WHERE owner_id = ?1 AND book_id = ?2
                "#,
                params![owner_id, reference_id],
                |row| {
                    Ok(ProgressRecord {
                        reference_id: reference_id.to_string(),
                        owner_id: owner_id.to_string(),
                        chars_typed: row.get::<_, i64>(0)?.max(0) as usize,
                        completed: row.get(1)?,
                        updated_at: parse_timestamp(row.get(2)?, 2)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO progress (owner_id, book_id, chars_typed, completed, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(owner_id, book_id) DO UPDATE SET
                chars_typed=excluded.chars_typed,
                completed=excluded.completed,
                updated_at=excluded.updated_at
            "#,
            params![
                record.owner_id,
                record.reference_id,
                record.chars_typed as i64,
                record.completed,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    books: HashMap<String, ReferenceText>,
    progress: HashMap<(String, String), ProgressRecord>,
    writes: Vec<ProgressRecord>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-process store; clones share state. Used by tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    pub fn insert_reference(&self, reference: ReferenceText) -> Result<(), StoreError> {
        self.lock()?
            .books
            .insert(reference.id.clone(), reference);
        Ok(())
    }

    /// Every successful upsert, in order
    pub fn writes(&self) -> Vec<ProgressRecord> {
        self.lock().map(|inner| inner.writes.clone()).unwrap_or_default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_reads = fail;
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_writes = fail;
        }
    }
}

impl ReferenceSource for MemoryStore {
    fn reference(&self, id: &str) -> Result<Option<ReferenceText>, StoreError> {
        let inner = self.lock()?;
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        Ok(inner.books.get(id).cloned())
    }
}

impl ProgressStore for MemoryStore {
    fn progress(
        &self,
        owner_id: &str,
        reference_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let inner = self.lock()?;
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        Ok(inner
            .progress
            .get(&(owner_id.to_string(), reference_id.to_string()))
            .cloned())
    }

    fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }

        let stored = ProgressRecord {
            updated_at: Some(Utc::now()),
            ..record.clone()
        };
        inner.progress.insert(
            (record.owner_id.clone(), record.reference_id.clone()),
            stored,
        );
        inner.writes.push(record.clone());
        Ok(())
    }
}
