use crate::blocks::blocks_to_value;
use crate::error::StoreError;
use crate::legacy::to_legacy_text;
use crate::store::{DocumentStore, DocumentUpdate, StoredDocument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{info, warn};

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init",
        up: "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                content TEXT,
                updated_at TEXT NOT NULL
            );",
    },
    Migration {
        version: 2,
        name: "blocks_content",
        up: "ALTER TABLE documents ADD COLUMN blocks_content TEXT;",
    },
];

/// SQLite-backed [`DocumentStore`]. `content` keeps the plain-text rendition
/// for older readers; `blocks_content` holds the JSON block array.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn latest_migration_version() -> i64 {
        MIGRATIONS.last().map(|migration| migration.version).unwrap_or(0)
    }

    pub fn current_schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        let current_version: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for migration in MIGRATIONS {
            if migration.version > current_version {
                let tx = conn.unchecked_transaction()?;
                tx.execute_batch(migration.up)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    params![migration.version, migration.name],
                )?;
                tx.commit()?;
                info!(version = migration.version, name = migration.name, "applied migration");
            }
        }

        Ok(())
    }

    /// Store a document that only has the plain-text column, as older
    /// writers left them.
    pub fn insert_legacy(&self, document_id: &str, title: &str, text: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (id, title, content, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![document_id, title, text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(stamp) => stamp.with_timezone(&Utc),
        Err(err) => {
            warn!(%raw, %err, "unreadable updated_at, using epoch");
            DateTime::<Utc>::default()
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn load(&self, document_id: &str) -> Result<StoredDocument, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT title, content, blocks_content, updated_at FROM documents WHERE id = ?1",
                [document_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((title, legacy_text, blocks_content, updated_at)) = row else {
            return Err(StoreError::NotFound(document_id.to_string()));
        };

        let structured_blocks = match blocks_content {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(document_id, %err, "discarding unreadable blocks_content");
                    None
                }
            },
            None => None,
        };

        Ok(StoredDocument {
            title,
            structured_blocks,
            legacy_text,
            updated_at: parse_timestamp(&updated_at),
        })
    }

    async fn save(
        &self,
        document_id: &str,
        update: DocumentUpdate,
    ) -> Result<DateTime<Utc>, StoreError> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO documents (id, title, updated_at) VALUES (?1, '', ?2)",
            params![document_id, stamp],
        )?;
        if let Some(title) = &update.title {
            tx.execute(
                "UPDATE documents SET title = ?1 WHERE id = ?2",
                params![title, document_id],
            )?;
        }
        if let Some(blocks) = &update.blocks {
            let json = serde_json::to_string(&blocks_to_value(blocks))?;
            tx.execute(
                "UPDATE documents SET blocks_content = ?1, content = ?2 WHERE id = ?3",
                params![json, to_legacy_text(blocks), document_id],
            )?;
        }
        tx.execute(
            "UPDATE documents SET updated_at = ?1 WHERE id = ?2",
            params![stamp, document_id],
        )?;
        tx.commit()?;
        Ok(now)
    }
}
