mod chats;
mod tokens;
pub mod types;

pub use chats::SubmissionOutcome;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Sqlite-backed key-value store holding chat records, session history and API tokens.
///
/// Chat records follow a plain key-value layout (`chat:{id}` plus the ordered index
/// `user:chat:{userId}`). Writes that touch more than one key run inside a single
/// transaction, see [`ChatStore::record_submission`].
#[derive(Clone)]
pub struct ChatStore {
    db: Arc<Mutex<Connection>>,
}

impl ChatStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Connection::open(path)?;
        info!("Chat store opened at {}", path.display());
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS zset (
                set_key TEXT NOT NULL,
                member TEXT NOT NULL,
                score INTEGER NOT NULL,
                PRIMARY KEY (set_key, member)
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                job_id TEXT,
                message_id TEXT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER,
                seq INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id, id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_job_seq ON messages (job_id, seq);
            CREATE TABLE IF NOT EXISTS api_tokens (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        get_value(&db, key)
    }

    /// Members of the ordered set, highest score first.
    pub async fn zrevrange(&self, set_key: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT member, score FROM zset WHERE set_key = ?1
             ORDER BY score DESC, member ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![set_key, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

// Statement helpers shared by the async accessors and multi-statement transactions.

fn put_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value)
}

/// Add `member` to the ordered set, replacing its score when already present.
fn add_member(conn: &Connection, set_key: &str, score: i64, member: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO zset (set_key, member, score) VALUES (?1, ?2, ?3)
         ON CONFLICT(set_key, member) DO UPDATE SET score = excluded.score",
        params![set_key, member, score],
    )?;
    Ok(())
}
