use crate::api::models::{Agent, Conversation};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TOKEN_KEY: &str = "agent_token";
const AGENT_KEY: &str = "agent_profile";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("no data directory available")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub fn default_db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "tanzanite", "AgentDesk")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

/// Local persistence: session token, cached agent profile and the last
/// conversation list. Each call opens its own connection so the store can be
/// used from any thread.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.init()?;
        Ok(store)
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_db_path().ok_or(StorageError::NoDataDir)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Connection::open(&self.path)?)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                last_message TEXT NOT NULL,
                position INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT
            );
            "#,
        )?;
        Ok(())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn()?.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at
            "#,
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn()?.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn token(&self) -> Result<Option<String>> {
        Ok(self.get(TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    pub fn save_token(&self, token: &str) -> Result<()> {
        self.set(TOKEN_KEY, token)
    }

    pub fn agent(&self) -> Result<Option<Agent>> {
        match self.get(AGENT_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.set(AGENT_KEY, &serde_json::to_string(agent)?)
    }

    /// Forget the session: token and cached profile.
    pub fn clear_session(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM kv WHERE key IN (?1, ?2)", params![TOKEN_KEY, AGENT_KEY])?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the cached conversation list, keeping server order.
    pub fn replace_conversations(&self, conversations: &[Conversation]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM conversations", [])?;
        for (idx, c) in conversations.iter().enumerate() {
            let raw = serde_json::to_string(c)?;
            tx.execute(
                r#"
                INSERT INTO conversations (id, title, last_message, position, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    title=excluded.title,
                    last_message=excluded.last_message,
                    position=excluded.position,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![c.id, c.title(), c.preview(), idx as i64, now, raw],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn conversations(&self, limit: Option<usize>) -> Result<Vec<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, last_message, raw_json FROM conversations ORDER BY position ASC LIMIT ?1",
        )?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, title, last_message, raw) = r?;
            // Rows written by an older schema may lack the JSON copy.
            let conv = raw
                .and_then(|json| serde_json::from_str::<Conversation>(&json).ok())
                .unwrap_or_else(|| Conversation {
                    id,
                    visitor_name: title,
                    last_message,
                    ..Conversation::default()
                });
            out.push(conv);
        }
        Ok(out)
    }

    pub fn conversations_cached_at(&self) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let ts: Option<i64> = conn
            .query_row("SELECT MAX(updated_at) FROM conversations", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(ts)
    }
}
