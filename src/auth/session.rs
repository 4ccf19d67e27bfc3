use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::params;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::state::DbPool;

/// Opaque session identifier carried in the session cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(generate_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Maps session tokens to account ids.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session for `user_id` that expires after `ttl`.
    async fn issue(&self, user_id: &str, ttl: Duration) -> AppResult<SessionToken>;

    /// Account id bound to `token`, or `None` if unknown or expired.
    async fn lookup(&self, token: &SessionToken) -> AppResult<Option<String>>;

    /// Destroy the session. Unknown tokens are ignored.
    async fn revoke(&self, token: &SessionToken) -> AppResult<()>;

    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> AppResult<u64>;
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Durable sessions in the `sessions` table.
pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn issue(&self, user_id: &str, ttl: Duration) -> AppResult<SessionToken> {
        let conn = self.pool.get()?;
        let token = SessionToken::generate();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![token.as_str(), user_id, format_ts(&(now + ttl)), format_ts(&now)],
        )?;

        Ok(token)
    }

    async fn lookup(&self, token: &SessionToken) -> AppResult<Option<String>> {
        let conn = self.pool.get()?;
        let result = conn.query_row(
            "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2",
            params![token.as_str(), format_ts(&Utc::now())],
            |row| row.get(0),
        );

        match result {
            Ok(user_id) => Ok(Some(user_id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn revoke(&self, token: &SessionToken) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token.as_str()])?;
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_ts(&Utc::now())],
        )?;
        Ok(rows as u64)
    }
}

/// Process-local sessions for development; lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionToken, (String, DateTime<Utc>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn issue(&self, user_id: &str, ttl: Duration) -> AppResult<SessionToken> {
        let token = SessionToken::generate();
        self.sessions
            .lock()
            .await
            .insert(token.clone(), (user_id.to_string(), Utc::now() + ttl));
        Ok(token)
    }

    async fn lookup(&self, token: &SessionToken) -> AppResult<Option<String>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(user_id, _)| user_id.clone()))
    }

    async fn revoke(&self, token: &SessionToken) -> AppResult<()> {
        self.sessions.lock().await.remove(token);
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let now = Utc::now();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

/// Drop expired sessions every `every`, starting immediately.
pub fn spawn_purge_task(
    store: Arc<dyn SessionStore>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!("Purged {} expired sessions", purged),
                Err(e) => tracing::error!("Session purge failed: {}", e),
            }
        }
    })
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
