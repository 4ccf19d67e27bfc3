use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, ErrorCode};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use crate::auth::password::{hash_password, verify_password, MAX_PASSWORD_BYTES};
use crate::auth::session::{SessionStore, SessionToken};
use crate::config::SESSION_HOURS_RANGE;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /register` and `POST /login`.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            password: password.to_string(),
        }
    }

    /// Full validation of a new account's username and password.
    pub fn for_registration(form: &CredentialsForm) -> AppResult<Self> {
        let creds = Self::from_form(form)?;

        let name_len = creds.username.chars().count();
        if !USERNAME_LEN.contains(&name_len) {
            return Err(AppError::MalformedInput(format!(
                "Username must be {} to {} characters",
                USERNAME_LEN.start(),
                USERNAME_LEN.end()
            )));
        }
        if !creds
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(AppError::MalformedInput(
                "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
            ));
        }
        if creds.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::MalformedInput(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }
        // bcrypt only reads the first 72 bytes.
        if creds.password.len() > MAX_PASSWORD_BYTES {
            return Err(AppError::MalformedInput(format!(
                "Password must be at most {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }

        Ok(creds)
    }

    /// Login only needs both fields present; anything else is a credential failure.
    pub fn for_login(form: &CredentialsForm) -> AppResult<Self> {
        Self::from_form(form)
    }

    fn from_form(form: &CredentialsForm) -> AppResult<Self> {
        let username = form.username.as_deref().map(str::trim).unwrap_or_default();
        let password = form.password.as_deref().unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::MalformedInput(
                "Username and password are required".to_string(),
            ));
        }
        Ok(Self::new(username, password))
    }
}

/// Registration, credential checks and the session contract.
#[derive(Clone)]
pub struct AccountService {
    pool: DbPool,
    sessions: Arc<dyn SessionStore>,
    bcrypt_cost: u32,
    session_ttl: Duration,
    /// Hash verified against when the username is unknown, so both
    /// failure paths pay for one bcrypt verification.
    dummy_hash: Arc<str>,
}

impl AccountService {
    pub fn new(
        pool: DbPool,
        sessions: Arc<dyn SessionStore>,
        bcrypt_cost: u32,
        session_hours: u64,
    ) -> AppResult<Self> {
        let dummy_hash = bcrypt::hash("no-such-account", bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;
        let session_hours =
            session_hours.clamp(*SESSION_HOURS_RANGE.start(), *SESSION_HOURS_RANGE.end());

        Ok(Self {
            pool,
            sessions,
            bcrypt_cost,
            session_ttl: Duration::hours(session_hours as i64),
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Create an account and log it in.
    pub async fn register(&self, creds: Credentials) -> AppResult<(Account, SessionToken)> {
        if self.find_by_username(&creds.username).await?.is_some() {
            return Err(AppError::DuplicateUsername(creds.username));
        }

        let password_hash = hash_password(creds.password, self.bcrypt_cost).await?;
        let account = Account {
            id: uuid::Uuid::now_v7().to_string(),
            username: creds.username,
            created_at: Utc::now(),
        };

        let inserted = {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    account.id,
                    account.username,
                    password_hash,
                    account.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
                ],
            )
        };
        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent registration.
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(AppError::DuplicateUsername(account.username));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(username = %account.username, "Account registered");
        let token = self.serialize_session(&account).await?;
        Ok((account, token))
    }

    /// Check a username/password pair and log the account in.
    pub async fn authenticate(&self, creds: Credentials) -> AppResult<(Account, SessionToken)> {
        let stored = self.load_credentials(&creds.username).await?;

        let (account, hash) = match stored {
            Some(found) => found,
            None => {
                let _ = verify_password(creds.password, self.dummy_hash.to_string()).await?;
                tracing::warn!(username = %creds.username, "Login failed");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !verify_password(creds.password, hash).await? {
            tracing::warn!(username = %account.username, "Login failed");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.serialize_session(&account).await?;
        Ok((account, token))
    }

    pub async fn serialize_session(&self, account: &Account) -> AppResult<SessionToken> {
        self.sessions.issue(&account.id, self.session_ttl).await
    }

    /// Account behind `token`, or `None` for anonymous.
    pub async fn deserialize_session(&self, token: &SessionToken) -> AppResult<Option<Account>> {
        match self.sessions.lookup(token).await? {
            Some(user_id) => self.find_by_id(&user_id).await,
            None => Ok(None),
        }
    }

    pub async fn logout(&self, token: &SessionToken) -> AppResult<()> {
        self.sessions.revoke(token).await
    }

    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<Account>> {
        Ok(self.load_credentials(username).await?.map(|(account, _)| account))
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Account>> {
        let found = self.query_account(
            "SELECT id, username, created_at, password_hash FROM users WHERE id = ?1",
            id,
        )?;
        Ok(found.map(|(account, _)| account))
    }

    async fn load_credentials(&self, username: &str) -> AppResult<Option<(Account, String)>> {
        self.query_account(
            "SELECT id, username, created_at, password_hash FROM users WHERE username = ?1",
            username,
        )
    }

    fn query_account(&self, sql: &str, key: &str) -> AppResult<Option<(Account, String)>> {
        let conn = self.pool.get()?;
        let result = conn.query_row(sql, params![key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        });

        let (id, username, created_at, hash) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                AppError::StoreUnavailable(format!("bad created_at for {}: {}", username, e))
            })?;

        Ok(Some((
            Account {
                id,
                username,
                created_at,
            },
            hash,
        )))
    }
}
