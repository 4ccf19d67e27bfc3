use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::accounts::AccountService;
use crate::auth::session::{MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::config::{Config, SessionBackend};
use crate::dogs::{DogRepository, SqliteDogRepository};
use crate::error::AppResult;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Everything a handler needs, passed in through axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub dogs: Arc<dyn DogRepository>,
    pub accounts: AccountService,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> AppResult<Self> {
        let sessions: Arc<dyn SessionStore> = match config.auth.session_store {
            SessionBackend::Sqlite => Arc::new(SqliteSessionStore::new(pool.clone())),
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        };

        let accounts = AccountService::new(
            pool.clone(),
            sessions,
            config.auth.bcrypt_cost,
            config.auth.session_hours,
        )?;
        let dogs = Arc::new(SqliteDogRepository::new(
            pool,
            config.dogs.placeholder_image.clone(),
        ));

        Ok(Self {
            config,
            dogs,
            accounts,
        })
    }
}
