#![allow(dead_code)]

use dog_rescue::config::{Config, SessionBackend};
use dog_rescue::db;
use dog_rescue::state::DbPool;
use tempfile::TempDir;

pub const PLACEHOLDER: &str = "https://example.org/placeholder-dog.png";

/// Fresh migrated database in a temporary directory.
pub fn test_db() -> (TempDir, DbPool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("dogs.db")).expect("create test database");
    db::run_migrations(&pool).expect("run migrations");
    (temp_dir, pool)
}

pub fn test_config(backend: SessionBackend) -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.auth.session_store = backend;
    config.dogs.placeholder_image = PLACEHOLDER.to_string();
    config
}
