use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dog-rescue", about = "Adoptable dog listings")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "IP")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database holding dogs, accounts and sessions
    #[arg(long, env = "DATABASE_URL")]
    pub database: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub dogs: DogsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Sqlite,
    Memory,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub bcrypt_cost: u32,
    pub session_store: SessionBackend,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DogsConfig {
    pub placeholder_image: String,
}

pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "https://placedog.net/640/480?id=1";

/// Cost bounds accepted by bcrypt.
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Session lifetimes from one hour up to a year.
pub const SESSION_HOURS_RANGE: std::ops::RangeInclusive<u64> = 1..=8760;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "dog_rescue_session".to_string(),
            session_hours: 168,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            session_store: SessionBackend::Sqlite,
        }
    }
}

impl Default for DogsConfig {
    fn default() -> Self {
        Self {
            placeholder_image: DEFAULT_PLACEHOLDER_IMAGE.to_string(),
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI / env overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref database) = cli.database {
            config.database.path = Some(database.clone());
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("dogs.db"));
        }

        if !BCRYPT_COST_RANGE.contains(&config.auth.bcrypt_cost) {
            anyhow::bail!(
                "auth.bcrypt_cost must be between {} and {}",
                BCRYPT_COST_RANGE.start(),
                BCRYPT_COST_RANGE.end()
            );
        }
        if !SESSION_HOURS_RANGE.contains(&config.auth.session_hours) {
            anyhow::bail!(
                "auth.session_hours must be between {} and {}",
                SESSION_HOURS_RANGE.start(),
                SESSION_HOURS_RANGE.end()
            );
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".dog-rescue")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("dogs.db"))
    }
}
