pub mod accounts;
pub mod handlers;
pub mod password;
pub mod session;

pub use accounts::{Account, AccountService, Credentials, CredentialsForm};
pub use session::{MemorySessionStore, SessionStore, SessionToken, SqliteSessionStore};
