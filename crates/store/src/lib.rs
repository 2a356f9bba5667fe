//! Relational persistence for the gateway: C1 (credential store) and C3
//! (session store) share one SQLite pool and one transactional boundary,
//! per `SPEC_FULL.md` §10.

pub mod credentials;
pub mod crypto;
pub mod migrate;
pub mod session_lock;
pub mod sessions;
pub mod users;

pub use credentials::CredentialStore;
pub use session_lock::SessionLockMap;
pub use sessions::SessionStore;
pub use users::UserStore;

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use sa_domain::error::{Error, Result};

/// Opens (creating if absent) the SQLite database at `path` and runs the
/// schema. A single pool backs all of users/api-keys/sessions/messages —
/// per §6 there is no migration story beyond create-on-first-run.
pub async fn connect(path: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(opts)
        .await
        .map_err(|e| Error::Internal(format!("opening database: {e}")))?;

    migrate::run(&pool).await?;
    Ok(pool)
}

/// Convenience bundle handed to the orchestrator: the two stores plus the
/// lock map that brackets session-store access around provider I/O.
#[derive(Clone)]
pub struct Store {
    pub credentials: Arc<CredentialStore>,
    pub sessions: Arc<SessionStore>,
    pub users: Arc<UserStore>,
    pub locks: Arc<SessionLockMap>,
}

impl Store {
    pub fn new(pool: SqlitePool, encryption_key: [u8; 32]) -> Self {
        Self {
            credentials: Arc::new(CredentialStore::new(pool.clone(), encryption_key)),
            sessions: Arc::new(SessionStore::new(pool.clone())),
            users: Arc::new(UserStore::new(pool)),
            locks: Arc::new(SessionLockMap::new()),
        }
    }
}
