//! # Local Store Module
//!
//! Durable client-side state for the driver runtime, kept in a small SQLite
//! key/value table so it survives restarts (the equivalent of a browser's
//! local storage).
//!
//! ## Well-known keys
//!
//! - `currentDelivery` - the serialized resident delivery, if any
//! - `wsDriverId` - the driver id of the last successfully opened channel
//! - `token` - the bearer token supplied by the host after login
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_track::driver_app::local_db::LocalStore;
//!
//! # async fn example() -> Result<(), sqlx::Error> {
//! let store = LocalStore::open(std::path::Path::new("/tmp/courier.db")).await?;
//! store.save_token("eyJ...").await?;
//! let credentials = store.load_credentials().await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;

use crate::driver_app::auth::Credentials;
use crate::shared::TrackingError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Result as SqlxResult, SqlitePool};
use std::path::Path;

/// Result type for local store operations
pub type Result<T> = SqlxResult<T>;

pub const CURRENT_DELIVERY_KEY: &str = "currentDelivery";
pub const DRIVER_ID_KEY: &str = "wsDriverId";
pub const TOKEN_KEY: &str = "token";

/// Local durable store
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open or create the store file
    ///
    /// Creates the parent directory if needed and uses WAL mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store, used by tests and ephemeral sessions
    pub async fn in_memory() -> Result<Self> {
        // One long-lived connection: each new in-memory connection is a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(schema::CREATE_KV_TABLE).execute(&self.pool).await?;
        sqlx::query(schema::CREATE_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if schema::needs_migration(current_version.0) {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(schema::CURRENT_SCHEMA_VERSION)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Close the pool; later operations on any clone fail with `PoolClosed`
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Read and deserialize a JSON record
    pub async fn load_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> std::result::Result<Option<T>, TrackingError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a JSON record
    pub async fn save_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> std::result::Result<(), TrackingError> {
        let raw = serde_json::to_string(value)?;
        self.put(key, &raw).await?;
        Ok(())
    }

    pub async fn save_token(&self, token: &str) -> Result<()> {
        self.put(TOKEN_KEY, token).await
    }

    pub async fn save_driver_id(&self, driver_id: &str) -> Result<()> {
        self.put(DRIVER_ID_KEY, driver_id).await
    }

    /// Persisted credentials, present only when both halves are stored
    pub async fn load_credentials(&self) -> Result<Option<Credentials>> {
        let token = self.get(TOKEN_KEY).await?;
        let driver_id = self.get(DRIVER_ID_KEY).await?;
        Ok(match (driver_id, token) {
            (Some(driver_id), Some(token)) => Some(Credentials { driver_id, token }),
            _ => None,
        })
    }

    /// Erase both the token and the driver id
    pub async fn clear_credentials(&self) -> Result<()> {
        self.remove(TOKEN_KEY).await?;
        self.remove(DRIVER_ID_KEY).await
    }
}
