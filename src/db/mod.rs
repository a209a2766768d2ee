mod security_event;
mod session;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use security_event::{SecurityEventRecord, SecurityEventStore};
pub use session::{DeviceInfo, NewSession, ReuseRevocation, Session, SessionStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // One row per grant; rotated in place.
                "CREATE TABLE sessions (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    current_hash TEXT NOT NULL,
                    previous_hash TEXT,
                    token_family TEXT NOT NULL,
                    expires_at INTEGER NOT NULL,
                    revoked_at INTEGER,
                    device_name TEXT,
                    device_type TEXT,
                    ip_address TEXT,
                    user_agent TEXT,
                    created_at INTEGER NOT NULL,
                    last_used_at INTEGER NOT NULL
                )",
                // At most one live row per hash.
                "CREATE UNIQUE INDEX idx_sessions_current_hash ON sessions(current_hash)
                    WHERE revoked_at IS NULL",
                "CREATE INDEX idx_sessions_previous_hash ON sessions(previous_hash)",
                "CREATE INDEX idx_sessions_user_id ON sessions(user_id)",
                "CREATE INDEX idx_sessions_token_family ON sessions(token_family)",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
                // Append-only audit trail
                "CREATE TABLE security_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    session_id TEXT,
                    user_id TEXT,
                    token_family TEXT,
                    sessions_revoked INTEGER NOT NULL DEFAULT 0,
                    ip_address TEXT,
                    user_agent TEXT,
                    occurred_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_security_events_user_id ON security_events(user_id)",
            ],
        )
        .await
    }

    /// Get the session store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    /// Get the security event store.
    pub fn security_events(&self) -> SecurityEventStore {
        SecurityEventStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
