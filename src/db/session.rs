//! Session rows: one per refresh grant, rotated in place.
//!
//! Only hashes of refresh tokens are stored. `rotate` is the sole writer of
//! `current_hash` and `previous_hash`, and it writes them with a single
//! conditional update so two concurrent rotations of the same token cannot
//! both succeed.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

const COLUMNS: &str = "id, user_id, current_hash, previous_hash, token_family, expires_at, \
                       revoked_at, device_name, device_type, ip_address, user_agent, \
                       created_at, last_used_at";

/// Descriptive metadata about the client holding a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip)]
    pub current_hash: String,
    #[serde(skip)]
    pub previous_hash: Option<String>,
    pub token_family: String,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub last_used_at: i64,
}

impl Session {
    /// Not revoked and not yet expired at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Input for [`SessionStore::insert`].
#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub token_hash: &'a str,
    pub token_family: &'a str,
    pub expires_at: i64,
    pub device: &'a DeviceInfo,
    pub now: i64,
}

/// The session that presented a superseded token, plus the number of rows
/// revoked in total (itself and the rest of its family).
#[derive(Debug, Clone)]
pub struct ReuseRevocation {
    pub session: Session,
    pub sessions_revoked: u64,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: &NewSession<'_>) -> Result<Session, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions (id, user_id, current_hash, token_family, expires_at,
                device_name, device_type, ip_address, user_agent, created_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Session>(sqlx::AssertSqlSafe(query))
            .bind(new.id)
            .bind(new.user_id)
            .bind(new.token_hash)
            .bind(new.token_family)
            .bind(new.expires_at)
            .bind(&new.device.device_name)
            .bind(&new.device.device_type)
            .bind(&new.device.ip_address)
            .bind(&new.device.user_agent)
            .bind(new.now)
            .bind(new.now)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = ?");
        sqlx::query_as::<_, Session>(sqlx::AssertSqlSafe(query))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Swap `presented_hash` for `new_hash` on the live, unexpired session
    /// whose current hash is `presented_hash`.
    ///
    /// Lookup and write are one guarded statement. `None` means no row
    /// matched, either because the token is not current or because a
    /// concurrent rotation got there first.
    pub async fn rotate(
        &self,
        presented_hash: &str,
        new_hash: &str,
        expires_at: i64,
        device: &DeviceInfo,
        now: i64,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!(
            "UPDATE sessions SET
                previous_hash = current_hash,
                current_hash = ?,
                expires_at = ?,
                last_used_at = ?,
                device_name = COALESCE(?, device_name),
                device_type = COALESCE(?, device_type),
                ip_address = COALESCE(?, ip_address),
                user_agent = COALESCE(?, user_agent)
             WHERE current_hash = ? AND revoked_at IS NULL AND expires_at > ?
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Session>(sqlx::AssertSqlSafe(query))
            .bind(new_hash)
            .bind(expires_at)
            .bind(now)
            .bind(&device.device_name)
            .bind(&device.device_type)
            .bind(&device.ip_address)
            .bind(&device.user_agent)
            .bind(presented_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
    }

    /// If a live session was rotated past `presented_hash`, revoke it and
    /// every other live member of its token family in one transaction.
    pub async fn revoke_reused(
        &self,
        presented_hash: &str,
        now: i64,
    ) -> Result<Option<ReuseRevocation>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE sessions SET revoked_at = ?
             WHERE previous_hash = ? AND revoked_at IS NULL
             RETURNING {COLUMNS}"
        );
        let session = sqlx::query_as::<_, Session>(sqlx::AssertSqlSafe(query))
            .bind(now)
            .bind(presented_hash)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(session) = session else {
            tx.rollback().await?;
            return Ok(None);
        };

        let family = sqlx::query(
            "UPDATE sessions SET revoked_at = ? WHERE token_family = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(&session.token_family)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(ReuseRevocation {
            sessions_revoked: 1 + family.rows_affected(),
            session,
        }))
    }

    /// Revoke one session. When `owner` is given, only a session belonging
    /// to that user is touched. Returns whether a row changed.
    pub async fn revoke(
        &self,
        id: &str,
        owner: Option<&str>,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = ?
             WHERE id = ? AND revoked_at IS NULL AND (? IS NULL OR user_id = ?)",
        )
        .bind(now)
        .bind(id)
        .bind(owner)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every live session of a user, optionally keeping one.
    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        except: Option<&str>,
        now: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = ?
             WHERE user_id = ? AND revoked_at IS NULL AND (? IS NULL OR id != ?)",
        )
        .bind(now)
        .bind(user_id)
        .bind(except)
        .bind(except)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Live, unexpired sessions of a user, most recently used first.
    pub async fn list_active_for_user(
        &self,
        user_id: &str,
        now: i64,
    ) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE user_id = ? AND revoked_at IS NULL AND expires_at > ?
             ORDER BY last_used_at DESC, created_at DESC"
        );
        sqlx::query_as::<_, Session>(sqlx::AssertSqlSafe(query))
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await
    }

    /// All rows sharing a token family, revoked or not.
    pub async fn list_family(&self, token_family: &str) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions WHERE token_family = ? ORDER BY created_at"
        );
        sqlx::query_as::<_, Session>(sqlx::AssertSqlSafe(query))
            .bind(token_family)
            .fetch_all(&self.pool)
            .await
    }

    /// Delete rows that expired or were revoked before `cutoff`.
    pub async fn delete_stale(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM sessions
             WHERE expires_at < ? OR (revoked_at IS NOT NULL AND revoked_at < ?)",
        )
        .bind(cutoff)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
