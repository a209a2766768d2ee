use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// A stored audit event.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SecurityEventRecord {
    pub id: i64,
    pub kind: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub token_family: Option<String>,
    pub sessions_revoked: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: i64,
}

/// Append-only store for security events. There is no update or delete.
#[derive(Clone)]
pub struct SecurityEventStore {
    pool: SqlitePool,
}

impl SecurityEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        kind: &str,
        session_id: Option<&str>,
        user_id: Option<&str>,
        token_family: Option<&str>,
        sessions_revoked: i64,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        occurred_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO security_events
                (kind, session_id, user_id, token_family, sessions_revoked,
                 ip_address, user_agent, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(kind)
        .bind(session_id)
        .bind(user_id)
        .bind(token_family)
        .bind(sessions_revoked)
        .bind(ip_address)
        .bind(user_agent)
        .bind(occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Events for a user, newest first.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<SecurityEventRecord>, sqlx::Error> {
        sqlx::query_as::<_, SecurityEventRecord>(
            "SELECT id, kind, session_id, user_id, token_family, sessions_revoked,
                    ip_address, user_agent, occurred_at
             FROM security_events WHERE user_id = ?
             ORDER BY occurred_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_append_and_list() {
        let db = Database::open(":memory:").await.unwrap();
        let events = db.security_events();

        events
            .append(
                "refresh_token_reuse",
                Some("s1"),
                Some("u1"),
                Some("s1"),
                3,
                Some("1.2.3.4"),
                None,
                100,
            )
            .await
            .unwrap();
        events
            .append("refresh_token_reuse", Some("s2"), Some("u1"), Some("s2"), 1, None, None, 200)
            .await
            .unwrap();
        events
            .append("refresh_token_reuse", Some("s3"), Some("u2"), Some("s3"), 1, None, None, 300)
            .await
            .unwrap();

        let listed = events.list_by_user("u1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id.as_deref(), Some("s2"));
        assert_eq!(listed[1].sessions_revoked, 3);
        assert_eq!(listed[1].ip_address.as_deref(), Some("1.2.3.4"));

        assert_eq!(events.list_by_user("u1", 1).await.unwrap().len(), 1);
    }
}
