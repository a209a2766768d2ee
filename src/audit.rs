//! Security event sink.
//!
//! Every refresh-token reuse is recorded here after the family revocation
//! has committed. A failing sink is logged and never rolls back a revocation.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, warn};

use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// A superseded refresh token was presented; the family was revoked.
    RefreshTokenReuse,
    /// A device code authorization lost a race and its session was revoked.
    DeviceAuthorizationConflict,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::RefreshTokenReuse => "refresh_token_reuse",
            SecurityEventKind::DeviceAuthorizationConflict => "device_authorization_conflict",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub session_id: String,
    pub user_id: String,
    pub token_family: Option<String>,
    pub sessions_revoked: u64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: i64,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &SecurityEvent);
}

fn log_event(event: &SecurityEvent) {
    warn!(
        target: "sessioncore::audit",
        kind = event.kind.as_str(),
        session_id = %event.session_id,
        user_id = %event.user_id,
        token_family = event.token_family.as_deref().unwrap_or(""),
        sessions_revoked = event.sessions_revoked,
        ip = event.ip_address.as_deref().unwrap_or(""),
        user_agent = event.user_agent.as_deref().unwrap_or(""),
        at = event.occurred_at,
        "Security event"
    );
}

/// Writes events to the log only.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &SecurityEvent) {
        log_event(event);
    }
}

/// Appends events to the `security_events` table and logs them.
#[derive(Clone)]
pub struct DatabaseAuditSink {
    db: Database,
}

impl DatabaseAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DatabaseAuditSink {
    async fn record(&self, event: &SecurityEvent) {
        log_event(event);

        let result = self
            .db
            .security_events()
            .append(
                event.kind.as_str(),
                Some(&event.session_id),
                Some(&event.user_id),
                event.token_family.as_deref(),
                i64::try_from(event.sessions_revoked).unwrap_or(i64::MAX),
                event.ip_address.as_deref(),
                event.user_agent.as_deref(),
                event.occurred_at,
            )
            .await;

        if let Err(e) = result {
            error!(session_id = %event.session_id, error = %e, "Failed to persist security event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_sink_persists() {
        let db = Database::open(":memory:").await.unwrap();
        let sink = DatabaseAuditSink::new(db.clone());

        sink.record(&SecurityEvent {
            kind: SecurityEventKind::RefreshTokenReuse,
            session_id: "s1".into(),
            user_id: "u1".into(),
            token_family: Some("s1".into()),
            sessions_revoked: 2,
            ip_address: Some("10.0.0.9".into()),
            user_agent: Some("curl/8".into()),
            occurred_at: 42,
        })
        .await;

        let events = db.security_events().list_by_user("u1", 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "refresh_token_reuse");
        assert_eq!(events[0].sessions_revoked, 2);
        assert_eq!(events[0].user_agent.as_deref(), Some("curl/8"));
    }
}
