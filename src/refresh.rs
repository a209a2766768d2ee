//! Refresh token rotation with reuse detection.
//!
//! Refresh tokens are opaque random strings; only their SHA-256 digest is
//! stored. Every successful exchange rotates the token in place, keeping the
//! superseded digest as `previous_hash`. Presenting that superseded token
//! again means two parties hold the chain, so the whole token family is
//! revoked and an audit event is emitted.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::audit::{AuditSink, SecurityEvent, SecurityEventKind};
use crate::db::{Database, DeviceInfo, NewSession, Session};
use crate::error::{AuthResult, now_secs};

/// Random bytes per refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Generate a new opaque refresh token.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a refresh token. The only form that is persisted.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Result of presenting a refresh token.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The token was current. `refresh_token` replaces it.
    Rotated {
        session: Session,
        refresh_token: String,
    },
    /// The token had already been rotated away. Its family is revoked.
    ReuseDetected {
        session_id: String,
        user_id: String,
        sessions_revoked: u64,
    },
    /// The token matches nothing live.
    Invalid,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    db: Database,
    audit: Arc<dyn AuditSink>,
    refresh_ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(db: Database, audit: Arc<dyn AuditSink>, refresh_ttl: Duration) -> Self {
        Self {
            db,
            audit,
            refresh_ttl,
        }
    }

    /// Start a new lineage for `user_id`. The session id doubles as the
    /// token family.
    pub async fn issue(&self, user_id: &str, device: &DeviceInfo) -> AuthResult<(Session, String)> {
        let now = now_secs()?;
        let id = uuid::Uuid::new_v4().to_string();
        let token = generate_refresh_token();
        let hash = hash_refresh_token(&token);

        let session = self
            .db
            .sessions()
            .insert(&NewSession {
                id: &id,
                user_id,
                token_hash: &hash,
                token_family: &id,
                expires_at: now + self.refresh_ttl.as_secs() as i64,
                device,
                now,
            })
            .await?;

        info!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok((session, token))
    }

    /// Exchange `presented` for a new refresh token.
    ///
    /// The current-hash match and the write happen in one conditional
    /// update. If it matches nothing, whether because the token was never
    /// current or because a concurrent call rotated it first, the token is
    /// checked against `previous_hash` and treated as reuse.
    pub async fn rotate(
        &self,
        presented: &str,
        device: &DeviceInfo,
    ) -> AuthResult<RotationOutcome> {
        if presented.is_empty() {
            return Ok(RotationOutcome::Invalid);
        }

        let now = now_secs()?;
        let presented_hash = hash_refresh_token(presented);
        let new_token = generate_refresh_token();
        let new_hash = hash_refresh_token(&new_token);
        let expires_at = now + self.refresh_ttl.as_secs() as i64;

        let sessions = self.db.sessions();

        if let Some(session) = sessions
            .rotate(&presented_hash, &new_hash, expires_at, device, now)
            .await?
        {
            debug!(session_id = %session.id, "Refresh token rotated");
            return Ok(RotationOutcome::Rotated {
                session,
                refresh_token: new_token,
            });
        }

        let Some(revocation) = sessions.revoke_reused(&presented_hash, now).await? else {
            debug!("Refresh token matched no live session");
            return Ok(RotationOutcome::Invalid);
        };

        let session = revocation.session;
        warn!(
            session_id = %session.id,
            user_id = %session.user_id,
            token_family = %session.token_family,
            sessions_revoked = revocation.sessions_revoked,
            "Refresh token reuse detected, token family revoked"
        );

        self.audit
            .record(&SecurityEvent {
                kind: SecurityEventKind::RefreshTokenReuse,
                session_id: session.id.clone(),
                user_id: session.user_id.clone(),
                token_family: Some(session.token_family.clone()),
                sessions_revoked: revocation.sessions_revoked,
                ip_address: device.ip_address.clone(),
                user_agent: device.user_agent.clone(),
                occurred_at: now,
            })
            .await;

        Ok(RotationOutcome::ReuseDetected {
            session_id: session.id,
            user_id: session.user_id,
            sessions_revoked: revocation.sessions_revoked,
        })
    }

    /// Revoke one session, scoped to `by_user_id` when given. Idempotent:
    /// returns false if nothing changed.
    pub async fn revoke(&self, session_id: &str, by_user_id: Option<&str>) -> AuthResult<bool> {
        let now = now_secs()?;
        let revoked = self.db.sessions().revoke(session_id, by_user_id, now).await?;
        if revoked {
            info!(session_id = %session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Revoke all sessions of `user_id` except `except_session_id`.
    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
    ) -> AuthResult<u64> {
        let now = now_secs()?;
        let count = self
            .db
            .sessions()
            .revoke_all_for_user(user_id, except_session_id, now)
            .await?;
        info!(user_id = %user_id, count, "Sessions revoked for user");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::DatabaseAuditSink;

    const TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    async fn store() -> (RefreshTokenStore, Database) {
        let db = Database::open(":memory:").await.unwrap();
        let audit = Arc::new(DatabaseAuditSink::new(db.clone()));
        (RefreshTokenStore::new(db.clone(), audit, TTL), db)
    }

    fn rotated(outcome: RotationOutcome) -> (Session, String) {
        match outcome {
            RotationOutcome::Rotated {
                session,
                refresh_token,
            } => (session, refresh_token),
            other => panic!("expected rotation, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let token = generate_refresh_token();
        let hash = hash_refresh_token(&token);
        assert_eq!(hash, hash_refresh_token(&token));
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, token);
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_refresh_token(), generate_refresh_token());
    }

    #[tokio::test]
    async fn test_issue_roots_new_family() {
        let (store, _) = store().await;
        let (session, token) = store.issue("u1", &DeviceInfo::default()).await.unwrap();

        assert_eq!(session.token_family, session.id);
        assert_eq!(session.current_hash, hash_refresh_token(&token));
        assert!(session.previous_hash.is_none());
    }

    #[tokio::test]
    async fn test_rotate_once_then_reuse() {
        let (store, db) = store().await;
        let device = DeviceInfo::default();
        let (session, t0) = store.issue("u1", &device).await.unwrap();

        let (rotated_session, t1) = rotated(store.rotate(&t0, &device).await.unwrap());
        assert_eq!(rotated_session.id, session.id);
        assert_eq!(rotated_session.previous_hash, Some(hash_refresh_token(&t0)));
        assert_ne!(t1, t0);

        match store.rotate(&t0, &device).await.unwrap() {
            RotationOutcome::ReuseDetected {
                session_id,
                user_id,
                sessions_revoked,
            } => {
                assert_eq!(session_id, session.id);
                assert_eq!(user_id, "u1");
                assert_eq!(sessions_revoked, 1);
            }
            other => panic!("expected reuse, got {:?}", other),
        }

        // The newest token died with its family.
        assert!(matches!(
            store.rotate(&t1, &device).await.unwrap(),
            RotationOutcome::Invalid
        ));

        let events = db.security_events().list_by_user("u1", 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id.as_deref(), Some(session.id.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let (store, _) = store().await;
        let device = DeviceInfo::default();
        assert!(matches!(
            store.rotate("never-issued", &device).await.unwrap(),
            RotationOutcome::Invalid
        ));
        assert!(matches!(
            store.rotate("", &device).await.unwrap(),
            RotationOutcome::Invalid
        ));
    }

    #[tokio::test]
    async fn test_revoked_session_is_invalid() {
        let (store, _) = store().await;
        let device = DeviceInfo::default();
        let (session, t0) = store.issue("u1", &device).await.unwrap();

        assert!(store.revoke(&session.id, Some("u1")).await.unwrap());
        assert!(!store.revoke(&session.id, Some("u1")).await.unwrap());
        assert!(matches!(
            store.rotate(&t0, &device).await.unwrap(),
            RotationOutcome::Invalid
        ));
    }

    #[tokio::test]
    async fn test_revoke_scoped_to_owner() {
        let (store, _) = store().await;
        let (session, _) = store.issue("u1", &DeviceInfo::default()).await.unwrap();
        assert!(!store.revoke(&session.id, Some("intruder")).await.unwrap());
        assert!(store.revoke(&session.id, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_updates_device_metadata() {
        let (store, _) = store().await;
        let (_, t0) = store
            .issue(
                "u1",
                &DeviceInfo {
                    device_name: Some("cli".into()),
                    ip_address: Some("1.1.1.1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (session, _) = rotated(
            store
                .rotate(
                    &t0,
                    &DeviceInfo {
                        ip_address: Some("2.2.2.2".into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap(),
        );
        assert_eq!(session.ip_address.as_deref(), Some("2.2.2.2"));
        assert_eq!(session.device_name.as_deref(), Some("cli"));
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_keeps_one() {
        let (store, db) = store().await;
        let device = DeviceInfo::default();
        let (keep, _) = store.issue("u1", &device).await.unwrap();
        store.issue("u1", &device).await.unwrap();
        store.issue("u1", &device).await.unwrap();

        assert_eq!(store.revoke_all_for_user("u1", Some(&keep.id)).await.unwrap(), 2);

        let now = now_secs().unwrap();
        let active = db.sessions().list_active_for_user("u1", now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);
    }
}
