//! Device authorization grant on top of sessions and the code registry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::audit::{AuditSink, SecurityEvent, SecurityEventKind};
use crate::db::DeviceInfo;
use crate::device_code::{AuthorizeOutcome, DeviceCodeRegistry, PollOutcome, UserCodeStatus};
use crate::error::{AuthResult, now_secs};
use crate::rate_limit::{DEVICE_AUTHORIZE, RateLimiter};
use crate::session::SessionService;

/// What the device shows its user and keeps for polling.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    /// Seconds until the codes expire
    pub expires_in: u64,
    /// Minimum seconds between polls
    pub interval: u64,
}

#[derive(Clone)]
pub struct DeviceFlow {
    sessions: SessionService,
    registry: Arc<DeviceCodeRegistry>,
    limiter: RateLimiter,
    audit: Arc<dyn AuditSink>,
}

fn authorize_key(user_id: &str) -> String {
    format!("device_authorize:{}", user_id)
}

impl DeviceFlow {
    pub fn new(
        sessions: SessionService,
        registry: Arc<DeviceCodeRegistry>,
        limiter: RateLimiter,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            sessions,
            registry,
            limiter,
            audit,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceCodeRegistry> {
        &self.registry
    }

    /// Start a device authorization for the requesting device.
    pub fn create_device_code(&self, device: DeviceInfo) -> DeviceAuthorization {
        let entry = self.registry.create(device);
        let expires_in = now_secs()
            .map(|now| (entry.expires_at - now).max(0) as u64)
            .unwrap_or(0);

        info!(user_code = %entry.user_code, "Device code created");
        DeviceAuthorization {
            device_code: entry.device_code,
            user_code: entry.user_code,
            expires_in,
            interval: entry.poll_interval.as_secs(),
        }
    }

    /// Approve `user_code` as `user_id`.
    ///
    /// A session is minted for the waiting device only when the code is
    /// still pending. If another approval wins in between, the minted
    /// session is revoked and the conflict is audited.
    pub async fn authorize_device_code(
        &self,
        user_code: &str,
        user_id: &str,
    ) -> AuthResult<AuthorizeOutcome> {
        let key = authorize_key(user_id);
        let decision = self.limiter.check_rule(&key, DEVICE_AUTHORIZE).await;
        if !decision.allowed {
            warn!(user_id = %user_id, "Device authorization rate limited");
            return Ok(AuthorizeOutcome::RateLimited {
                reset_in_secs: decision.reset_in.as_secs(),
            });
        }

        let device = match self.registry.status(user_code) {
            UserCodeStatus::Pending { device } => device,
            UserCodeStatus::AlreadyAuthorized => return Ok(AuthorizeOutcome::AlreadyAuthorized),
            UserCodeStatus::Expired => return Ok(AuthorizeOutcome::Expired),
            UserCodeStatus::NotFound => return Ok(AuthorizeOutcome::NotFound),
        };

        let tokens = self.sessions.create_session(user_id, &device).await?;
        let session_id = tokens.session_id.clone();

        let outcome = self.registry.authorize(user_code, user_id, tokens);
        if outcome.is_authorized() {
            self.limiter.reset(&key).await;
            return Ok(outcome);
        }

        warn!(
            session_id = %session_id,
            user_id = %user_id,
            outcome = ?outcome,
            "Device code changed during authorization, revoking minted session"
        );
        self.sessions.revoke_session(&session_id, user_id).await?;
        self.revoke_orphans().await;
        self.audit
            .record(&SecurityEvent {
                kind: SecurityEventKind::DeviceAuthorizationConflict,
                session_id,
                user_id: user_id.to_string(),
                token_family: None,
                sessions_revoked: 1,
                ip_address: device.ip_address,
                user_agent: device.user_agent,
                occurred_at: now_secs()?,
            })
            .await;

        Ok(outcome)
    }

    /// Device-side poll. An approved code that expired before this poll
    /// has its session revoked.
    pub async fn poll_device_code(&self, device_code: &str) -> PollOutcome {
        let outcome = self.registry.poll(device_code);
        if matches!(outcome, PollOutcome::Expired) {
            self.revoke_orphans().await;
        }
        outcome
    }

    /// Sweep expired codes and revoke sessions nobody collected.
    pub async fn sweep_expired(&self) -> usize {
        let removed = self.registry.sweep_expired();
        self.revoke_orphans().await;
        removed
    }

    async fn revoke_orphans(&self) {
        let mut failed = Vec::new();
        for orphan in self.registry.take_orphans() {
            match self
                .sessions
                .revoke_session(&orphan.session_id, &orphan.user_id)
                .await
            {
                Ok(true) => info!(
                    session_id = %orphan.session_id,
                    user_id = %orphan.user_id,
                    "Revoked session of uncollected device code"
                ),
                Ok(false) => {}
                Err(e) => {
                    error!(
                        session_id = %orphan.session_id,
                        error = %e,
                        "Failed to revoke orphaned session"
                    );
                    failed.push(orphan);
                }
            }
        }
        if !failed.is_empty() {
            self.registry.requeue_orphans(failed);
        }
    }
}
