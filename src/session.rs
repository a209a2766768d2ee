//! Session lifecycle: sign-in, refresh, logout.
//!
//! `SessionService` pairs the refresh token store with the access token
//! issuer. It is the entry point for callers; the stores underneath never
//! see access tokens and the issuer never touches session rows.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{Database, DeviceInfo};
use crate::error::{AuthError, AuthResult, now_secs};
use crate::identity::{IdentityResolver, VerifiedIdentity};
use crate::jwt::{AccessClaims, AccessRejection, TokenIssuer};
use crate::refresh::{RefreshTokenStore, RotationOutcome};

/// Credentials handed to a client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    #[serde(skip)]
    pub session_id: String,
}

/// Caller-facing result of a refresh.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Success(TokenPair),
    InvalidCredential,
    /// Reuse was detected; the client must re-authenticate from scratch.
    SecurityRevocation { sessions_revoked: u64 },
}

impl RefreshOutcome {
    /// Message safe to show an end user. Identical for every failure.
    pub fn public_message(&self) -> Option<&'static str> {
        match self {
            RefreshOutcome::Success(_) => None,
            RefreshOutcome::InvalidCredential | RefreshOutcome::SecurityRevocation { .. } => {
                Some(crate::SIGN_IN_AGAIN)
            }
        }
    }
}

/// An entry in a user's list of signed-in devices.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub last_used_at: i64,
    pub expires_at: i64,
    pub is_current: bool,
}

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    issuer: TokenIssuer,
    refresh_tokens: RefreshTokenStore,
}

impl SessionService {
    pub fn new(db: Database, issuer: TokenIssuer, refresh_tokens: RefreshTokenStore) -> Self {
        Self {
            db,
            issuer,
            refresh_tokens,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Open a new session for `user_id` and mint its first token pair.
    pub async fn create_session(
        &self,
        user_id: &str,
        device: &DeviceInfo,
    ) -> AuthResult<TokenPair> {
        let (session, refresh_token) = self.refresh_tokens.issue(user_id, device).await?;
        let access = self.issuer.issue_access_token(user_id, &session.id)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            expires_in: access.expires_in,
            session_id: session.id,
        })
    }

    /// Resolve an externally verified identity and open a session for it.
    pub async fn sign_in(
        &self,
        resolver: &dyn IdentityResolver,
        identity: &VerifiedIdentity,
        device: &DeviceInfo,
    ) -> AuthResult<TokenPair> {
        let user_id = resolver.resolve(identity).await?;
        debug!(provider = %identity.provider, user_id = %user_id, "Identity resolved");
        self.create_session(&user_id, device).await
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh(
        &self,
        presented: &str,
        device: &DeviceInfo,
    ) -> AuthResult<RefreshOutcome> {
        match self.refresh_tokens.rotate(presented, device).await? {
            RotationOutcome::Rotated {
                session,
                refresh_token,
            } => {
                let access = self.issuer.issue_access_token(&session.user_id, &session.id)?;
                Ok(RefreshOutcome::Success(TokenPair {
                    access_token: access.token,
                    refresh_token,
                    expires_in: access.expires_in,
                    session_id: session.id,
                }))
            }
            RotationOutcome::ReuseDetected {
                sessions_revoked, ..
            } => Ok(RefreshOutcome::SecurityRevocation { sessions_revoked }),
            RotationOutcome::Invalid => Ok(RefreshOutcome::InvalidCredential),
        }
    }

    /// Verify an access token for a request.
    pub async fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AccessRejection> {
        self.issuer.verify_access_token(access_token).await
    }

    /// Revoke the session behind `access_token` and blacklist the token for
    /// the rest of its lifetime.
    ///
    /// Returns whether a session was revoked by this call. Logging out with
    /// a token that is already blacklisted succeeds without changes.
    ///
    /// # Errors
    ///
    /// `InvalidCredential` for malformed, expired or mistyped tokens;
    /// storage errors if the revocation or blacklist write fails.
    pub async fn logout(&self, access_token: &str) -> AuthResult<bool> {
        let claims = match self.issuer.verify_access_token(access_token).await {
            Ok(claims) => claims,
            Err(AccessRejection::Blacklisted) => return Ok(false),
            Err(_) => return Err(AuthError::InvalidCredential),
        };

        let revoked = self.refresh_tokens.revoke(&claims.sid, Some(&claims.sub)).await?;
        self.blacklist_access_token(access_token, &claims).await?;

        info!(session_id = %claims.sid, user_id = %claims.sub, "Logged out");
        Ok(revoked)
    }

    /// Revoke every session of `user_id` except `except_session_id`, and
    /// blacklist the caller's access token unless it belongs to the session
    /// being kept.
    pub async fn logout_all(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
        current_access_token: Option<&str>,
    ) -> AuthResult<u64> {
        let count = self
            .refresh_tokens
            .revoke_all_for_user(user_id, except_session_id)
            .await?;

        if let Some(token) = current_access_token {
            match self.issuer.decode_access_token(token) {
                Ok(claims)
                    if claims.sub == user_id
                        && Some(claims.sid.as_str()) != except_session_id =>
                {
                    self.blacklist_access_token(token, &claims).await?;
                }
                Ok(_) => {}
                Err(reason) => {
                    debug!(reason = reason.as_str(), "Current access token not blacklisted");
                }
            }
        }

        Ok(count)
    }

    /// Active sessions of `user_id`, flagging `current_session_id`.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        current_session_id: Option<&str>,
    ) -> AuthResult<Vec<SessionInfo>> {
        let now = now_secs()?;
        let sessions = self.db.sessions().list_active_for_user(user_id, now).await?;

        Ok(sessions
            .into_iter()
            .map(|s| SessionInfo {
                is_current: Some(s.id.as_str()) == current_session_id,
                id: s.id,
                device_name: s.device_name,
                device_type: s.device_type,
                ip_address: s.ip_address,
                user_agent: s.user_agent,
                created_at: s.created_at,
                last_used_at: s.last_used_at,
                expires_at: s.expires_at,
            })
            .collect())
    }

    /// Revoke a single session on behalf of its owner.
    pub async fn revoke_session(&self, session_id: &str, by_user_id: &str) -> AuthResult<bool> {
        self.refresh_tokens.revoke(session_id, Some(by_user_id)).await
    }

    async fn blacklist_access_token(&self, token: &str, claims: &AccessClaims) -> AuthResult<()> {
        let ttl = claims.remaining_lifetime(now_secs()?);
        self.issuer.blacklist().revoke(token, ttl).await.map_err(|e| {
            warn!(session_id = %claims.sid, error = %e, "Failed to blacklist access token");
            AuthError::from(e)
        })
    }
}
