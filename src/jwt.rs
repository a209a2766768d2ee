//! Access token signing and verification.
//!
//! Access tokens are short-lived HS256 JWTs bound to a session id. They are
//! stateless apart from the blacklist, which covers the window between an
//! explicit logout and the token's natural expiry.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blacklist::Blacklist;
use crate::error::{AuthResult, now_secs};

/// Token type claim. Anything other than `access` is rejected by
/// [`TokenIssuer::verify_access_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    #[serde(other)]
    Other,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Session this token was issued for
    pub sid: String,
    /// Unique token id, so two tokens minted in the same second differ
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl AccessClaims {
    /// Time left before natural expiry, zero if already past it.
    pub fn remaining_lifetime(&self, now: i64) -> Duration {
        Duration::from_secs(self.exp.saturating_sub(now).max(0) as u64)
    }
}

/// Why an access token was refused. Internal only: callers present every
/// variant to end users with the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRejection {
    Malformed,
    Expired,
    WrongType,
    Blacklisted,
}

impl AccessRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRejection::Malformed => "malformed",
            AccessRejection::Expired => "expired",
            AccessRejection::WrongType => "wrong_type",
            AccessRejection::Blacklisted => "blacklisted",
        }
    }

    pub fn public_message(&self) -> &'static str {
        crate::SIGN_IN_AGAIN
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: i64,
    /// Lifetime in seconds
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    blacklist: Blacklist,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, blacklist: Blacklist) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl,
            blacklist,
        }
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Sign an access token for `user_id` bound to `session_id`.
    pub fn issue_access_token(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> AuthResult<IssuedAccessToken> {
        let now = now_secs()?;
        let ttl = self.access_ttl.as_secs();
        let exp = now + ttl as i64;

        let claims = AccessClaims {
            sub: user_id.to_string(),
            token_type: TokenType::Access,
            sid: session_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;

        Ok(IssuedAccessToken {
            token,
            expires_at: exp,
            expires_in: ttl,
        })
    }

    /// Check signature, type and expiry without consulting the blacklist.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, AccessRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared below with strict inequality.
        validation.validate_exp = false;

        let claims = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AccessRejection::Malformed)?
            .claims;

        if claims.token_type != TokenType::Access {
            return Err(AccessRejection::WrongType);
        }

        // A clock before the epoch cannot validate anything.
        let now = now_secs().map_err(|_| AccessRejection::Expired)?;
        if claims.exp <= now {
            return Err(AccessRejection::Expired);
        }

        Ok(claims)
    }

    /// Full verification: signature, expiry, type, then blacklist.
    pub async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AccessRejection> {
        let result = match self.decode_access_token(token) {
            Ok(claims) => {
                if self.blacklist.is_revoked(token).await {
                    Err(AccessRejection::Blacklisted)
                } else {
                    Ok(claims)
                }
            }
            Err(reason) => Err(reason),
        };

        if let Err(reason) = &result {
            debug!(reason = reason.as_str(), "Access token rejected");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use std::sync::Arc;

    fn issuer(secret: &[u8]) -> TokenIssuer {
        let blacklist = Blacklist::new(Arc::new(MemoryKvStore::new()));
        TokenIssuer::new(secret, Duration::from_secs(15 * 60), blacklist)
    }

    fn sign(secret: &[u8], claims: &AccessClaims) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn claims_expiring_at(exp: i64) -> AccessClaims {
        AccessClaims {
            sub: "user-1".into(),
            token_type: TokenType::Access,
            sid: "session-1".into(),
            jti: "jti".into(),
            iat: exp - 100,
            exp,
        }
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let issuer = issuer(b"test-secret-key-for-testing");
        let issued = issuer.issue_access_token("user-1", "session-1").unwrap();
        assert_eq!(issued.expires_in, 15 * 60);

        let claims = issuer.verify_access_token(&issued.token).await.unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.sid, "session-1");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp, issued.expires_at);
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let issuer = issuer(b"test-secret");
        assert_eq!(
            issuer.verify_access_token("invalid-token").await.unwrap_err(),
            AccessRejection::Malformed
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_is_malformed() {
        let a = issuer(b"secret-1");
        let b = issuer(b"secret-2");
        let issued = a.issue_access_token("user-1", "session-1").unwrap();
        assert_eq!(
            b.verify_access_token(&issued.token).await.unwrap_err(),
            AccessRejection::Malformed
        );
    }

    #[tokio::test]
    async fn test_expired_token() {
        let secret = b"test-secret";
        let now = now_secs().unwrap();
        let token = sign(secret, &claims_expiring_at(now - 50));
        assert_eq!(
            issuer(secret).verify_access_token(&token).await.unwrap_err(),
            AccessRejection::Expired
        );
    }

    #[test]
    fn test_expiry_is_strict() {
        let secret = b"test-secret";
        let now = now_secs().unwrap();
        let token = sign(secret, &claims_expiring_at(now));
        assert_eq!(
            issuer(secret).decode_access_token(&token).unwrap_err(),
            AccessRejection::Expired
        );
    }

    #[tokio::test]
    async fn test_wrong_type() {
        #[derive(Serialize)]
        struct RefreshLike<'a> {
            sub: &'a str,
            typ: &'a str,
            sid: &'a str,
            jti: &'a str,
            iat: i64,
            exp: i64,
        }

        let secret = b"test-secret";
        let now = now_secs().unwrap();
        let token = jsonwebtoken::encode(
            &Header::default(),
            &RefreshLike {
                sub: "user-1",
                typ: "refresh",
                sid: "session-1",
                jti: "x",
                iat: now,
                exp: now + 600,
            },
            &EncodingKey::from_secret(secret),
        )
        .unwrap();

        assert_eq!(
            issuer(secret).verify_access_token(&token).await.unwrap_err(),
            AccessRejection::WrongType
        );
    }

    #[tokio::test]
    async fn test_blacklisted_token_rejected() {
        let issuer = issuer(b"test-secret");
        let issued = issuer.issue_access_token("user-1", "session-1").unwrap();

        issuer
            .blacklist()
            .revoke(&issued.token, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            issuer.verify_access_token(&issued.token).await.unwrap_err(),
            AccessRejection::Blacklisted
        );
        // Decoding alone still succeeds.
        assert!(issuer.decode_access_token(&issued.token).is_ok());
    }

    #[test]
    fn test_unique_jti_per_token() {
        let issuer = issuer(b"test-secret");
        let a = issuer.issue_access_token("user-1", "session-1").unwrap();
        let b = issuer.issue_access_token("user-1", "session-1").unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_remaining_lifetime() {
        let claims = claims_expiring_at(1_000);
        assert_eq!(claims.remaining_lifetime(400), Duration::from_secs(600));
        assert_eq!(claims.remaining_lifetime(2_000), Duration::ZERO);
    }
}
