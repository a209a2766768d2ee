//! Deny-list for access tokens revoked before their natural expiry.
//!
//! Entries live in the expiring key-value store with a TTL equal to the
//! token's remaining lifetime, so the list never outgrows the set of tokens
//! that could still pass a signature and expiry check.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::error;

use crate::kv::{KvError, KvStore};

const KEY_PREFIX: &str = "blacklist:";

#[derive(Clone)]
pub struct Blacklist {
    kv: Arc<dyn KvStore>,
}

impl Blacklist {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Blacklist `token` for `ttl`, which must be the token's remaining
    /// lifetime. A zero TTL is a no-op: the token is already unusable.
    ///
    /// # Errors
    ///
    /// Store failures are returned so the caller can retry or log them.
    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), KvError> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.kv.set(&key_for(token), "1", ttl).await
    }

    /// Whether `token` has been revoked. Store failures count as revoked.
    pub async fn is_revoked(&self, token: &str) -> bool {
        match self.kv.exists(&key_for(token)).await {
            Ok(revoked) => revoked,
            Err(e) => {
                error!(error = %e, "Blacklist lookup failed, rejecting token");
                true
            }
        }
    }
}

/// Keys carry a digest of the token, not the token itself.
pub(crate) fn key_for(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{}{:x}", KEY_PREFIX, digest)
}
