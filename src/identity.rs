//! Boundary to the identity provider (OAuth or otherwise).
//!
//! The provider has already verified the user by the time anything here is
//! called. The mapping it returns is trusted as-is.

use async_trait::async_trait;

use crate::error::AuthResult;

/// An identity vouched for by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub provider: String,
    pub external_user_id: String,
    pub verified_email: String,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Map an external identity to the internal user id, creating the
    /// user if the implementation does so.
    async fn resolve(&self, identity: &VerifiedIdentity) -> AuthResult<String>;
}
