//! Authenticated request identity.

use crate::db::DeviceInfo;
use crate::jwt::AccessClaims;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Verified claims of the presented access token
    pub claims: AccessClaims,
    /// The raw access token, for logout and blacklisting
    pub access_token: String,
    /// Metadata of the calling client
    pub device: DeviceInfo,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn session_id(&self) -> &str {
        &self.claims.sid
    }
}
