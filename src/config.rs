//! Tunables for token lifetimes, the device flow and background sweeps.

use std::time::Duration;

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Refresh token lifetime: 30 days, renewed on every rotation.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Device code lifetime: 10 minutes.
pub const DEFAULT_DEVICE_CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Minimum spacing between device polls: 5 seconds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_DEVICE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How long revoked or expired session rows are kept before being purged.
pub const DEFAULT_SESSION_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub device_code_ttl: Duration,
    pub poll_interval: Duration,
    pub device_sweep_interval: Duration,
    pub cleanup_interval: Duration,
    pub session_retention: Duration,
    /// Set the `Secure` attribute on cookies (production, HTTPS only).
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            device_code_ttl: DEFAULT_DEVICE_CODE_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            device_sweep_interval: DEFAULT_DEVICE_SWEEP_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            session_retention: DEFAULT_SESSION_RETENTION,
            secure_cookies: false,
        }
    }
}
