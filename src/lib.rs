//! Session and token lifecycle core.
//!
//! Short-lived signed access tokens, rotating opaque refresh tokens with
//! reuse detection and family revocation, an access token blacklist, the
//! device authorization flow, and a fixed-window rate limiter.

pub mod audit;
pub mod auth;
pub mod blacklist;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod db;
pub mod device_code;
pub mod device_flow;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod kv;
pub mod rate_limit;
pub mod refresh;
pub mod session;

use std::sync::Arc;

use audit::{AuditSink, DatabaseAuditSink};
use blacklist::Blacklist;
use cleanup::CleanupReport;
use config::AuthConfig;
use db::Database;
use device_code::DeviceCodeRegistry;
use device_flow::DeviceFlow;
use jwt::TokenIssuer;
use kv::{KvStore, MemoryKvStore};
use rate_limit::RateLimiter;
use refresh::RefreshTokenStore;
use session::SessionService;

pub use error::{AuthError, AuthResult};

/// The only message shown to end users for a rejected credential,
/// whatever the reason.
pub const SIGN_IN_AGAIN: &str = "Please sign in again";

/// Every component wired together over one database and one in-process
/// key-value store.
#[derive(Clone)]
pub struct AuthCore {
    pub config: AuthConfig,
    pub db: Database,
    pub kv: Arc<MemoryKvStore>,
    pub sessions: SessionService,
    pub device_flow: DeviceFlow,
    pub rate_limiter: RateLimiter,
}

impl AuthCore {
    pub fn new(db: Database, jwt_secret: &[u8], config: AuthConfig) -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        let shared_kv: Arc<dyn KvStore> = kv.clone();
        let audit: Arc<dyn AuditSink> = Arc::new(DatabaseAuditSink::new(db.clone()));

        let issuer = TokenIssuer::new(
            jwt_secret,
            config.access_token_ttl,
            Blacklist::new(shared_kv.clone()),
        );
        let refresh_tokens =
            RefreshTokenStore::new(db.clone(), audit.clone(), config.refresh_token_ttl);
        let sessions = SessionService::new(db.clone(), issuer, refresh_tokens);

        let rate_limiter = RateLimiter::new(shared_kv);
        let registry = Arc::new(DeviceCodeRegistry::new(
            config.device_code_ttl,
            config.poll_interval,
        ));
        let device_flow = DeviceFlow::new(sessions.clone(), registry, rate_limiter.clone(), audit);

        Self {
            config,
            db,
            kv,
            sessions,
            device_flow,
            rate_limiter,
        }
    }

    /// Run every cleanup task once.
    pub async fn run_cleanup(&self) -> CleanupReport {
        cleanup::run_cleanup(
            &self.db,
            self.config.session_retention,
            Some(&self.device_flow),
            Some(self.kv.as_ref()),
        )
        .await
    }

    /// Run cleanup now, then spawn the periodic cleanup and device sweep
    /// tasks. Call this once at startup.
    pub async fn init_cleanup(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.run_cleanup().await;
        vec![
            cleanup::spawn_cleanup_scheduler(
                self.db.clone(),
                Some(self.kv.clone()),
                self.config.session_retention,
                self.config.cleanup_interval,
            ),
            cleanup::spawn_device_sweeper(
                self.device_flow.clone(),
                self.config.device_sweep_interval,
            ),
        ]
    }
}
