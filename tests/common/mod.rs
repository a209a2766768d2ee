#![allow(dead_code)]

use std::time::Duration;

use sessioncore::AuthCore;
use sessioncore::config::AuthConfig;
use sessioncore::db::{Database, DeviceInfo};

pub const SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";

/// Config for tests: no poll spacing so a device can poll back to back.
pub fn test_config() -> AuthConfig {
    AuthConfig {
        poll_interval: Duration::ZERO,
        ..AuthConfig::default()
    }
}

pub async fn memory_core() -> AuthCore {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    AuthCore::new(db, SECRET, test_config())
}

/// File-backed database for tests with concurrent writers. Keep the
/// returned directory alive for the duration of the test.
pub async fn file_core() -> (AuthCore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("sessions.db");
    let db = Database::open(path.to_str().expect("Non UTF-8 temp path"))
        .await
        .expect("Failed to open test database");
    (AuthCore::new(db, SECRET, test_config()), dir)
}

pub fn device(ip: &str) -> DeviceInfo {
    DeviceInfo {
        ip_address: Some(ip.to_string()),
        ..Default::default()
    }
}
