//! Device authorization codes for clients without a browser.
//!
//! A headless client holds the secret device code and polls; the user types
//! the short user code into a browser to approve it. Entries live in memory
//! under one lock that covers both indices, so authorization is
//! linearizable per user code and consumption removes both keys together.
//!
//! This store is single-process. Running several instances requires moving
//! the entries to a shared expiring store behind the same methods.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore};
use serde::Serialize;
use tracing::info;

use crate::db::DeviceInfo;
use crate::error::now_secs;
use crate::session::TokenPair;

/// User code alphabet: no 0/O or 1/I.
pub const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const USER_CODE_HALF: usize = 4;
const DEVICE_CODE_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct DeviceCodeEntry {
    pub device_code: String,
    pub user_code: String,
    pub expires_at: i64,
    pub poll_interval: Duration,
    pub authorized: bool,
    pub user_id: Option<String>,
    pub tokens: Option<TokenPair>,
    /// The device that asked for the code; its session gets this metadata.
    pub device: DeviceInfo,
    pub last_polled_at: Option<i64>,
}

impl DeviceCodeEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizeOutcome {
    Authorized,
    AlreadyAuthorized,
    Expired,
    NotFound,
    /// Too many attempts from this user; retry after the window.
    RateLimited { reset_in_secs: u64 },
}

impl AuthorizeOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizeOutcome::Authorized)
    }
}

/// State of a user code as seen from the approving browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCodeStatus {
    Pending { device: DeviceInfo },
    AlreadyAuthorized,
    Expired,
    NotFound,
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Not yet approved; keep polling.
    Pending,
    /// Polled sooner than the advertised interval.
    SlowDown,
    Expired,
    NotFound,
    /// Approved. The entry is gone; these tokens are returned once.
    Authorized(TokenPair),
}

/// A session minted for a device that never collected its tokens. It must
/// be revoked by whoever owns the session service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedSession {
    pub session_id: String,
    pub user_id: String,
}

#[derive(Default)]
struct Codes {
    by_device: HashMap<String, DeviceCodeEntry>,
    /// user code -> device code
    by_user: HashMap<String, String>,
    orphans: Vec<OrphanedSession>,
}

impl Codes {
    fn remove(&mut self, device_code: &str) -> Option<DeviceCodeEntry> {
        let entry = self.by_device.remove(device_code)?;
        self.by_user.remove(&entry.user_code);
        Some(entry)
    }

    /// Drop an expired entry. Tokens it still holds become orphans.
    fn expire(&mut self, device_code: &str) {
        let Some(entry) = self.remove(device_code) else {
            return;
        };
        if let (Some(user_id), Some(tokens)) = (entry.user_id, entry.tokens) {
            self.orphans.push(OrphanedSession {
                session_id: tokens.session_id,
                user_id,
            });
        }
    }
}

pub struct DeviceCodeRegistry {
    codes: Mutex<Codes>,
    ttl: Duration,
    poll_interval: Duration,
}

/// Wall clock for expiry checks. A clock before the epoch expires everything.
fn now() -> i64 {
    now_secs().unwrap_or(i64::MAX)
}

pub fn generate_device_code() -> String {
    let mut bytes = [0u8; DEVICE_CODE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random `XXXX-XXXX` code from [`USER_CODE_ALPHABET`].
pub fn generate_user_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(USER_CODE_HALF * 2 + 1);
    for i in 0..USER_CODE_HALF * 2 {
        if i == USER_CODE_HALF {
            code.push('-');
        }
        let idx = rng.random_range(0..USER_CODE_ALPHABET.len());
        code.push(USER_CODE_ALPHABET[idx] as char);
    }
    code
}

/// Canonical form of a typed user code: upper case, dash optional,
/// surrounding whitespace ignored. `None` if it cannot be a valid code.
pub fn normalize_user_code(input: &str) -> Option<String> {
    let chars: Vec<char> = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if chars.len() != USER_CODE_HALF * 2
        || !chars
            .iter()
            .all(|c| c.is_ascii() && USER_CODE_ALPHABET.contains(&(*c as u8)))
    {
        return None;
    }

    let (a, b) = chars.split_at(USER_CODE_HALF);
    Some(format!(
        "{}-{}",
        a.iter().collect::<String>(),
        b.iter().collect::<String>()
    ))
}

impl DeviceCodeRegistry {
    pub fn new(ttl: Duration, poll_interval: Duration) -> Self {
        Self {
            codes: Mutex::new(Codes::default()),
            ttl,
            poll_interval,
        }
    }

    // Every critical section leaves both indices consistent, so a poisoned
    // lock still guards valid data.
    fn codes(&self) -> MutexGuard<'_, Codes> {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending code pair for `device`.
    pub fn create(&self, device: DeviceInfo) -> DeviceCodeEntry {
        let expires_at = now().saturating_add(self.ttl.as_secs() as i64);
        let mut codes = self.codes();

        let user_code = loop {
            let candidate = generate_user_code();
            if !codes.by_user.contains_key(&candidate) {
                break candidate;
            }
        };
        let device_code = generate_device_code();

        let entry = DeviceCodeEntry {
            device_code: device_code.clone(),
            user_code: user_code.clone(),
            expires_at,
            poll_interval: self.poll_interval,
            authorized: false,
            user_id: None,
            tokens: None,
            device,
            last_polled_at: None,
        };

        codes.by_user.insert(user_code, device_code.clone());
        codes.by_device.insert(device_code, entry.clone());
        entry
    }

    /// Look up a user code without changing it.
    pub fn status(&self, user_code: &str) -> UserCodeStatus {
        let Some(user_code) = normalize_user_code(user_code) else {
            return UserCodeStatus::NotFound;
        };
        let now = now();
        let codes = self.codes();

        let Some(entry) = codes
            .by_user
            .get(&user_code)
            .and_then(|dc| codes.by_device.get(dc))
        else {
            return UserCodeStatus::NotFound;
        };

        if entry.is_expired(now) {
            UserCodeStatus::Expired
        } else if entry.authorized {
            UserCodeStatus::AlreadyAuthorized
        } else {
            UserCodeStatus::Pending {
                device: entry.device.clone(),
            }
        }
    }

    /// Perform the single `pending -> authorized` transition.
    pub fn authorize(&self, user_code: &str, user_id: &str, tokens: TokenPair) -> AuthorizeOutcome {
        let Some(user_code) = normalize_user_code(user_code) else {
            return AuthorizeOutcome::NotFound;
        };
        let now = now();
        let mut codes = self.codes();

        let Some(device_code) = codes.by_user.get(&user_code).cloned() else {
            return AuthorizeOutcome::NotFound;
        };
        let Some(entry) = codes.by_device.get_mut(&device_code) else {
            // Index without a primary; drop it.
            codes.by_user.remove(&user_code);
            return AuthorizeOutcome::NotFound;
        };

        if entry.is_expired(now) {
            codes.expire(&device_code);
            return AuthorizeOutcome::Expired;
        }
        if entry.authorized {
            return AuthorizeOutcome::AlreadyAuthorized;
        }

        entry.authorized = true;
        entry.user_id = Some(user_id.to_string());
        entry.tokens = Some(tokens);
        info!(user_code = %user_code, user_id = %user_id, "Device code authorized");
        AuthorizeOutcome::Authorized
    }

    /// Remove and return an entry, whatever its state.
    pub fn consume(&self, device_code: &str) -> Option<DeviceCodeEntry> {
        self.codes().remove(device_code)
    }

    /// Device-side poll. Hands out the tokens exactly once.
    pub fn poll(&self, device_code: &str) -> PollOutcome {
        let now = now();
        let mut codes = self.codes();

        let Some(entry) = codes.by_device.get_mut(device_code) else {
            return PollOutcome::NotFound;
        };

        if entry.is_expired(now) {
            codes.expire(device_code);
            return PollOutcome::Expired;
        }

        if entry.authorized {
            return match codes.remove(device_code).and_then(|e| e.tokens) {
                Some(tokens) => PollOutcome::Authorized(tokens),
                None => PollOutcome::NotFound,
            };
        }

        let too_soon = entry
            .last_polled_at
            .is_some_and(|last| now - last < entry.poll_interval.as_secs() as i64);
        entry.last_polled_at = Some(now);

        if too_soon {
            PollOutcome::SlowDown
        } else {
            PollOutcome::Pending
        }
    }

    /// Drop expired entries. Returns how many were removed. Sessions of
    /// authorized entries that were never polled are queued for
    /// [`take_orphans`](Self::take_orphans).
    pub fn sweep_expired(&self) -> usize {
        let now = now();
        let mut codes = self.codes();

        let expired: Vec<String> = codes
            .by_device
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.device_code.clone())
            .collect();

        for device_code in &expired {
            codes.expire(device_code);
        }
        expired.len()
    }

    /// Sessions whose device code expired after authorization, since the
    /// last call.
    pub fn take_orphans(&self) -> Vec<OrphanedSession> {
        std::mem::take(&mut self.codes().orphans)
    }

    /// Queue orphans again after a failed revocation.
    pub fn requeue_orphans(&self, orphans: Vec<OrphanedSession>) {
        self.codes().orphans.extend(orphans);
    }

    pub fn len(&self) -> usize {
        self.codes().by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
