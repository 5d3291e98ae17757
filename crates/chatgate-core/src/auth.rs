//! Telegram login-widget assertion verification.
//!
//! The widget signs the user fields with HMAC-SHA256 keyed by
//! `SHA256(bot_token)`. Fields are joined as `key=value` lines in declaration
//! order (not alphabetically), which is what the login flow in front of this
//! gateway produces.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock skew for assertions dated in the future.
const FUTURE_SKEW_SECS: i64 = 60;

/// Signed identity assertion as posted by the login widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramAssertion {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub photo_url: String,
    pub auth_date: i64,
    pub hash: String,
}

impl TelegramAssertion {
    /// Canonical string the signature is computed over.
    pub fn check_string(&self) -> String {
        [
            format!("id={}", self.id),
            format!("first_name={}", self.first_name),
            format!("last_name={}", self.last_name),
            format!("username={}", self.username),
            format!("photo_url={}", self.photo_url),
            format!("auth_date={}", self.auth_date),
        ]
        .join("\n")
    }
}

/// Verifies assertions against the bot token.
///
/// Only the derived key is kept; the token itself is dropped after construction.
#[derive(Clone)]
pub struct TelegramVerifier {
    secret_key: [u8; 32],
    max_age: Option<Duration>,
}

impl std::fmt::Debug for TelegramVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramVerifier")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl TelegramVerifier {
    pub fn new(bot_token: &str) -> Self {
        Self {
            secret_key: derive_key(bot_token),
            max_age: None,
        }
    }

    /// Reject assertions whose `auth_date` is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Signature check only. Never panics; malformed input is `false`.
    pub fn verify(&self, assertion: &TelegramAssertion) -> bool {
        if !is_lower_hex_sha256(&assertion.hash) {
            return false;
        }
        let Ok(expected) = hex::decode(&assertion.hash) else {
            return false;
        };
        let Some(mut mac) = keyed(&self.secret_key) else {
            return false;
        };
        mac.update(assertion.check_string().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    /// Signature check plus the optional freshness window, evaluated at `now`
    /// (unix seconds).
    pub fn verify_at(&self, assertion: &TelegramAssertion, now: i64) -> bool {
        if !self.verify(assertion) {
            return false;
        }
        let Some(max_age) = self.max_age else {
            return true;
        };
        let age = now.saturating_sub(assertion.auth_date);
        age >= -FUTURE_SKEW_SECS && age <= i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX)
    }

    pub fn verify_now(&self, assertion: &TelegramAssertion) -> bool {
        self.verify_at(assertion, chrono::Utc::now().timestamp())
    }
}

fn is_lower_hex_sha256(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn derive_key(bot_token: &str) -> [u8; 32] {
    let digest = Sha256::digest(bot_token.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

fn keyed(key: &[u8; 32]) -> Option<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key).ok()
}

/// Lowercase hex HMAC over the assertion's check string, as the widget
/// computes it. The verifier itself compares in constant time.
pub fn sign(bot_token: &str, assertion: &TelegramAssertion) -> Option<String> {
    let mut mac = keyed(&derive_key(bot_token))?;
    mac.update(assertion.check_string().as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}
