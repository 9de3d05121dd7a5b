//! Random identifiers for orders and referral links

use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Symbols used in every generated code.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of order ids and referral codes.
pub const CODE_LEN: usize = 8;

/// Generated candidates checked before falling back to a time-salted code.
pub const REFERRAL_CODE_ATTEMPTS: u32 = 10;

/// Returns a random string of `len` symbols from [`CODE_ALPHABET`].
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Returns a fresh 8-symbol order id.
pub fn generate_order_id() -> String {
    generate_code(CODE_LEN)
}

/// Generates a referral code the store does not know yet.
///
/// `exists` is asked about every candidate. A lookup error is logged and
/// counts as a failed attempt. After [`REFERRAL_CODE_ATTEMPTS`] misses the
/// code is six random symbols followed by the current nanoseconds modulo
/// 10000, which keeps the collision chance negligible without another query.
pub fn unique_referral_code<F, E>(mut exists: F) -> String
where
    F: FnMut(&str) -> Result<bool, E>,
    E: Display,
{
    for attempt in 1..=REFERRAL_CODE_ATTEMPTS {
        let candidate = generate_code(CODE_LEN);
        match exists(&candidate) {
            Ok(false) => return candidate,
            Ok(true) => {
                tracing::debug!(attempt, code = %candidate, "Referral code already taken");
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Referral code lookup failed");
            }
        }
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let fallback = format!("{}{}", generate_code(6), nanos % 10_000);
    tracing::warn!(code = %fallback, "Referral code attempts exhausted, using time-salted code");
    fallback
}
