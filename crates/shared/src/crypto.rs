//! Cryptographic utilities for token generation and hashing.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a reset/activation token.
const RESET_TOKEN_BYTES: usize = 24;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generates a URL-safe random token for password resets and account activation.
///
/// The token is 32 characters of unpadded base64 (24 bytes of entropy), so it
/// can travel in a path segment without escaping.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
