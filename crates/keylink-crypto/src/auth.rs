//! HMAC-SHA256 pairing authenticators.
//!
//! Every authenticated pairing message carries an HMAC over the
//! concatenation of the fields it commits to, keyed with the derived
//! shared secret. Verification is constant-time.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::SharedSecret;

type HmacSha256 = Hmac<Sha256>;

/// Length of an authenticator in bytes.
pub const AUTHENTICATOR_LEN: usize = 32;

/// Compute the authenticator over the concatenation of `parts`.
pub fn compute_authenticator(secret: &SharedSecret, parts: &[&[u8]]) -> [u8; AUTHENTICATOR_LEN] {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Verify a received authenticator in constant time.
pub fn verify_authenticator(secret: &SharedSecret, parts: &[&[u8]], received: &[u8]) -> bool {
    let expected = compute_authenticator(secret, parts);
    constant_time_eq(&expected, received)
}
