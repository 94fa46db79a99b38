//! Key agreement and session key derivation.
//!
//! Pairing performs an X25519 exchange; the raw shared point is never used
//! as a key directly. It runs through HKDF-SHA256 with a fixed protocol
//! label to produce the 32-byte long-term secret shared with the lock.

use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the derived shared secret in bytes.
pub const SHARED_SECRET_LEN: usize = 32;

/// Length of protocol nonces in bytes.
pub const NONCE_LEN: usize = 32;

/// Domain-separation label for session key derivation.
const KEY_INFO: &[u8] = b"keylink secure channel key v1";

/// A 32-byte protocol nonce. The first 16 bytes double as the CBC IV.
pub type Nonce = [u8; NONCE_LEN];

/// Generate a fresh random nonce.
pub fn generate_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).expect("os rng unavailable");
    nonce
}

/// An ephemeral X25519 keypair used for one pairing handshake.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Our public key bytes, sent to the lock in the clear.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Derive the long-term shared secret from the lock's public key.
    pub fn derive_shared(&self, remote_public: &[u8; 32]) -> SharedSecret {
        let dh = self.secret.diffie_hellman(&PublicKey::from(*remote_public));
        let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
        let mut key = [0u8; SHARED_SECRET_LEN];
        hk.expand(KEY_INFO, &mut key).expect("hkdf expand");
        SharedSecret::from_bytes(key)
    }
}

/// The long-term secret shared with one lock.
///
/// Zeroed on drop. Cloning is allowed because the engine, the trust store
/// and an in-flight session each hold their own copy.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SharedSecret(..)")
    }
}
