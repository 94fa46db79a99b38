//! Property-based tests across the primitive layers.

use proptest::prelude::*;

use crate::crc::{append_crc, crc16, split_verified};
use crate::envelope::{open_envelope, seal_envelope};
use crate::keys::SharedSecret;

proptest! {
    #[test]
    fn prop_crc_round_trip(body in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut framed = body.clone();
        append_crc(&mut framed);
        prop_assert_eq!(split_verified(&framed), Some(body.as_slice()));
    }

    #[test]
    fn prop_crc_detects_single_bit_flip(
        body in proptest::collection::vec(any::<u8>(), 1..128),
        bit in 0usize..8,
        idx_seed in any::<usize>(),
    ) {
        // Any single-bit error is within the code's guaranteed detection.
        let mut framed = body;
        append_crc(&mut framed);
        let idx = idx_seed % framed.len();
        framed[idx] ^= 1 << bit;
        prop_assert_eq!(split_verified(&framed), None);
    }

    #[test]
    fn prop_crc_rejects_wrong_trailer(
        body in proptest::collection::vec(any::<u8>(), 0..128),
        delta in 1u16..=u16::MAX,
    ) {
        let mut framed = body.clone();
        let crc = crc16(&body).wrapping_add(delta);
        framed.extend_from_slice(&crc.to_le_bytes());
        prop_assert_eq!(split_verified(&framed), None);
    }

    #[test]
    fn prop_envelope_round_trip(
        plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        key in any::<[u8; 32]>(),
        nonce in any::<[u8; 32]>(),
        auth_id in any::<[u8; 4]>(),
    ) {
        let secret = SharedSecret::from_bytes(key);
        let sealed = seal_envelope(&plaintext, &secret, &nonce, &auth_id);
        let (got_id, got_plain) = open_envelope(&sealed, &secret).unwrap();
        prop_assert_eq!(got_id, auth_id);
        prop_assert_eq!(got_plain, plaintext);
    }

    #[test]
    fn prop_tampered_envelope_never_yields_original(
        plaintext in proptest::collection::vec(any::<u8>(), 1..128),
        key in any::<[u8; 32]>(),
        nonce in any::<[u8; 32]>(),
        flip_seed in any::<usize>(),
        bit in 0usize..8,
    ) {
        let secret = SharedSecret::from_bytes(key);
        let mut sealed = seal_envelope(&plaintext, &secret, &nonce, &[0; 4]);
        // Flip one ciphertext bit; decryption must not reproduce the
        // original plaintext (it may fail outright on bad padding).
        let ct_start = 36;
        let idx = ct_start + flip_seed % (sealed.len() - ct_start);
        sealed[idx] ^= 1 << bit;
        if let Ok((_, plain)) = open_envelope(&sealed, &secret) {
            prop_assert_ne!(plain, plaintext);
        }
    }
}
