//! The secure envelope used for all post-pairing traffic.
//!
//! Layout: `nonce(32) || authorization_id(4) || ciphertext`, where the
//! ciphertext is the AES-256-CBC encryption of the plaintext command body
//! with PKCS#7 padding and the IV taken from the first 16 nonce bytes.
//! The plaintext itself carries a trailing CRC-16; the cipher provides no
//! integrity of its own, so callers must verify that checksum after open.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::keys::{Nonce, SharedSecret, NONCE_LEN};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of the authorization id field in bytes.
pub const AUTH_ID_LEN: usize = 4;

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Smallest well-formed envelope: header plus one cipher block.
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + AUTH_ID_LEN + BLOCK_LEN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope too short: {0} bytes")]
    TooShort(usize),
    #[error("ciphertext length {0} is not a whole number of blocks")]
    RaggedCiphertext(usize),
    #[error("decryption failed")]
    DecryptFailed,
}

/// Encrypt `plaintext` and frame it as an envelope.
pub fn seal_envelope(
    plaintext: &[u8],
    secret: &SharedSecret,
    nonce: &Nonce,
    auth_id: &[u8; AUTH_ID_LEN],
) -> Vec<u8> {
    let iv: [u8; IV_LEN] = nonce[..IV_LEN].try_into().expect("nonce holds an iv");
    let ciphertext = Aes256CbcEnc::new(secret.as_bytes().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(NONCE_LEN + AUTH_ID_LEN + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(auth_id);
    out.extend_from_slice(&ciphertext);
    out
}

/// Open an envelope, returning the sender's authorization id and the
/// decrypted plaintext.
pub fn open_envelope(
    envelope: &[u8],
    secret: &SharedSecret,
) -> Result<([u8; AUTH_ID_LEN], Vec<u8>), EnvelopeError> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(EnvelopeError::TooShort(envelope.len()));
    }
    let (nonce, rest) = envelope.split_at(NONCE_LEN);
    let (auth_id, ciphertext) = rest.split_at(AUTH_ID_LEN);
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(EnvelopeError::RaggedCiphertext(ciphertext.len()));
    }

    let iv: [u8; IV_LEN] = nonce[..IV_LEN].try_into().expect("length checked");
    let plaintext = Aes256CbcDec::new(secret.as_bytes().into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| EnvelopeError::DecryptFailed)?;

    let auth_id: [u8; AUTH_ID_LEN] = auth_id.try_into().expect("length checked");
    Ok((auth_id, plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_nonce;

    fn secret() -> SharedSecret {
        SharedSecret::from_bytes([0x42; 32])
    }

    #[test]
    fn test_seal_open_round_trip() {
        let nonce = generate_nonce();
        let sealed = seal_envelope(b"\x0d\x00\x01\x12\x34", &secret(), &nonce, &[1, 2, 3, 4]);
        let (auth_id, plain) = open_envelope(&sealed, &secret()).unwrap();
        assert_eq!(auth_id, [1, 2, 3, 4]);
        assert_eq!(plain, b"\x0d\x00\x01\x12\x34");
    }

    #[test]
    fn test_layout() {
        let nonce = [0xAB; 32];
        let sealed = seal_envelope(b"hi", &secret(), &nonce, &[9, 8, 7, 6]);
        assert_eq!(&sealed[..32], &nonce);
        assert_eq!(&sealed[32..36], &[9, 8, 7, 6]);
        // Two bytes pad to one block.
        assert_eq!(sealed.len(), MIN_ENVELOPE_LEN);
    }

    #[test]
    fn test_wrong_key_fails_or_garbles() {
        let nonce = generate_nonce();
        let sealed = seal_envelope(b"payload bytes here", &secret(), &nonce, &[0; 4]);
        let other = SharedSecret::from_bytes([0x24; 32]);
        match open_envelope(&sealed, &other) {
            Err(EnvelopeError::DecryptFailed) => {}
            Ok((_, plain)) => assert_ne!(plain, b"payload bytes here"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let nonce = generate_nonce();
        let sealed = seal_envelope(b"abc", &secret(), &nonce, &[0; 4]);
        assert_eq!(
            open_envelope(&sealed[..MIN_ENVELOPE_LEN - 1], &secret()),
            Err(EnvelopeError::TooShort(MIN_ENVELOPE_LEN - 1))
        );
    }

    #[test]
    fn test_ragged_ciphertext_rejected() {
        let nonce = generate_nonce();
        let mut sealed = seal_envelope(b"abcdefghijklmnopq", &secret(), &nonce, &[0; 4]);
        sealed.pop();
        assert!(matches!(
            open_envelope(&sealed, &secret()),
            Err(EnvelopeError::RaggedCiphertext(_))
        ));
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let nonce = generate_nonce();
        let sealed = seal_envelope(b"", &secret(), &nonce, &[0; 4]);
        let (_, plain) = open_envelope(&sealed, &secret()).unwrap();
        assert!(plain.is_empty());
    }
}
