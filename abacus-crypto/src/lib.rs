#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Crypto primitives shared by the auth surface and the email pipeline:
//! token digests, constant-time comparison, symmetric envelope encryption
//! for third-party credentials, and random secret material.

use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("encryption failure: {0}")]
    Encrypt(String),
    #[error("decryption failure: {0}")]
    Decrypt(String),
}

/// Hex SHA-256 of an opaque secret. This digest is what the store keeps;
/// the raw secret never lands in a table.
#[must_use]
pub fn token_digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Equality without an early exit, so a lookup cannot leak how much of a
/// stored digest matched. Both inputs are fixed-width digests; a length
/// mismatch is not secret.
#[must_use]
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    let left = left.as_bytes();
    let right = right.as_bytes();
    if left.len() != right.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in left.iter().zip(right.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Random alphanumeric secret body from the thread's CSPRNG.
#[must_use]
pub fn generate_secret(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A 6-digit decimal one-time code.
#[must_use]
pub fn generate_otp_code() -> String {
    let mut rng = rand::rng();
    (0..6)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Process-wide symmetric key for credentials held at rest. Ciphertexts are
/// opaque to the rest of the core: base64 of `nonce || AES-256-GCM body`.
#[derive(Clone)]
pub struct EnvelopeKey {
    key: [u8; 32],
}

impl EnvelopeKey {
    #[must_use]
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let bytes =
            hex::decode(encoded).map_err(|err| CryptoError::InvalidKey(err.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("key must be 32 bytes".into()))?;
        Ok(Self { key })
    }

    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key);
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        if plaintext.is_empty() {
            return Err(CryptoError::Encrypt("cannot encrypt empty input".into()));
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let body = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|err| CryptoError::Encrypt(err.to_string()))?;
        let mut payload = nonce_bytes.to_vec();
        payload.extend_from_slice(&body);
        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        let payload = BASE64
            .decode(ciphertext)
            .map_err(|err| CryptoError::Decrypt(err.to_string()))?;
        if payload.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt("ciphertext too short".into()));
        }
        let (nonce_bytes, body) = payload.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| CryptoError::Decrypt("authentication failed".into()))?;
        String::from_utf8(plaintext).map_err(|err| CryptoError::Decrypt(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn digests_are_stable_hex_sha256() {
        let digest = token_digest("abk_example");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("abk_example"));
        assert_ne!(digest, token_digest("abk_other"));
    }

    #[test]
    fn constant_time_eq_matches_plain_equality() {
        let a = token_digest("one");
        let b = token_digest("two");
        assert!(constant_time_eq(&a, &a));
        assert!(!constant_time_eq(&a, &b));
        assert!(!constant_time_eq(&a, &a[..32]));
    }

    #[test]
    fn secrets_are_alphanumeric_of_requested_length() {
        let secret = generate_secret(48);
        assert_eq!(secret.len(), 48);
        assert!(secret.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }

    #[test]
    fn otp_codes_are_six_decimal_digits() {
        for _ in 0..32 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|ch| ch.is_ascii_digit()));
        }
    }

    #[test]
    fn envelope_round_trips() {
        let key = EnvelopeKey::generate();
        let ciphertext = key.encrypt("refresh-token-blob").expect("encrypt");
        assert_ne!(ciphertext, "refresh-token-blob");
        assert_eq!(key.decrypt(&ciphertext).expect("decrypt"), "refresh-token-blob");
    }

    #[test]
    fn envelope_rejects_wrong_key_and_tampering() {
        let key = EnvelopeKey::generate();
        let other = EnvelopeKey::generate();
        let ciphertext = key.encrypt("secret").expect("encrypt");

        assert!(matches!(
            other.decrypt(&ciphertext),
            Err(CryptoError::Decrypt(_))
        ));

        let mut bytes = BASE64.decode(&ciphertext).expect("decode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert!(matches!(key.decrypt(&tampered), Err(CryptoError::Decrypt(_))));
    }

    #[test]
    fn hex_keys_must_be_32_bytes() {
        assert!(EnvelopeKey::from_hex("abcd").is_err());
        let key = EnvelopeKey::generate();
        let encoded = hex::encode(key.key);
        assert!(EnvelopeKey::from_hex(&encoded).is_ok());
    }
}
