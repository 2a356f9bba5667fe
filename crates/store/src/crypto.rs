//! AES-256-GCM encryption for API keys at rest (§4.1).
//!
//! The process-wide key is loaded once at startup (see `sa-gateway`'s
//! `config::load_encryption_key`) and never stored alongside the
//! ciphertext it protects.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;

use sa_domain::error::{Error, Result};

const NONCE_LEN: usize = 12;

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext` as one
/// blob so a single column holds everything needed to decrypt.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| Error::Internal("encrypting credential".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses [`encrypt`]. Any failure (wrong key, truncated blob, tampered
/// tag) is a single opaque error — callers turn this into "not found"
/// per §4.1, never surfacing the underlying crypto failure.
pub fn decrypt(key: &[u8; 32], blob: &[u8]) -> Result<String> {
    if blob.len() < NONCE_LEN {
        return Err(Error::Internal("ciphertext too short".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::Internal("decrypting credential".into()))?;

    String::from_utf8(plaintext).map_err(|_| Error::Internal("decrypted credential not utf-8".into()))
}

/// Parses the `SA_ENCRYPTION_KEY`-style env var: 32 raw bytes, base64.
pub fn parse_key(b64: &str) -> Result<[u8; 32]> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| Error::Internal(format!("encryption key is not valid base64: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::Internal(format!(
            "encryption key must decode to 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let key = test_key();
        let ct = encrypt(&key, "sk-super-secret-key").unwrap();
        let pt = decrypt(&key, &ct).unwrap();
        assert_eq!(pt, "sk-super-secret-key");
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let key = test_key();
        let ct = encrypt(&key, "sk-super-secret-key").unwrap();
        assert_ne!(ct, b"sk-super-secret-key".to_vec());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let ct = encrypt(&test_key(), "sk-super-secret-key").unwrap();
        let wrong = [9u8; 32];
        assert!(decrypt(&wrong, &ct).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key();
        let mut ct = encrypt(&key, "sk-super-secret-key").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(decrypt(&key, &ct).is_err());
    }

    #[test]
    fn parse_key_rejects_wrong_length() {
        let short = base64::engine::general_purpose::STANDARD.encode(b"too short");
        assert!(parse_key(&short).is_err());
    }

    #[test]
    fn parse_key_accepts_32_bytes() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([1u8; 32]);
        assert!(parse_key(&b64).is_ok());
    }
}
