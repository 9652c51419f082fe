//! Line sealing with AES-256-GCM.
//!
//! On-disk form of a sealed line: `base64(nonce ‖ ciphertext ‖ tag)` with a
//! fresh 12-byte random nonce per line. Two encryptions of the same
//! plaintext therefore never produce the same output.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{AuditError, AuditResult};

/// GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Seals and opens individual audit lines.
#[derive(Clone)]
pub struct AuditCipher {
    cipher: Aes256Gcm,
}

impl AuditCipher {
    /// Build a cipher from a 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Seal one line.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::EncryptFailed`] if the AEAD rejects the input.
    pub fn encrypt_line(&self, line: &str) -> AuditResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, line.as_bytes())
            .map_err(|_| AuditError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Open one sealed line, verifying the authentication tag.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::DecryptFailed`] for bad base64, a truncated
    /// payload, a failed tag check, or non-UTF-8 plaintext.
    pub fn decrypt_line(&self, encoded: &str) -> AuditResult<String> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|_| AuditError::DecryptFailed {
                detail: "not valid base64".to_string(),
            })?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(AuditError::DecryptFailed {
                detail: "payload too short".to_string(),
            });
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AuditError::DecryptFailed {
                detail: "authentication failed".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| AuditError::DecryptFailed {
            detail: "plaintext is not UTF-8".to_string(),
        })
    }
}

impl std::fmt::Debug for AuditCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("AuditCipher").finish_non_exhaustive()
    }
}
