//! Field-level encryption service
//!
//! AES-256-GCM with a key derived from a passphrase via PBKDF2-HMAC-SHA256.
//! Key material is derived lazily, exactly once per service instance, on
//! the blocking pool. Every encryption call draws a fresh random 12-byte
//! nonce; reuse would break the AEAD mode. The salt is fixed across
//! derivations: the passphrase is the primary secret and the iteration
//! count carries the brute-force resistance.
//!
//! Token format: `base64(nonce) + ":" + base64(ciphertext)`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::OnceCell;
use zeroize::Zeroizing;

/// PBKDF2 iteration count
const KDF_ITERATIONS: u32 = 100_000;

/// Fixed derivation salt
const KDF_SALT: &[u8] = b"statevault.kdf.v1";

/// Nonce length for AES-GCM
const NONCE_LEN: usize = 12;

/// Errors from the cipher service
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key material could not be derived
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Token has the wrong shape (part count or base64)
    #[error("Malformed cipher token: {0}")]
    MalformedToken(String),

    /// AEAD authentication failed: tampered payload or wrong key
    #[error("Decryption failed: authentication error")]
    AuthenticationFailed,
}

/// Encrypts and decrypts string payloads with a passphrase-derived key
pub struct CipherService {
    passphrase: Zeroizing<String>,
    key: OnceCell<Zeroizing<[u8; 32]>>,
}

impl CipherService {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
            key: OnceCell::new(),
        }
    }

    /// Derive and cache key material. Idempotent: only the first call pays
    /// the derivation cost.
    pub async fn init(&self) -> Result<(), CipherError> {
        self.key_material().await.map(|_| ())
    }

    async fn key_material(&self) -> Result<&Zeroizing<[u8; 32]>, CipherError> {
        self.key
            .get_or_try_init(|| async {
                let passphrase = self.passphrase.clone();
                tokio::task::spawn_blocking(move || {
                    let mut key = Zeroizing::new([0u8; 32]);
                    pbkdf2_hmac::<Sha256>(
                        passphrase.as_bytes(),
                        KDF_SALT,
                        KDF_ITERATIONS,
                        &mut *key,
                    );
                    key
                })
                .await
                .map_err(|e| CipherError::KeyDerivation(e.to_string()))
            })
            .await
    }

    /// Encrypt a plaintext string into a token
    pub async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let key = self.key_material().await?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    /// Decrypt a token produced by [`encrypt`](Self::encrypt)
    pub async fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let mut parts = token.split(':');
        let (nonce_part, cipher_part) = match (parts.next(), parts.next(), parts.next()) {
            (Some(nonce), Some(cipher), None) => (nonce, cipher),
            _ => {
                return Err(CipherError::MalformedToken(
                    "expected exactly two colon-separated parts".to_string(),
                ))
            }
        };

        let nonce_bytes = BASE64
            .decode(nonce_part)
            .map_err(|e| CipherError::MalformedToken(format!("nonce: {}", e)))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::MalformedToken(format!(
                "nonce length {}, expected {}",
                nonce_bytes.len(),
                NONCE_LEN
            )));
        }
        let ciphertext = BASE64
            .decode(cipher_part)
            .map_err(|e| CipherError::MalformedToken(format!("ciphertext: {}", e)))?;

        let key = self.key_material().await?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CipherError::AuthenticationFailed)?;

        String::from_utf8(plaintext)
            .map_err(|e| CipherError::MalformedToken(format!("plaintext utf-8: {}", e)))
    }
}
