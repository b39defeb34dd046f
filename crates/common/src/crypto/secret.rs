//! Symmetric encryption using AES-256-GCM
//!
//! A [`Secret`] is a raw 256-bit key. It is used directly as a room's group
//! key, as a broadcast channel key, as the vault master key and as the
//! passphrase-derived wrapping key for backups. Every seal draws a fresh
//! random 12-byte IV; nothing here keeps a nonce counter.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Size of an AES-GCM IV in bytes
pub const IV_SIZE: usize = 12;
/// Size of an AES-256 key in bytes
pub const SECRET_SIZE: usize = 32;
/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("random number generator failure: {0}")]
    Rng(#[from] getrandom::Error),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// AES-GCM open failed: wrong key, wrong IV or tampered ciphertext
    #[error("authentication failed")]
    Authentication,
}

/// Fill a fresh random IV from the OS RNG
pub fn random_iv() -> Result<[u8; IV_SIZE], SecretError> {
    let mut iv = [0u8; IV_SIZE];
    getrandom::getrandom(&mut iv)?;
    Ok(iv)
}

/// Ciphertext (including the GCM tag) together with the IV it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_SIZE],
}

impl Sealed {
    /// Rebuild from base64-encoded parts
    pub fn from_base64(ciphertext: &str, iv: &str) -> Result<Self, SecretError> {
        let ciphertext = STANDARD.decode(ciphertext)?;
        let iv_bytes = STANDARD.decode(iv)?;
        if iv_bytes.len() != IV_SIZE {
            return Err(anyhow::anyhow!(
                "invalid iv size, expected {}, got {}",
                IV_SIZE,
                iv_bytes.len()
            )
            .into());
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&iv_bytes);
        Ok(Self { ciphertext, iv })
    }

    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    pub fn iv_base64(&self) -> String {
        STANDARD.encode(self.iv)
    }
}

/// A 256-bit AES-GCM key
///
/// Serializes as base64 of the raw key bytes, the format rooms and broadcast
/// channels exchange and persist.
///
/// # Examples
///
/// ```ignore
/// let secret = Secret::generate()?;
/// let sealed = secret.seal(b"sensitive data")?;
/// let recovered = secret.open(&sealed)?;
/// assert_eq!(b"sensitive data", &recovered[..]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using the OS RNG
    pub fn generate() -> Result<Self, SecretError> {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff)?;
        Ok(Self(buff))
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        let mut bytes = STANDARD.decode(encoded)?;
        let secret = Self::from_slice(&bytes);
        bytes.zeroize();
        secret
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Encrypt under a fresh random IV
    pub fn seal(&self, plaintext: &[u8]) -> Result<Sealed, SecretError> {
        let iv = random_iv()?;
        let ciphertext = self.seal_with_iv(&iv, plaintext)?;
        Ok(Sealed { ciphertext, iv })
    }

    /// Encrypt under a caller-chosen IV
    ///
    /// The caller is responsible for never reusing `iv` with this key.
    pub fn seal_with_iv(&self, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        self.cipher()
            .encrypt(Nonce::from_slice(iv), plaintext)
            .map_err(|_| anyhow::anyhow!("encrypt error").into())
    }

    /// Decrypt and authenticate
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Authentication`] on any tag mismatch, which
    /// covers a wrong key, a wrong IV and tampered ciphertext alike.
    pub fn open(&self, sealed: &Sealed) -> Result<Vec<u8>, SecretError> {
        self.open_with_iv(&sealed.iv, &sealed.ciphertext)
    }

    pub fn open_with_iv(&self, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        self.cipher()
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| SecretError::Authentication)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Secret::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
