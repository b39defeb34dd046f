//! Passphrase-derived keys and private-key wrapping
//!
//! PBKDF2-SHA256 turns a passphrase and a random 32-byte salt into an
//! AES-256-GCM key. Wrapping seals the JSON [`PortablePrivateKey`] export, so
//! the curve parameters survive the round trip; unwrapping with the wrong
//! passphrase fails on the GCM tag and is reported as
//! [`PassphraseError::IncorrectPassphrase`], never as a garbage key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{KeyError, PortablePrivateKey, PrivateKey};
use super::secret::{Secret, SecretError, IV_SIZE, SECRET_SIZE};

/// Lowest PBKDF2 iteration count accepted for new derivations
pub const PBKDF2_MIN_ITERATIONS: u32 = 600_000;
/// Size of a passphrase salt in bytes
pub const SALT_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum PassphraseError {
    #[error("incorrect passphrase")]
    IncorrectPassphrase,
    #[error("pbkdf2 iteration count {0} is below the minimum of 600000")]
    WeakParams(u32),
    #[error("malformed wrapped key: {0}")]
    Malformed(String),
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// PBKDF2-SHA256 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pbkdf2Params {
    iterations: u32,
}

impl Default for Pbkdf2Params {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_MIN_ITERATIONS,
        }
    }
}

impl Pbkdf2Params {
    /// # Errors
    ///
    /// Rejects iteration counts below [`PBKDF2_MIN_ITERATIONS`].
    pub fn new(iterations: u32) -> Result<Self, PassphraseError> {
        if iterations < PBKDF2_MIN_ITERATIONS {
            return Err(PassphraseError::WeakParams(iterations));
        }
        Ok(Self { iterations })
    }

    /// Parameters read back from persisted metadata. Whatever was used to
    /// create a record must be used again to open it.
    pub(crate) fn stored(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Cheap parameters so unit tests don't spend seconds per derivation
    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self { iterations: 1_000 }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

/// Generate a random 32-byte salt
pub fn generate_salt() -> Result<[u8; SALT_SIZE], PassphraseError> {
    let mut salt = [0u8; SALT_SIZE];
    getrandom::getrandom(&mut salt).map_err(SecretError::from)?;
    Ok(salt)
}

/// Derive an AES-256-GCM key from a passphrase
///
/// Deterministic: the same passphrase, salt and parameters always produce the
/// same key.
pub fn derive_passphrase_key(passphrase: &str, salt: &[u8], params: &Pbkdf2Params) -> Secret {
    let mut output = Zeroizing::new([0u8; SECRET_SIZE]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, params.iterations, &mut output[..]);
    Secret::from(*output)
}

/// A private key sealed under a passphrase-derived key
///
/// This is exactly what the backup endpoint stores: the base64 ciphertext of
/// the portable key export, plus the hex salt and IV needed to re-derive and
/// open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedPrivateKey {
    pub wrapped_key: String,
    pub salt: String,
    pub iv: String,
}

impl WrappedPrivateKey {
    pub fn unwrap_with(
        &self,
        passphrase: &str,
        params: &Pbkdf2Params,
    ) -> Result<PrivateKey, PassphraseError> {
        unwrap_private_key_with(&self.wrapped_key, passphrase, &self.salt, &self.iv, params)
    }
}

/// Wrap a private key under a passphrase with the default parameters
pub fn wrap_private_key(
    private_key: &PrivateKey,
    passphrase: &str,
) -> Result<WrappedPrivateKey, PassphraseError> {
    wrap_private_key_with(private_key, passphrase, &Pbkdf2Params::default())
}

pub fn wrap_private_key_with(
    private_key: &PrivateKey,
    passphrase: &str,
    params: &Pbkdf2Params,
) -> Result<WrappedPrivateKey, PassphraseError> {
    let salt = generate_salt()?;
    let key = derive_passphrase_key(passphrase, &salt, params);

    let export = Zeroizing::new(
        serde_json::to_vec(&private_key.to_portable())
            .map_err(|e| PassphraseError::Malformed(e.to_string()))?,
    );
    let sealed = key.seal(&export)?;

    Ok(WrappedPrivateKey {
        wrapped_key: sealed.ciphertext_base64(),
        salt: hex::encode(salt),
        iv: hex::encode(sealed.iv),
    })
}

/// Unwrap a private key with the default parameters
pub fn unwrap_private_key(
    wrapped_key: &str,
    passphrase: &str,
    salt: &str,
    iv: &str,
) -> Result<PrivateKey, PassphraseError> {
    unwrap_private_key_with(wrapped_key, passphrase, salt, iv, &Pbkdf2Params::default())
}

/// # Errors
///
/// Returns [`PassphraseError::IncorrectPassphrase`] when the GCM tag does not
/// verify, which is what a wrong passphrase produces. Structural problems
/// (bad hex/base64, wrong IV length, an export that is not a P-256 key) are
/// reported separately.
pub fn unwrap_private_key_with(
    wrapped_key: &str,
    passphrase: &str,
    salt: &str,
    iv: &str,
    params: &Pbkdf2Params,
) -> Result<PrivateKey, PassphraseError> {
    let salt = hex::decode(salt)?;
    let iv_bytes = hex::decode(iv)?;
    if iv_bytes.len() != IV_SIZE {
        return Err(PassphraseError::Malformed(format!(
            "iv must be {} bytes, got {}",
            IV_SIZE,
            iv_bytes.len()
        )));
    }
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&iv_bytes);
    let ciphertext = STANDARD.decode(wrapped_key)?;

    let key = derive_passphrase_key(passphrase, &salt, params);
    let export = match key.open_with_iv(&iv, &ciphertext) {
        Ok(export) => Zeroizing::new(export),
        Err(SecretError::Authentication) => return Err(PassphraseError::IncorrectPassphrase),
        Err(e) => return Err(e.into()),
    };

    let portable: PortablePrivateKey = serde_json::from_slice(&export)
        .map_err(|e| PassphraseError::Malformed(e.to_string()))?;
    Ok(PrivateKey::from_portable(&portable)?)
}
