//! ECDH key agreement into single-purpose AES-256-GCM keys

use std::fmt;
use std::marker::PhantomData;

use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{PrivateKey, PublicKey};
use super::secret::{Secret, SecretError, IV_SIZE, SECRET_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum KdfError {
    #[error("hkdf expand failed")]
    Expand,
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// How the raw ECDH shared secret becomes an AES key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfMode<'a> {
    /// Use the 32-byte shared x-coordinate as the AES key as-is
    Direct,
    /// HKDF-SHA256, no salt, with a fixed domain-separation string
    Hkdf { info: &'a [u8] },
}

mod sealed {
    pub trait Sealed {}
}

/// Marker for what a [`DerivedKey`] may be used for
pub trait KeyUsage: sealed::Sealed {
    const NAME: &'static str;
}

/// Encrypt / wrap only
#[derive(Debug, Clone, Copy)]
pub struct Seal;
/// Decrypt / unwrap only
#[derive(Debug, Clone, Copy)]
pub struct Open;

impl sealed::Sealed for Seal {}
impl sealed::Sealed for Open {}

impl KeyUsage for Seal {
    const NAME: &'static str = "seal";
}

impl KeyUsage for Open {
    const NAME: &'static str = "open";
}

/// AES-256-GCM key agreed through ECDH, restricted to one usage
pub struct DerivedKey<U: KeyUsage> {
    secret: Secret,
    _usage: PhantomData<U>,
}

impl<U: KeyUsage> fmt::Debug for DerivedKey<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("usage", &U::NAME)
            .finish_non_exhaustive()
    }
}

impl DerivedKey<Seal> {
    pub fn seal(&self, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, KdfError> {
        Ok(self.secret.seal_with_iv(iv, plaintext)?)
    }
}

impl DerivedKey<Open> {
    pub fn open(&self, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, KdfError> {
        Ok(self.secret.open_with_iv(iv, ciphertext)?)
    }
}

/// Agree on a symmetric key with a peer
///
/// Performs ECDH between `own_private_key` and `peer_public_key` and turns the
/// shared secret into an AES-256-GCM key according to `mode`. Given the same
/// two key pairs and the same `mode`, both parties derive bit-identical keys.
pub fn derive_symmetric_key<U: KeyUsage>(
    peer_public_key: &PublicKey,
    own_private_key: &PrivateKey,
    mode: KdfMode<'_>,
) -> Result<DerivedKey<U>, KdfError> {
    let shared = diffie_hellman(
        own_private_key.inner().to_nonzero_scalar(),
        peer_public_key.inner().as_affine(),
    );

    let secret = match mode {
        KdfMode::Direct => Secret::from_slice(shared.raw_secret_bytes().as_slice())?,
        KdfMode::Hkdf { info } => {
            let hkdf = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
            let mut okm = Zeroizing::new([0u8; SECRET_SIZE]);
            hkdf.expand(info, &mut okm[..])
                .map_err(|_| KdfError::Expand)?;
            Secret::from(*okm)
        }
    };

    Ok(DerivedKey {
        secret,
        _usage: PhantomData,
    })
}
