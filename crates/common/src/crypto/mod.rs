//! Cryptographic primitives for BurnWare
//!
//! Everything above this module (pairwise messages, rooms, the vault and
//! backups) is composed from four pieces:
//!
//! - **Keys**: ECDH P-256 key pairs. Public keys travel as the 65-byte
//!   uncompressed point in base64; private keys travel as a JWK-shaped
//!   [`PortablePrivateKey`] so the curve parameters stay attached.
//! - **Secrets**: raw 256-bit AES-GCM keys ([`Secret`]) with a fresh random
//!   12-byte IV per seal.
//! - **Key agreement**: [`derive_symmetric_key`] turns an ECDH shared secret
//!   into a single-purpose AES key, either directly (legacy) or through
//!   HKDF-SHA256 with a fixed context string.
//! - **Passphrases**: PBKDF2-SHA256 derivation and private-key wrapping for
//!   backups.
//!
//! # Key agreement
//!
//! Both sides of an exchange call [`derive_symmetric_key`] with their own
//! private key and the other party's public key. The ECDH x-coordinate is the
//! same on both sides, so given the same [`KdfMode`] both derive the same AES
//! key without ever transmitting it. The returned key is typed by usage
//! ([`Seal`] or [`Open`]); a sealing key cannot open and vice versa.

mod kdf;
mod keys;
mod passphrase;
mod secret;

pub use kdf::{derive_symmetric_key, DerivedKey, KdfError, KdfMode, KeyUsage, Open, Seal};
pub use keys::{
    generate_key_pair, KeyError, KeyPair, PortablePrivateKey, PrivateKey, PublicKey,
    PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE,
};
pub use passphrase::{
    derive_passphrase_key, generate_salt, unwrap_private_key, unwrap_private_key_with,
    wrap_private_key, wrap_private_key_with, PassphraseError, Pbkdf2Params, WrappedPrivateKey,
    PBKDF2_MIN_ITERATIONS, SALT_SIZE,
};
pub use secret::{random_iv, Sealed, Secret, SecretError, IV_SIZE, SECRET_SIZE, TAG_SIZE};
