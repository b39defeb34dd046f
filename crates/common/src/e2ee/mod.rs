//! Pairwise encryption: anonymous sender to link owner
//!
//! Every message is sealed under a fresh ephemeral key pair, so compromising
//! one message key says nothing about any other. The result is a single
//! versioned blob, base64 encoded:
//!
//! ```text
//! [ version: 1 ][ ephemeral_pubkey: 65 ][ iv: 12 ][ ciphertext || tag ]
//! ```
//!
//! | version | AES key                                           |
//! |---------|---------------------------------------------------|
//! | `0x01`  | raw ECDH shared secret (legacy, decrypt only)     |
//! | `0x02`  | HKDF-SHA256(shared secret, info = [`BLOB_HKDF_INFO`]) |
//!
//! Decryption dispatches on the leading byte through [`OPENERS`]. Every
//! failure (unknown version, truncation, bad tag, non UTF-8 plaintext) is
//! reported as the same [`E2eeError::Undecryptable`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::crypto::{
    derive_symmetric_key, random_iv, DerivedKey, KdfError, KdfMode, KeyError, KeyPair, Open,
    PrivateKey, PublicKey, Seal, SecretError, IV_SIZE, PUBLIC_KEY_SIZE,
};

/// Domain separation for the HKDF step of version `0x02` blobs
pub const BLOB_HKDF_INFO: &[u8] = b"burnware-e2ee-message-v2";
/// Smallest blob that can possibly be valid
pub const MIN_BLOB_SIZE: usize = 1 + PUBLIC_KEY_SIZE + IV_SIZE + 1;
/// Text shown in place of a message that could not be decrypted
pub const DECRYPT_PLACEHOLDER: &str = "[unable to decrypt]";

const EPHEMERAL_OFFSET: usize = 1;
const IV_OFFSET: usize = EPHEMERAL_OFFSET + PUBLIC_KEY_SIZE;
const CIPHERTEXT_OFFSET: usize = IV_OFFSET + IV_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum E2eeError {
    #[error("invalid recipient public key: {0}")]
    InvalidRecipient(#[from] KeyError),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("unable to decrypt message")]
    Undecryptable,
}

impl From<SecretError> for E2eeError {
    fn from(e: SecretError) -> Self {
        E2eeError::Encryption(e.to_string())
    }
}

/// Blob format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlobVersion {
    Legacy = 0x01,
    Hkdf = 0x02,
}

impl BlobVersion {
    /// The version new blobs are written with
    pub const CURRENT: BlobVersion = BlobVersion::Hkdf;

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(BlobVersion::Legacy),
            0x02 => Some(BlobVersion::Hkdf),
            _ => None,
        }
    }

    fn kdf_mode(self) -> KdfMode<'static> {
        match self {
            BlobVersion::Legacy => KdfMode::Direct,
            BlobVersion::Hkdf => KdfMode::Hkdf {
                info: BLOB_HKDF_INFO,
            },
        }
    }
}

/// A blob split into its fixed-layout parts
#[derive(Debug)]
struct ParsedBlob<'a> {
    ephemeral: PublicKey,
    iv: [u8; IV_SIZE],
    ciphertext: &'a [u8],
}

type Opener = fn(&ParsedBlob<'_>, &PrivateKey) -> Result<Vec<u8>, E2eeError>;

/// Decrypt strategies keyed by version byte. Dropping legacy support means
/// removing its row.
const OPENERS: &[(BlobVersion, Opener)] = &[
    (BlobVersion::Legacy, open_legacy),
    (BlobVersion::Hkdf, open_hkdf),
];

fn open_with(
    version: BlobVersion,
    blob: &ParsedBlob<'_>,
    own_private_key: &PrivateKey,
) -> Result<Vec<u8>, E2eeError> {
    let key: DerivedKey<Open> =
        derive_symmetric_key(&blob.ephemeral, own_private_key, version.kdf_mode())
            .map_err(|_: KdfError| E2eeError::Undecryptable)?;
    key.open(&blob.iv, blob.ciphertext)
        .map_err(|_| E2eeError::Undecryptable)
}

fn open_legacy(blob: &ParsedBlob<'_>, own_private_key: &PrivateKey) -> Result<Vec<u8>, E2eeError> {
    open_with(BlobVersion::Legacy, blob, own_private_key)
}

fn open_hkdf(blob: &ParsedBlob<'_>, own_private_key: &PrivateKey) -> Result<Vec<u8>, E2eeError> {
    open_with(BlobVersion::Hkdf, blob, own_private_key)
}

fn parse_blob(bytes: &[u8]) -> Result<(BlobVersion, ParsedBlob<'_>), E2eeError> {
    if bytes.len() < MIN_BLOB_SIZE {
        return Err(E2eeError::Undecryptable);
    }
    let version = BlobVersion::from_byte(bytes[0]).ok_or(E2eeError::Undecryptable)?;
    let ephemeral = PublicKey::try_from(&bytes[EPHEMERAL_OFFSET..IV_OFFSET])
        .map_err(|_| E2eeError::Undecryptable)?;
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&bytes[IV_OFFSET..CIPHERTEXT_OFFSET]);

    Ok((
        version,
        ParsedBlob {
            ephemeral,
            iv,
            ciphertext: &bytes[CIPHERTEXT_OFFSET..],
        },
    ))
}

/// Output of [`encrypt`]
///
/// The ephemeral private key is returned because a sender replying
/// anonymously keeps it to read back their own echoed copy. Callers that
/// don't need it simply drop it.
#[derive(Debug, Clone)]
pub struct EncryptedMessage {
    /// base64 of the versioned blob
    pub ciphertext: String,
    pub ephemeral_public_key: PublicKey,
    pub ephemeral_private_key: PrivateKey,
}

/// Encrypt a message for the holder of `recipient_public_key` (base64 raw point)
pub fn encrypt(plaintext: &str, recipient_public_key: &str) -> Result<EncryptedMessage, E2eeError> {
    let recipient = PublicKey::from_base64(recipient_public_key)?;
    encrypt_to(plaintext.as_bytes(), &recipient)
}

/// Encrypt raw bytes for a parsed recipient key
pub fn encrypt_to(plaintext: &[u8], recipient: &PublicKey) -> Result<EncryptedMessage, E2eeError> {
    seal_blob(BlobVersion::CURRENT, plaintext, recipient)
}

fn seal_blob(
    version: BlobVersion,
    plaintext: &[u8],
    recipient: &PublicKey,
) -> Result<EncryptedMessage, E2eeError> {
    let ephemeral = KeyPair::generate();
    let key: DerivedKey<Seal> =
        derive_symmetric_key(recipient, &ephemeral.private_key, version.kdf_mode())
            .map_err(|e| E2eeError::Encryption(e.to_string()))?;
    let iv = random_iv()?;
    let sealed = key
        .seal(&iv, plaintext)
        .map_err(|e| E2eeError::Encryption(e.to_string()))?;

    let mut blob = Vec::with_capacity(CIPHERTEXT_OFFSET + sealed.len());
    blob.push(version as u8);
    blob.extend_from_slice(&ephemeral.public_key.to_bytes());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&sealed);

    Ok(EncryptedMessage {
        ciphertext: STANDARD.encode(&blob),
        ephemeral_public_key: ephemeral.public_key,
        ephemeral_private_key: ephemeral.private_key,
    })
}

/// Decrypt a base64 blob with the recipient's private key
pub fn decrypt(blob: &str, own_private_key: &PrivateKey) -> Result<String, E2eeError> {
    let plaintext = decrypt_bytes(blob, own_private_key)?;
    String::from_utf8(plaintext).map_err(|_| E2eeError::Undecryptable)
}

pub fn decrypt_bytes(blob: &str, own_private_key: &PrivateKey) -> Result<Vec<u8>, E2eeError> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|_| E2eeError::Undecryptable)?;
    let (version, parsed) = parse_blob(&bytes)?;

    let opener = OPENERS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, opener)| *opener)
        .ok_or(E2eeError::Undecryptable)?;
    opener(&parsed, own_private_key)
}

/// Result of decrypting one message in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    Plaintext(String),
    Unreadable,
}

impl DecryptOutcome {
    /// What to render: the plaintext, or [`DECRYPT_PLACEHOLDER`]
    pub fn display_text(&self) -> &str {
        match self {
            DecryptOutcome::Plaintext(text) => text,
            DecryptOutcome::Unreadable => DECRYPT_PLACEHOLDER,
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(self, DecryptOutcome::Plaintext(_))
    }
}

impl From<Result<String, E2eeError>> for DecryptOutcome {
    fn from(result: Result<String, E2eeError>) -> Self {
        match result {
            Ok(text) => DecryptOutcome::Plaintext(text),
            Err(_) => DecryptOutcome::Unreadable,
        }
    }
}

/// Decrypt a list of historical messages; one bad blob never fails the rest
pub fn decrypt_batch<'a, I>(blobs: I, own_private_key: &PrivateKey) -> Vec<DecryptOutcome>
where
    I: IntoIterator<Item = &'a str>,
{
    let outcomes: Vec<DecryptOutcome> = blobs
        .into_iter()
        .map(|blob| decrypt(blob, own_private_key).into())
        .collect();
    let unreadable = outcomes.iter().filter(|o| !o.is_readable()).count();
    if unreadable > 0 {
        tracing::debug!(
            total = outcomes.len(),
            unreadable,
            "some messages in batch could not be decrypted"
        );
    }
    outcomes
}
