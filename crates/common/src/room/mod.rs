//! Group encryption for multi-party rooms
//!
//! A room has exactly one [`GroupKey`], generated by its creator. The key
//! never travels in the clear: the creator wraps it once per approved
//! participant using ECDH between the creator's room key pair and the
//! participant's key pair, followed by HKDF. After that every message is a
//! plain AES-256-GCM seal under the shared key with a fresh random nonce.

mod distribution;
mod join;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::crypto::{
    derive_symmetric_key, random_iv, DerivedKey, KdfError, KdfMode, KeyPair, Open, PrivateKey,
    PublicKey, Seal, Sealed, Secret, SecretError, IV_SIZE, SECRET_SIZE, TAG_SIZE,
};
use crate::e2ee::DecryptOutcome;

pub use distribution::{
    GroupKeyDistribution, JoinState, JoinStatus, MemoryDistribution, MemoryDistributionError,
};
pub use join::{approve_participant, poll_join, JoinError, JoinProgress, PendingJoin};

/// Domain separation for the HKDF step when wrapping a group key
pub const ROOM_WRAP_INFO: &[u8] = b"burnware-room-key-wrap-v1";

/// The raw 256-bit AES key shared by every member of a room
pub type GroupKey = Secret;

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("kdf error: {0}")]
    Kdf(#[from] KdfError),
    #[error("malformed wrapped group key")]
    MalformedWrappedKey,
    #[error("unable to unwrap group key")]
    Unwrap,
    #[error("unable to decrypt group message")]
    Undecryptable,
}

/// Generate a room's group key. Called once, by the creator.
pub fn generate_group_key() -> Result<GroupKey, RoomError> {
    Ok(Secret::generate()?)
}

/// Generate a participant (or creator room) key pair
pub fn generate_ecdh_key_pair() -> KeyPair {
    KeyPair::generate()
}

/// A group key sealed for exactly one recipient
///
/// Serialized as base64 of `iv || ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedGroupKey(String);

impl WrappedGroupKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WrappedGroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap `group_key` so only the holder of `recipient_public_key` can read it
pub fn wrap_group_key(
    group_key: &GroupKey,
    sender_private_key: &PrivateKey,
    recipient_public_key: &PublicKey,
) -> Result<WrappedGroupKey, RoomError> {
    let key: DerivedKey<Seal> = derive_symmetric_key(
        recipient_public_key,
        sender_private_key,
        KdfMode::Hkdf {
            info: ROOM_WRAP_INFO,
        },
    )?;
    let iv = random_iv()?;
    let ciphertext = key.seal(&iv, group_key.bytes())?;

    let mut blob = Vec::with_capacity(IV_SIZE + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(WrappedGroupKey(STANDARD.encode(blob)))
}

/// Recover the group key from a wrapped delivery
pub fn unwrap_group_key(
    wrapped: &WrappedGroupKey,
    recipient_private_key: &PrivateKey,
    sender_public_key: &PublicKey,
) -> Result<GroupKey, RoomError> {
    let blob = STANDARD
        .decode(wrapped.as_str())
        .map_err(|_| RoomError::MalformedWrappedKey)?;
    if blob.len() != IV_SIZE + SECRET_SIZE + TAG_SIZE {
        return Err(RoomError::MalformedWrappedKey);
    }
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&blob[..IV_SIZE]);

    let key: DerivedKey<Open> = derive_symmetric_key(
        sender_public_key,
        recipient_private_key,
        KdfMode::Hkdf {
            info: ROOM_WRAP_INFO,
        },
    )?;
    let raw = zeroize::Zeroizing::new(
        key.open(&iv, &blob[IV_SIZE..])
            .map_err(|_| RoomError::Unwrap)?,
    );
    Ok(Secret::from_slice(&raw)?)
}

/// A message sealed under a room's group key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    /// base64 ciphertext including the GCM tag
    pub ciphertext: String,
    /// base64 of the 12-byte nonce
    pub nonce: String,
}

pub fn encrypt_group_message(plaintext: &str, group_key: &GroupKey) -> Result<GroupMessage, RoomError> {
    let sealed = group_key.seal(plaintext.as_bytes())?;
    Ok(GroupMessage {
        ciphertext: sealed.ciphertext_base64(),
        nonce: sealed.iv_base64(),
    })
}

pub fn decrypt_group_message(
    ciphertext: &str,
    nonce: &str,
    group_key: &GroupKey,
) -> Result<String, RoomError> {
    let sealed = Sealed::from_base64(ciphertext, nonce).map_err(|_| RoomError::Undecryptable)?;
    let plaintext = group_key
        .open(&sealed)
        .map_err(|_| RoomError::Undecryptable)?;
    String::from_utf8(plaintext).map_err(|_| RoomError::Undecryptable)
}

/// Decrypt a room's message history, isolating failures per message
pub fn decrypt_group_messages<'a, I>(messages: I, group_key: &GroupKey) -> Vec<DecryptOutcome>
where
    I: IntoIterator<Item = &'a GroupMessage>,
{
    messages
        .into_iter()
        .map(|message| {
            match decrypt_group_message(&message.ciphertext, &message.nonce, group_key) {
                Ok(text) => DecryptOutcome::Plaintext(text),
                Err(_) => DecryptOutcome::Unreadable,
            }
        })
        .collect()
}
