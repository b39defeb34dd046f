//! Delivering the group key to a newly approved participant

use super::distribution::{GroupKeyDistribution, JoinState};
use super::{unwrap_group_key, wrap_group_key, RoomError, WrappedGroupKey};
use crate::crypto::{KeyPair, PublicKey};
use crate::key_store::{record_timestamp, KeyStore, KeyStoreError, RoomKeyData};

#[derive(Debug, thiserror::Error)]
pub enum JoinError<E> {
    #[error("distribution endpoint error: {0}")]
    Distribution(E),
    #[error("room error: {0}")]
    Room(#[from] RoomError),
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("only the room creator can approve participants")]
    NotCreator,
    #[error("join approved without a wrapped group key")]
    MissingWrappedKey,
}

/// Creator side: wrap the group key for one participant and submit it
pub async fn approve_participant<D: GroupKeyDistribution>(
    distribution: &D,
    room: &RoomKeyData,
    participant_id: &str,
    participant_public_key: &PublicKey,
) -> Result<WrappedGroupKey, JoinError<D::Error>> {
    if !room.is_creator {
        return Err(JoinError::NotCreator);
    }

    let wrapped = wrap_group_key(
        &room.group_key,
        &room.key_pair.private_key,
        participant_public_key,
    )?;
    distribution
        .submit_wrapped_key(&room.room_id, participant_id, &wrapped)
        .await
        .map_err(JoinError::Distribution)?;

    tracing::info!(room_id = %room.room_id, participant_id, "approved room participant");
    Ok(wrapped)
}

/// A participant's outstanding join request
#[derive(Debug, Clone)]
pub struct PendingJoin {
    pub room_id: String,
    pub participant_id: String,
    /// generated when the request was made; its public half went to the creator
    pub key_pair: KeyPair,
    /// the creator's room public key, used to unwrap
    pub creator_public_key: PublicKey,
    pub anonymous_id: Option<String>,
    pub watermark_seed: Option<String>,
}

impl PendingJoin {
    pub fn new(
        room_id: impl Into<String>,
        participant_id: impl Into<String>,
        creator_public_key: PublicKey,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            participant_id: participant_id.into(),
            key_pair: KeyPair::generate(),
            creator_public_key,
            anonymous_id: None,
            watermark_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinProgress {
    Pending,
    Rejected,
    /// the group key was unwrapped and saved to the session store
    Joined(RoomKeyData),
}

/// Participant side: check the join status once
///
/// On approval the wrapped key is unwrapped and the resulting room key is
/// saved as a participant key, which keeps it session-scoped.
pub async fn poll_join<D: GroupKeyDistribution>(
    distribution: &D,
    key_store: &KeyStore,
    pending: &PendingJoin,
) -> Result<JoinProgress, JoinError<D::Error>> {
    let status = distribution
        .join_status(&pending.room_id, &pending.participant_id)
        .await
        .map_err(JoinError::Distribution)?;

    match status.status {
        JoinState::Pending => Ok(JoinProgress::Pending),
        JoinState::Rejected => Ok(JoinProgress::Rejected),
        JoinState::Approved => {
            let wrapped = status
                .wrapped_group_key
                .ok_or(JoinError::MissingWrappedKey)?;
            let group_key = unwrap_group_key(
                &wrapped,
                &pending.key_pair.private_key,
                &pending.creator_public_key,
            )?;

            let data = RoomKeyData {
                room_id: pending.room_id.clone(),
                group_key,
                key_pair: pending.key_pair.clone(),
                anonymous_id: pending.anonymous_id.clone(),
                watermark_seed: pending.watermark_seed.clone(),
                is_creator: false,
                created_at: record_timestamp(),
            };
            key_store.save_room_key(&data).await?;
            tracing::info!(room_id = %pending.room_id, "joined room");
            Ok(JoinProgress::Joined(data))
        }
    }
}
