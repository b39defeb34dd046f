use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyPair, Secret};
use crate::room::GroupKey;

/// How long a durable room key is kept
pub const ROOM_KEY_TTL_HOURS: i64 = 24;

/// Current time at the millisecond precision records are stored with
pub fn record_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A link owner's key pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkKeyRecord {
    pub link_id: String,
    pub key_pair: KeyPair,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl LinkKeyRecord {
    pub fn new(link_id: impl Into<String>, key_pair: KeyPair) -> Self {
        Self {
            link_id: link_id.into(),
            key_pair,
            created_at: record_timestamp(),
        }
    }
}

/// Everything a member needs to take part in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomKeyData {
    pub room_id: String,
    pub group_key: GroupKey,
    /// The member's room key pair. The creator's is used to wrap the group
    /// key for others.
    pub key_pair: KeyPair,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_seed: Option<String>,
    pub is_creator: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl RoomKeyData {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::hours(ROOM_KEY_TTL_HOURS)
    }
}

/// Plaintext of a reply the owner sent, kept so it can be shown again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyCacheEntry {
    pub thread_id: String,
    pub plaintext: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastKeyRecord {
    pub channel_id: String,
    pub key: Secret,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl BroadcastKeyRecord {
    pub fn new(channel_id: impl Into<String>, key: Secret) -> Self {
        Self {
            channel_id: channel_id.into(),
            key,
            created_at: record_timestamp(),
        }
    }
}

/// Every key readable right now, for backup or display
///
/// The `locked_*` lists name the entries that exist but are sealed under the
/// vault while it is locked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExport {
    pub link_keys: Vec<LinkKeyRecord>,
    pub room_keys: Vec<RoomKeyData>,
    pub broadcast_keys: Vec<BroadcastKeyRecord>,
    #[serde(default)]
    pub locked_link_keys: Vec<String>,
    #[serde(default)]
    pub locked_room_keys: Vec<String>,
    #[serde(default)]
    pub locked_broadcast_keys: Vec<String>,
}
