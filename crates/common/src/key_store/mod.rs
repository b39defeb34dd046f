//! Key-store orchestration
//!
//! Decides how each category of key is kept:
//!
//! | category               | location      | vault                          |
//! |------------------------|---------------|--------------------------------|
//! | link private key       | durable       | sealed if unlocked, else plain |
//! | room key (creator)     | durable       | always sealed, save fails when locked |
//! | room key (participant) | session only  | never persisted durably        |
//! | owner reply cache      | durable       | plain                          |
//! | broadcast channel key  | durable       | sealed if unlocked, else plain |
//!
//! Readers never fail because the vault is locked: an entry that cannot be
//! opened right now is reported as absent. The one exception is
//! [`KeyStore::require_room_key`], for callers that need the creator key.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::storage::{
    is_vault_wrapped, KvStore, SessionStore, StorageError, StoreName, StoredValue,
};
use crate::vault::{Vault, VaultError};

mod records;

pub use records::{
    record_timestamp, BroadcastKeyRecord, KeyExport, LinkKeyRecord, ReplyCacheEntry,
    RoomKeyData, ROOM_KEY_TTL_HOURS,
};

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("corrupt key entry {0}: {1}")]
    Corrupt(String, String),
}

/// Coarse classification of a [`KeyStoreError`] for UI decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreErrorKind {
    VaultLocked,
    IncorrectPassphrase,
    NotFound,
    Corrupt,
    Storage,
    Other,
}

impl KeyStoreError {
    pub fn kind(&self) -> KeyStoreErrorKind {
        match self {
            KeyStoreError::Vault(VaultError::VaultLocked) => KeyStoreErrorKind::VaultLocked,
            KeyStoreError::Vault(VaultError::IncorrectPassphrase) => {
                KeyStoreErrorKind::IncorrectPassphrase
            }
            KeyStoreError::Vault(VaultError::Corrupt(_)) => KeyStoreErrorKind::Corrupt,
            KeyStoreError::Vault(VaultError::Storage(_)) => KeyStoreErrorKind::Storage,
            KeyStoreError::Vault(_) => KeyStoreErrorKind::Other,
            KeyStoreError::Storage(_) => KeyStoreErrorKind::Storage,
            KeyStoreError::Serde(_) | KeyStoreError::Corrupt(..) => KeyStoreErrorKind::Corrupt,
            KeyStoreError::NotFound(_) => KeyStoreErrorKind::NotFound,
        }
    }
}

/// What reading a durable entry produced
enum Entry<T> {
    Readable(T),
    /// sealed under the vault, which is locked
    Locked,
    Corrupt(String),
}

fn session_room_key(room_id: &str) -> String {
    format!("room-key:{}", room_id)
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    kv: Arc<dyn KvStore>,
    session: Arc<dyn SessionStore>,
    vault: Vault,
}

impl KeyStore {
    /// `vault` must be backed by the same stores
    pub fn new(kv: Arc<dyn KvStore>, session: Arc<dyn SessionStore>, vault: Vault) -> Self {
        Self { kv, session, vault }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    // link keys

    pub async fn save_link_key(&self, record: &LinkKeyRecord) -> Result<(), KeyStoreError> {
        let value = self.seal_if_unlocked(record)?;
        self.kv.put(StoreName::LinkKeys, &record.link_id, value).await?;
        tracing::debug!(link_id = %record.link_id, "saved link key");
        Ok(())
    }

    pub async fn get_link_key(&self, link_id: &str) -> Result<Option<LinkKeyRecord>, KeyStoreError> {
        self.read_optional(StoreName::LinkKeys, link_id).await
    }

    pub async fn delete_link_key(&self, link_id: &str) -> Result<(), KeyStoreError> {
        self.kv.delete(StoreName::LinkKeys, link_id).await?;
        Ok(())
    }

    // room keys

    /// Persist a room key according to the member's role
    ///
    /// # Errors
    ///
    /// A creator key saved while the vault is locked fails with
    /// [`VaultError::VaultLocked`] and nothing is written.
    pub async fn save_room_key(&self, data: &RoomKeyData) -> Result<(), KeyStoreError> {
        if data.is_creator {
            let envelope = self.vault.encrypt_value(data)?;
            self.kv
                .put(
                    StoreName::RoomKeys,
                    &data.room_id,
                    serde_json::to_value(&envelope)?,
                )
                .await?;
        } else {
            self.session
                .set(&session_room_key(&data.room_id), serde_json::to_string(data)?)
                .await?;
        }
        tracing::debug!(room_id = %data.room_id, is_creator = data.is_creator, "saved room key");
        Ok(())
    }

    /// Session entry first, then the durable one. `None` when neither is
    /// readable right now.
    pub async fn get_room_key(&self, room_id: &str) -> Result<Option<RoomKeyData>, KeyStoreError> {
        if let Some(data) = self.session_room_key(room_id).await? {
            return Ok(Some(data));
        }
        self.read_optional(StoreName::RoomKeys, room_id).await
    }

    /// Like [`KeyStore::get_room_key`] but a locked vault is an error
    pub async fn require_room_key(&self, room_id: &str) -> Result<RoomKeyData, KeyStoreError> {
        if let Some(data) = self.session_room_key(room_id).await? {
            return Ok(data);
        }
        match self.read_entry(StoreName::RoomKeys, room_id).await? {
            Some(Entry::Readable(data)) => Ok(data),
            Some(Entry::Locked) => Err(VaultError::VaultLocked.into()),
            Some(Entry::Corrupt(reason)) => Err(KeyStoreError::Corrupt(room_id.to_string(), reason)),
            None => Err(KeyStoreError::NotFound(room_id.to_string())),
        }
    }

    /// Forget a room entirely, in both stores
    pub async fn delete_room_key(&self, room_id: &str) -> Result<(), KeyStoreError> {
        self.kv.delete(StoreName::RoomKeys, room_id).await?;
        self.session.remove(&session_room_key(room_id)).await?;
        tracing::debug!(room_id, "deleted room key");
        Ok(())
    }

    async fn session_room_key(&self, room_id: &str) -> Result<Option<RoomKeyData>, KeyStoreError> {
        let Some(raw) = self.session.get(&session_room_key(room_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                tracing::warn!(room_id, error = %e, "ignoring unreadable session room key");
                Ok(None)
            }
        }
    }

    // reply cache

    pub async fn cache_reply(&self, thread_id: &str, plaintext: &str) -> Result<(), KeyStoreError> {
        let entry = ReplyCacheEntry {
            thread_id: thread_id.to_string(),
            plaintext: plaintext.to_string(),
            cached_at: record_timestamp(),
        };
        self.kv
            .put(StoreName::ReplyCache, thread_id, serde_json::to_value(&entry)?)
            .await?;
        Ok(())
    }

    pub async fn get_cached_reply(&self, thread_id: &str) -> Result<Option<String>, KeyStoreError> {
        let entry: Option<ReplyCacheEntry> =
            self.read_optional(StoreName::ReplyCache, thread_id).await?;
        Ok(entry.map(|e| e.plaintext))
    }

    pub async fn delete_cached_reply(&self, thread_id: &str) -> Result<(), KeyStoreError> {
        self.kv.delete(StoreName::ReplyCache, thread_id).await?;
        Ok(())
    }

    // broadcast keys

    pub async fn save_broadcast_key(&self, record: &BroadcastKeyRecord) -> Result<(), KeyStoreError> {
        let value = self.seal_if_unlocked(record)?;
        self.kv
            .put(StoreName::BroadcastKeys, &record.channel_id, value)
            .await?;
        tracing::debug!(channel_id = %record.channel_id, "saved broadcast key");
        Ok(())
    }

    pub async fn get_broadcast_key(
        &self,
        channel_id: &str,
    ) -> Result<Option<BroadcastKeyRecord>, KeyStoreError> {
        self.read_optional(StoreName::BroadcastKeys, channel_id).await
    }

    // maintenance

    /// Seal every plaintext key entry under the vault
    ///
    /// Safe to re-run after an interrupted pass: entries that are already
    /// sealed are skipped. Returns how many entries were sealed.
    pub async fn migrate_keys_to_vault(&self) -> Result<usize, KeyStoreError> {
        if !self.vault.is_unlocked() {
            return Err(VaultError::VaultLocked.into());
        }

        let mut migrated = 0;
        for store in StoreName::KEY_STORES {
            for (key, value) in self.kv.scan(store).await? {
                if is_vault_wrapped(&value) {
                    continue;
                }
                let envelope = self.vault.encrypt_value(&value)?;
                self.kv
                    .put(store, &key, serde_json::to_value(&envelope)?)
                    .await?;
                migrated += 1;
            }
        }

        if migrated > 0 {
            tracing::info!(migrated, "migrated cleartext keys into the vault");
        }
        Ok(migrated)
    }

    /// Whether any key entry is still stored in plaintext
    pub async fn has_cleartext_keys(&self) -> Result<bool, KeyStoreError> {
        for store in StoreName::KEY_STORES {
            if self
                .kv
                .scan(store)
                .await?
                .iter()
                .any(|(_, value)| !is_vault_wrapped(value))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete durable room keys older than [`ROOM_KEY_TTL_HOURS`]
    ///
    /// Entries that can't be opened because the vault is locked are kept.
    /// Entries that can't be opened for any other reason are corrupt and are
    /// deleted. Returns how many entries were deleted.
    pub async fn cleanup_expired_room_keys(&self) -> Result<usize, KeyStoreError> {
        let now = Utc::now();
        let mut removed = 0;

        for (room_id, value) in self.kv.scan(StoreName::RoomKeys).await? {
            let delete = match self.open_value::<RoomKeyData>(value) {
                Entry::Readable(data) => data.is_expired(now),
                Entry::Locked => false,
                Entry::Corrupt(reason) => {
                    tracing::warn!(room_id = %room_id, %reason, "deleting corrupt room key");
                    true
                }
            };
            if delete {
                self.kv.delete(StoreName::RoomKeys, &room_id).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "removed expired room keys");
        }
        Ok(removed)
    }

    /// Every durable key readable right now, plus the ids of those sealed
    /// under a locked vault
    pub async fn export_keys(&self) -> Result<KeyExport, KeyStoreError> {
        let (link_keys, locked_link_keys) = self.read_all(StoreName::LinkKeys).await?;
        let (room_keys, locked_room_keys) = self.read_all(StoreName::RoomKeys).await?;
        let (broadcast_keys, locked_broadcast_keys) =
            self.read_all(StoreName::BroadcastKeys).await?;
        Ok(KeyExport {
            link_keys,
            room_keys,
            broadcast_keys,
            locked_link_keys,
            locked_room_keys,
            locked_broadcast_keys,
        })
    }

    // helpers

    fn seal_if_unlocked<T: Serialize>(&self, record: &T) -> Result<Value, KeyStoreError> {
        match self.vault.encrypt_value(record) {
            Ok(envelope) => Ok(serde_json::to_value(&envelope)?),
            Err(VaultError::VaultLocked) => Ok(serde_json::to_value(record)?),
            Err(e) => Err(e.into()),
        }
    }

    fn open_value<T: Serialize + DeserializeOwned>(&self, value: Value) -> Entry<T> {
        match StoredValue::<T>::from_value(value) {
            Ok(StoredValue::Plain(record)) => Entry::Readable(record),
            Ok(StoredValue::VaultWrapped(envelope)) => match self.vault.decrypt_value(&envelope) {
                Ok(record) => Entry::Readable(record),
                Err(VaultError::VaultLocked) => Entry::Locked,
                Err(e) => Entry::Corrupt(e.to_string()),
            },
            Err(e) => Entry::Corrupt(e.to_string()),
        }
    }

    async fn read_entry<T: Serialize + DeserializeOwned>(
        &self,
        store: StoreName,
        key: &str,
    ) -> Result<Option<Entry<T>>, KeyStoreError> {
        Ok(self
            .kv
            .get(store, key)
            .await?
            .map(|value| self.open_value(value)))
    }

    async fn read_optional<T: Serialize + DeserializeOwned>(
        &self,
        store: StoreName,
        key: &str,
    ) -> Result<Option<T>, KeyStoreError> {
        match self.read_entry(store, key).await? {
            Some(Entry::Readable(record)) => Ok(Some(record)),
            Some(Entry::Locked) => {
                tracing::debug!(%store, key, "entry unavailable while the vault is locked");
                Ok(None)
            }
            Some(Entry::Corrupt(reason)) => {
                tracing::warn!(%store, key, %reason, "unreadable key entry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Readable records and the keys of locked ones; corrupt entries are skipped
    async fn read_all<T: Serialize + DeserializeOwned>(
        &self,
        store: StoreName,
    ) -> Result<(Vec<T>, Vec<String>), KeyStoreError> {
        let mut records = Vec::new();
        let mut locked = Vec::new();
        for (key, value) in self.kv.scan(store).await? {
            match self.open_value(value) {
                Entry::Readable(record) => records.push(record),
                Entry::Locked => locked.push(key),
                Entry::Corrupt(reason) => {
                    tracing::warn!(%store, key = %key, %reason, "skipping unreadable key entry")
                }
            }
        }
        Ok((records, locked))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{generate_key_pair, Pbkdf2Params, Secret};
    use crate::room::generate_group_key;
    use crate::storage::{MemoryKvStore, MemorySessionStore, VaultEnvelope};
    use crate::vault::UnlockPolicy;

    struct Harness {
        kv: MemoryKvStore,
        session: MemorySessionStore,
        store: KeyStore,
    }

    fn harness() -> Harness {
        let kv = MemoryKvStore::new();
        let session = MemorySessionStore::new();
        let vault = Vault::with_config(
            Arc::new(kv.clone()),
            Arc::new(session.clone()),
            Pbkdf2Params::fast(),
            UnlockPolicy::default(),
        );
        let store = KeyStore::new(Arc::new(kv.clone()), Arc::new(session.clone()), vault);
        Harness { kv, session, store }
    }

    fn room(room_id: &str, is_creator: bool) -> RoomKeyData {
        RoomKeyData {
            room_id: room_id.to_string(),
            group_key: generate_group_key().unwrap(),
            key_pair: generate_key_pair(),
            anonymous_id: Some("anon-1".to_string()),
            watermark_seed: None,
            is_creator,
            created_at: record_timestamp(),
        }
    }

    async fn raw(kv: &MemoryKvStore, store: StoreName, key: &str) -> Value {
        kv.get(store, key).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_link_key_plain_then_sealed() {
        let h = harness();
        let plain = LinkKeyRecord::new("link-1", generate_key_pair());
        h.store.save_link_key(&plain).await.unwrap();
        assert!(!is_vault_wrapped(&raw(&h.kv, StoreName::LinkKeys, "link-1").await));

        h.store.vault().setup("pass").await.unwrap();
        let sealed = LinkKeyRecord::new("link-2", generate_key_pair());
        h.store.save_link_key(&sealed).await.unwrap();
        assert!(is_vault_wrapped(&raw(&h.kv, StoreName::LinkKeys, "link-2").await));

        assert_eq!(h.store.get_link_key("link-1").await.unwrap(), Some(plain));
        assert_eq!(h.store.get_link_key("link-2").await.unwrap(), Some(sealed));
        assert_eq!(h.store.get_link_key("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_locked_read_is_absent_not_error() {
        let h = harness();
        h.store.vault().setup("pass").await.unwrap();
        let record = LinkKeyRecord::new("link", generate_key_pair());
        h.store.save_link_key(&record).await.unwrap();

        h.store.vault().lock().await.unwrap();
        assert_eq!(h.store.get_link_key("link").await.unwrap(), None);

        h.store.vault().unlock("pass").await.unwrap();
        assert_eq!(h.store.get_link_key("link").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_creator_room_key_requires_vault() {
        let h = harness();
        let data = room("room-1", true);

        let err = h.store.save_room_key(&data).await.unwrap_err();
        assert_eq!(err.kind(), KeyStoreErrorKind::VaultLocked);
        assert!(h.kv.scan(StoreName::RoomKeys).await.unwrap().is_empty());

        h.store.vault().setup("pass").await.unwrap();
        h.store.save_room_key(&data).await.unwrap();
        assert!(is_vault_wrapped(&raw(&h.kv, StoreName::RoomKeys, "room-1").await));
        assert_eq!(h.store.get_room_key("room-1").await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_participant_room_key_is_session_only() {
        let h = harness();
        let data = room("room-2", false);
        h.store.save_room_key(&data).await.unwrap();

        assert!(h.kv.scan(StoreName::RoomKeys).await.unwrap().is_empty());
        assert_eq!(h.store.get_room_key("room-2").await.unwrap(), Some(data));

        h.session.clear().unwrap();
        assert_eq!(h.store.get_room_key("room-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_require_room_key() {
        let h = harness();
        assert_eq!(
            h.store.require_room_key("nope").await.unwrap_err().kind(),
            KeyStoreErrorKind::NotFound
        );

        h.store.vault().setup("pass").await.unwrap();
        h.store.save_room_key(&room("room-3", true)).await.unwrap();
        h.store.vault().lock().await.unwrap();

        assert_eq!(h.store.get_room_key("room-3").await.unwrap(), None);
        assert_eq!(
            h.store.require_room_key("room-3").await.unwrap_err().kind(),
            KeyStoreErrorKind::VaultLocked
        );
    }

    #[tokio::test]
    async fn test_delete_room_key_clears_both_stores() {
        let h = harness();
        h.store.vault().setup("pass").await.unwrap();
        h.store.save_room_key(&room("shared", true)).await.unwrap();
        h.store.save_room_key(&room("shared", false)).await.unwrap();

        h.store.delete_room_key("shared").await.unwrap();
        assert_eq!(h.store.get_room_key("shared").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let h = harness();
        h.store
            .save_link_key(&LinkKeyRecord::new("a", generate_key_pair()))
            .await
            .unwrap();
        h.store
            .save_link_key(&LinkKeyRecord::new("b", generate_key_pair()))
            .await
            .unwrap();
        h.store
            .save_broadcast_key(&BroadcastKeyRecord::new("chan", Secret::generate().unwrap()))
            .await
            .unwrap();
        h.store.cache_reply("thread", "hello").await.unwrap();

        assert!(h.store.has_cleartext_keys().await.unwrap());
        assert_eq!(
            h.store.migrate_keys_to_vault().await.unwrap_err().kind(),
            KeyStoreErrorKind::VaultLocked
        );

        h.store.vault().setup("pass").await.unwrap();
        assert_eq!(h.store.migrate_keys_to_vault().await.unwrap(), 3);
        assert_eq!(h.store.migrate_keys_to_vault().await.unwrap(), 0);
        assert!(!h.store.has_cleartext_keys().await.unwrap());

        // the reply cache is not key material and stays plain
        assert!(!is_vault_wrapped(&raw(&h.kv, StoreName::ReplyCache, "thread").await));
        assert!(h.store.get_link_key("a").await.unwrap().is_some());
        assert!(h.store.get_broadcast_key("chan").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired_room_keys() {
        let h = harness();
        h.store.vault().setup("pass").await.unwrap();

        let aged = |room_id: &str, age: chrono::Duration| {
            let mut data = room(room_id, true);
            data.created_at = Utc::now() - age;
            data
        };
        h.store
            .save_room_key(&aged("stale", chrono::Duration::hours(25)))
            .await
            .unwrap();
        h.store
            .save_room_key(&aged(
                "just-expired",
                chrono::Duration::hours(24) + chrono::Duration::seconds(1),
            ))
            .await
            .unwrap();
        h.store
            .save_room_key(&aged("day-old", chrono::Duration::hours(23)))
            .await
            .unwrap();
        h.store.save_room_key(&room("fresh", true)).await.unwrap();

        assert_eq!(h.store.cleanup_expired_room_keys().await.unwrap(), 2);
        assert!(h.store.get_room_key("stale").await.unwrap().is_none());
        assert!(h.store.get_room_key("just-expired").await.unwrap().is_none());
        assert!(h.store.get_room_key("day-old").await.unwrap().is_some());
        assert!(h.store.get_room_key("fresh").await.unwrap().is_some());
    }

    #[test]
    fn test_room_key_expiry_boundary() {
        let now = Utc::now();
        let mut data = room("r", true);

        data.created_at = now - chrono::Duration::hours(23);
        assert!(!data.is_expired(now));
        data.created_at = now - chrono::Duration::hours(ROOM_KEY_TTL_HOURS);
        assert!(!data.is_expired(now));
        data.created_at =
            now - chrono::Duration::hours(ROOM_KEY_TTL_HOURS) - chrono::Duration::seconds(1);
        assert!(data.is_expired(now));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_locked_and_drops_corrupt() {
        let h = harness();
        h.store.vault().setup("pass").await.unwrap();

        let mut stale = room("stale", true);
        stale.created_at = Utc::now() - chrono::Duration::hours(48);
        h.store.save_room_key(&stale).await.unwrap();

        let garbage = VaultEnvelope::new("AAAA".to_string(), "AAAAAAAAAAAAAAAA".to_string());
        h.kv
            .put(
                StoreName::RoomKeys,
                "corrupt",
                serde_json::to_value(&garbage).unwrap(),
            )
            .await
            .unwrap();

        h.store.vault().lock().await.unwrap();
        assert_eq!(h.store.cleanup_expired_room_keys().await.unwrap(), 0);
        assert_eq!(h.kv.scan(StoreName::RoomKeys).await.unwrap().len(), 2);

        h.store.vault().unlock("pass").await.unwrap();
        assert_eq!(h.store.cleanup_expired_room_keys().await.unwrap(), 2);
        assert!(h.kv.scan(StoreName::RoomKeys).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_cache() {
        let h = harness();
        assert_eq!(h.store.get_cached_reply("t").await.unwrap(), None);
        h.store.cache_reply("t", "sent reply").await.unwrap();
        assert_eq!(
            h.store.get_cached_reply("t").await.unwrap().as_deref(),
            Some("sent reply")
        );
        h.store.delete_cached_reply("t").await.unwrap();
        assert_eq!(h.store.get_cached_reply("t").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_export_skips_locked_entries() {
        let h = harness();
        h.store
            .save_link_key(&LinkKeyRecord::new("plain", generate_key_pair()))
            .await
            .unwrap();
        h.store.vault().setup("pass").await.unwrap();
        h.store
            .save_link_key(&LinkKeyRecord::new("sealed", generate_key_pair()))
            .await
            .unwrap();
        h.store.save_room_key(&room("r", true)).await.unwrap();

        let export = h.store.export_keys().await.unwrap();
        assert_eq!(export.link_keys.len(), 2);
        assert_eq!(export.room_keys.len(), 1);

        assert!(export.locked_link_keys.is_empty());

        h.store.vault().lock().await.unwrap();
        let export = h.store.export_keys().await.unwrap();
        assert_eq!(export.link_keys.len(), 1);
        assert_eq!(export.link_keys[0].link_id, "plain");
        assert!(export.room_keys.is_empty());
        assert_eq!(export.locked_link_keys, vec!["sealed"]);
        assert_eq!(export.locked_room_keys, vec!["r"]);
    }
}
