//! Key backup and recovery
//!
//! Backup wraps a private key under a recovery passphrase and stores the
//! result in a remote per-key slot. Link keys use the link id as the slot,
//! a creator's room key pair uses [`room_backup_id`]. Recovery fetches the
//! slot, unwraps it and saves the key through the key store. This is independent of the
//! local vault: backup protects against losing the device, the vault
//! protects what is on it. The two may or may not share a passphrase.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{
    wrap_private_key_with, KeyPair, PassphraseError, Pbkdf2Params, PrivateKey, PublicKey,
    WrappedPrivateKey,
};
use crate::key_store::{record_timestamp, KeyStore, KeyStoreError, LinkKeyRecord, RoomKeyData};
use crate::room::{unwrap_group_key, RoomError, WrappedGroupKey};
use crate::vault::VaultStatus;

/// What the backup endpoint stores per key: `{wrappedKey, salt, iv}`
pub type BackupRecord = WrappedPrivateKey;

/// Reason recorded for keys a batch could not read
pub const VAULT_LOCKED_REASON: &str = "vault locked";

/// Remote slot holding the creator key pair of `room_id`
pub fn room_backup_id(room_id: &str) -> String {
    format!("room:{}", room_id)
}

/// Remote per-key backup slots
#[async_trait]
pub trait BackupRemote: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// Store or overwrite the record for `key_id`
    async fn put_backup(&self, key_id: &str, record: &BackupRecord) -> Result<(), Self::Error>;

    /// `None` when no backup exists for `key_id`
    async fn get_backup(&self, key_id: &str) -> Result<Option<BackupRecord>, Self::Error>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackupRemote {
    inner: Arc<RwLock<HashMap<String, BackupRecord>>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryBackupRemoteError {
    #[error("memory backup remote error: {0}")]
    Internal(String),
}

impl MemoryBackupRemote {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackupRemote for MemoryBackupRemote {
    type Error = MemoryBackupRemoteError;

    async fn put_backup(&self, key_id: &str, record: &BackupRecord) -> Result<(), Self::Error> {
        let mut inner = self.inner.write().map_err(|e| {
            MemoryBackupRemoteError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        inner.insert(key_id.to_string(), record.clone());
        Ok(())
    }

    async fn get_backup(&self, key_id: &str) -> Result<Option<BackupRecord>, Self::Error> {
        let inner = self.inner.read().map_err(|e| {
            MemoryBackupRemoteError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        Ok(inner.get(key_id).cloned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError<E> {
    #[error("backup remote error: {0}")]
    Remote(E),
    #[error("incorrect passphrase")]
    IncorrectPassphrase,
    #[error("passphrase error: {0}")]
    Passphrase(PassphraseError),
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("no local key {0} to back up")]
    NotFound(String),
    #[error("room {0} was not created on this device")]
    NotCreator(String),
    #[error("room error: {0}")]
    Room(#[from] RoomError),
    #[error("backup task failed: {0}")]
    Task(String),
}

impl<E> From<PassphraseError> for BackupError<E> {
    fn from(e: PassphraseError) -> Self {
        match e {
            PassphraseError::IncorrectPassphrase => BackupError::IncorrectPassphrase,
            other => BackupError::Passphrase(other),
        }
    }
}

/// Per-item result of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// id and reason for each item that failed
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome<T = LinkKeyRecord> {
    Recovered(T),
    /// no backup exists for this key; not an error
    NoBackup,
}

/// Backup and recovery of link and creator room keys against a
/// [`BackupRemote`]
#[derive(Debug, Clone)]
pub struct KeyBackup<R: BackupRemote> {
    remote: R,
    key_store: KeyStore,
    params: Pbkdf2Params,
}

impl<R: BackupRemote> KeyBackup<R> {
    pub fn new(remote: R, key_store: KeyStore) -> Self {
        Self::with_params(remote, key_store, Pbkdf2Params::default())
    }

    pub fn with_params(remote: R, key_store: KeyStore, params: Pbkdf2Params) -> Self {
        Self {
            remote,
            key_store,
            params,
        }
    }

    /// Wrap and upload one local link key, overwriting any previous backup
    pub async fn backup_link_key(
        &self,
        link_id: &str,
        passphrase: &str,
    ) -> Result<(), BackupError<R::Error>> {
        let record = self
            .key_store
            .get_link_key(link_id)
            .await?
            .ok_or_else(|| BackupError::NotFound(link_id.to_string()))?;
        self.upload(link_id, &record.key_pair.private_key, passphrase)
            .await
    }

    /// Wrap and upload the key pair of a room created on this device
    ///
    /// # Errors
    ///
    /// - [`BackupError::NotCreator`] for a room this device only joined
    /// - [`BackupError::KeyStore`] when the room key is missing or the vault
    ///   is locked
    pub async fn backup_room_key(
        &self,
        room_id: &str,
        passphrase: &str,
    ) -> Result<(), BackupError<R::Error>> {
        let data = self.key_store.require_room_key(room_id).await?;
        if !data.is_creator {
            return Err(BackupError::NotCreator(room_id.to_string()));
        }
        self.upload(&room_backup_id(room_id), &data.key_pair.private_key, passphrase)
            .await
    }

    /// Back up every link key in the store
    ///
    /// Failures are recorded per key; one bad key never stops the rest.
    /// Keys sealed under a locked vault are listed as failed.
    pub async fn backup_link_keys(
        &self,
        passphrase: &str,
    ) -> Result<BatchReport, BackupError<R::Error>> {
        let export = self.key_store.export_keys().await?;
        let mut report = BatchReport::default();
        self.backup_links_into(&mut report, &export.link_keys, &export.locked_link_keys, passphrase)
            .await;
        log_report(&report, "link key backup finished");
        Ok(report)
    }

    /// Back up the key pair of every room created on this device
    ///
    /// Succeeded and failed entries are reported by room id.
    pub async fn backup_room_keys(
        &self,
        passphrase: &str,
    ) -> Result<BatchReport, BackupError<R::Error>> {
        let export = self.key_store.export_keys().await?;
        let mut report = BatchReport::default();
        self.backup_rooms_into(&mut report, &export.room_keys, &export.locked_room_keys, passphrase)
            .await;
        log_report(&report, "room key backup finished");
        Ok(report)
    }

    /// Link keys and creator room keys in one pass
    ///
    /// Link keys are reported by link id, room keys by [`room_backup_id`].
    pub async fn backup_all_keys(
        &self,
        passphrase: &str,
    ) -> Result<BatchReport, BackupError<R::Error>> {
        let export = self.key_store.export_keys().await?;
        let mut report = BatchReport::default();
        self.backup_links_into(&mut report, &export.link_keys, &export.locked_link_keys, passphrase)
            .await;

        let mut rooms = BatchReport::default();
        self.backup_rooms_into(&mut rooms, &export.room_keys, &export.locked_room_keys, passphrase)
            .await;
        report
            .succeeded
            .extend(rooms.succeeded.iter().map(|id| room_backup_id(id)));
        report.failed.extend(
            rooms
                .failed
                .into_iter()
                .map(|(id, reason)| (room_backup_id(&id), reason)),
        );

        log_report(&report, "key backup finished");
        Ok(report)
    }

    async fn backup_links_into(
        &self,
        report: &mut BatchReport,
        records: &[LinkKeyRecord],
        locked: &[String],
        passphrase: &str,
    ) {
        for record in records {
            match self
                .upload(&record.link_id, &record.key_pair.private_key, passphrase)
                .await
            {
                Ok(()) => report.succeeded.push(record.link_id.clone()),
                Err(e) => {
                    tracing::warn!(link_id = %record.link_id, error = %e, "link key backup failed");
                    report.failed.push((record.link_id.clone(), e.to_string()));
                }
            }
        }
        for link_id in locked {
            tracing::warn!(link_id = %link_id, "link key sealed under locked vault, not backed up");
            report
                .failed
                .push((link_id.clone(), VAULT_LOCKED_REASON.to_string()));
        }
    }

    async fn backup_rooms_into(
        &self,
        report: &mut BatchReport,
        rooms: &[RoomKeyData],
        locked: &[String],
        passphrase: &str,
    ) {
        for data in rooms.iter().filter(|data| data.is_creator) {
            let slot = room_backup_id(&data.room_id);
            match self
                .upload(&slot, &data.key_pair.private_key, passphrase)
                .await
            {
                Ok(()) => report.succeeded.push(data.room_id.clone()),
                Err(e) => {
                    tracing::warn!(room_id = %data.room_id, error = %e, "room key backup failed");
                    report.failed.push((data.room_id.clone(), e.to_string()));
                }
            }
        }
        for room_id in locked {
            tracing::warn!(room_id = %room_id, "room key sealed under locked vault, not backed up");
            report
                .failed
                .push((room_id.clone(), VAULT_LOCKED_REASON.to_string()));
        }
    }

    /// Fetch, unwrap and save a link key
    ///
    /// The recovered key is saved through the key store, so it is sealed if
    /// the vault is unlocked. If no vault exists yet, one is set up with the
    /// same passphrase; if it exists but is locked, the passphrase is tried
    /// against it and the key is saved plain when it doesn't match. A
    /// mismatch there never counts toward the vault's unlock throttle.
    ///
    /// # Errors
    ///
    /// [`BackupError::IncorrectPassphrase`] when the passphrase doesn't open
    /// the backup.
    pub async fn recover_link_key(
        &self,
        link_id: &str,
        passphrase: &str,
    ) -> Result<RecoveryOutcome, BackupError<R::Error>> {
        let Some(backup) = self
            .remote
            .get_backup(link_id)
            .await
            .map_err(BackupError::Remote)?
        else {
            tracing::debug!(link_id, "no backup available");
            return Ok(RecoveryOutcome::NoBackup);
        };

        let private_key = self.unwrap_off_thread(backup, passphrase).await?;
        self.bridge_vault(passphrase).await?;

        let record = LinkKeyRecord::new(link_id, KeyPair::from_private(private_key));
        self.key_store.save_link_key(&record).await?;
        tracing::info!(link_id, "recovered link key from backup");
        Ok(RecoveryOutcome::Recovered(record))
    }

    /// Restore a room created on this device from its key pair backup
    ///
    /// The group key is never backed up. It is taken back out of a delivery
    /// the creator wrapped for some participant: `wrapped_group_key` as
    /// submitted for the participant holding `participant_public_key`.
    /// The restored room starts a fresh expiry window.
    ///
    /// Creator room keys are only ever stored sealed, so this fails with
    /// [`BackupError::KeyStore`] if the vault stays locked.
    pub async fn recover_room_key(
        &self,
        room_id: &str,
        passphrase: &str,
        wrapped_group_key: &WrappedGroupKey,
        participant_public_key: &PublicKey,
    ) -> Result<RecoveryOutcome<RoomKeyData>, BackupError<R::Error>> {
        let Some(backup) = self
            .remote
            .get_backup(&room_backup_id(room_id))
            .await
            .map_err(BackupError::Remote)?
        else {
            tracing::debug!(room_id, "no room key backup available");
            return Ok(RecoveryOutcome::NoBackup);
        };

        let private_key = self.unwrap_off_thread(backup, passphrase).await?;
        let group_key = unwrap_group_key(wrapped_group_key, &private_key, participant_public_key)?;
        self.bridge_vault(passphrase).await?;

        let data = RoomKeyData {
            room_id: room_id.to_string(),
            group_key,
            key_pair: KeyPair::from_private(private_key),
            anonymous_id: None,
            watermark_seed: None,
            is_creator: true,
            created_at: record_timestamp(),
        };
        self.key_store.save_room_key(&data).await?;
        tracing::info!(room_id, "recovered room key from backup");
        Ok(RecoveryOutcome::Recovered(data))
    }

    async fn upload(
        &self,
        key_id: &str,
        private_key: &PrivateKey,
        passphrase: &str,
    ) -> Result<(), BackupError<R::Error>> {
        let private_key = private_key.clone();
        let passphrase = zeroize::Zeroizing::new(passphrase.to_string());
        let params = self.params;
        let wrapped = tokio::task::spawn_blocking(move || {
            wrap_private_key_with(&private_key, &passphrase, &params)
        })
        .await
        .map_err(|e| BackupError::Task(e.to_string()))??;

        self.remote
            .put_backup(key_id, &wrapped)
            .await
            .map_err(BackupError::Remote)?;
        tracing::debug!(key_id, "uploaded key backup");
        Ok(())
    }

    async fn unwrap_off_thread(
        &self,
        backup: BackupRecord,
        passphrase: &str,
    ) -> Result<PrivateKey, BackupError<R::Error>> {
        let passphrase = zeroize::Zeroizing::new(passphrase.to_string());
        let params = self.params;
        let private_key = tokio::task::spawn_blocking(move || backup.unwrap_with(&passphrase, &params))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))??;
        Ok(private_key)
    }

    async fn bridge_vault(&self, passphrase: &str) -> Result<(), BackupError<R::Error>> {
        let vault = self.key_store.vault();
        let status = vault.status().await.map_err(KeyStoreError::from)?;
        match status {
            VaultStatus::Unlocked => {}
            VaultStatus::Uninitialized => {
                vault.setup(passphrase).await.map_err(KeyStoreError::from)?;
            }
            VaultStatus::Locked => {
                let unlocked = vault
                    .try_unlock_quietly(passphrase)
                    .await
                    .map_err(KeyStoreError::from)?;
                if !unlocked {
                    tracing::warn!("recovery passphrase does not open the vault, it stays locked");
                }
            }
        }
        Ok(())
    }
}

fn log_report(report: &BatchReport, message: &'static str) {
    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "{}",
        message
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::generate_key_pair;
    use crate::room::{generate_ecdh_key_pair, generate_group_key, wrap_group_key};
    use crate::storage::{is_vault_wrapped, KvStore, MemoryKvStore, MemorySessionStore, StoreName};
    use crate::vault::{UnlockPolicy, Vault, VaultError};

    fn key_store_on(kv: &MemoryKvStore) -> KeyStore {
        let session = Arc::new(MemorySessionStore::new());
        let vault = Vault::with_config(
            Arc::new(kv.clone()),
            session.clone(),
            Pbkdf2Params::fast(),
            UnlockPolicy::default(),
        );
        KeyStore::new(Arc::new(kv.clone()), session, vault)
    }

    fn backup_for(remote: &MemoryBackupRemote, key_store: KeyStore) -> KeyBackup<MemoryBackupRemote> {
        KeyBackup::with_params(remote.clone(), key_store, Pbkdf2Params::fast())
    }

    fn creator_room(room_id: &str) -> RoomKeyData {
        RoomKeyData {
            room_id: room_id.to_string(),
            group_key: generate_group_key().unwrap(),
            key_pair: generate_ecdh_key_pair(),
            anonymous_id: None,
            watermark_seed: None,
            is_creator: true,
            created_at: record_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_backup_then_recover_on_new_device() {
        let remote = MemoryBackupRemote::new();
        let old_device = key_store_on(&MemoryKvStore::new());
        let record = LinkKeyRecord::new("link", generate_key_pair());
        old_device.save_link_key(&record).await.unwrap();
        backup_for(&remote, old_device)
            .backup_link_key("link", "recovery phrase")
            .await
            .unwrap();

        let kv = MemoryKvStore::new();
        let new_device = key_store_on(&kv);
        let backup = backup_for(&remote, new_device.clone());

        assert!(matches!(
            backup.recover_link_key("link", "wrong phrase").await,
            Err(BackupError::IncorrectPassphrase)
        ));

        let RecoveryOutcome::Recovered(recovered) = backup
            .recover_link_key("link", "recovery phrase")
            .await
            .unwrap()
        else {
            panic!("expected recovery");
        };
        assert_eq!(recovered.key_pair, record.key_pair);

        // the vault was set up with the recovery passphrase and sealed the key
        assert_eq!(
            new_device.vault().status().await.unwrap(),
            VaultStatus::Unlocked
        );
        let raw = kv.get(StoreName::LinkKeys, "link").await.unwrap().unwrap();
        assert!(is_vault_wrapped(&raw));
    }

    #[tokio::test]
    async fn test_recover_without_backup() {
        let remote = MemoryBackupRemote::new();
        let backup = backup_for(&remote, key_store_on(&MemoryKvStore::new()));
        assert_eq!(
            backup.recover_link_key("unknown", "pass").await.unwrap(),
            RecoveryOutcome::NoBackup
        );
    }

    #[tokio::test]
    async fn test_recover_with_locked_vault_other_passphrase() {
        let remote = MemoryBackupRemote::new();
        let kv = MemoryKvStore::new();
        let store = key_store_on(&kv);
        let record = LinkKeyRecord::new("link", generate_key_pair());
        store.save_link_key(&record).await.unwrap();
        let backup = backup_for(&remote, store.clone());
        backup.backup_link_key("link", "backup phrase").await.unwrap();

        store.vault().setup("vault phrase").await.unwrap();
        store.vault().lock().await.unwrap();
        store.delete_link_key("link").await.unwrap();

        let outcome = backup.recover_link_key("link", "backup phrase").await.unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Recovered(_)));
        assert!(!store.vault().is_unlocked());
        let raw = kv.get(StoreName::LinkKeys, "link").await.unwrap().unwrap();
        assert!(!is_vault_wrapped(&raw));
    }

    #[tokio::test]
    async fn test_backup_missing_key() {
        let remote = MemoryBackupRemote::new();
        let backup = backup_for(&remote, key_store_on(&MemoryKvStore::new()));
        assert!(matches!(
            backup.backup_link_key("nope", "pass").await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_backup_all_link_keys() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        for id in ["a", "b", "c"] {
            store
                .save_link_key(&LinkKeyRecord::new(id, generate_key_pair()))
                .await
                .unwrap();
        }

        let report = backup_for(&remote, store)
            .backup_link_keys("pass")
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.succeeded, vec!["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            assert!(remote.get_backup(id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_repeated_recovery_does_not_throttle_vault() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        store.vault().setup("vault phrase").await.unwrap();
        let ids: Vec<String> = (0..6).map(|i| format!("link-{}", i)).collect();
        for id in &ids {
            store
                .save_link_key(&LinkKeyRecord::new(id.as_str(), generate_key_pair()))
                .await
                .unwrap();
        }
        let backup = backup_for(&remote, store.clone());
        assert!(backup.backup_link_keys("backup phrase").await.unwrap().is_complete());

        store.vault().lock().await.unwrap();
        for id in &ids {
            store.delete_link_key(id).await.unwrap();
            let outcome = backup.recover_link_key(id, "backup phrase").await.unwrap();
            assert!(matches!(outcome, RecoveryOutcome::Recovered(_)));
        }
        assert!(!store.vault().is_unlocked());

        store.vault().unlock("vault phrase").await.unwrap();
        assert!(store.vault().is_unlocked());
    }

    #[tokio::test]
    async fn test_backup_reports_keys_sealed_under_locked_vault() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        store
            .save_link_key(&LinkKeyRecord::new("plain", generate_key_pair()))
            .await
            .unwrap();
        store.vault().setup("vault phrase").await.unwrap();
        store
            .save_link_key(&LinkKeyRecord::new("sealed", generate_key_pair()))
            .await
            .unwrap();
        store.save_room_key(&creator_room("r")).await.unwrap();
        store.vault().lock().await.unwrap();

        let backup = backup_for(&remote, store);
        let report = backup.backup_link_keys("pass").await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.succeeded, vec!["plain"]);
        assert_eq!(
            report.failed,
            vec![("sealed".to_string(), VAULT_LOCKED_REASON.to_string())]
        );
        assert!(remote.get_backup("sealed").await.unwrap().is_none());

        let report = backup.backup_room_keys("pass").await.unwrap();
        assert!(report.succeeded.is_empty());
        assert_eq!(
            report.failed,
            vec![("r".to_string(), VAULT_LOCKED_REASON.to_string())]
        );
    }

    #[tokio::test]
    async fn test_room_key_backup_then_recover_on_new_device() {
        let remote = MemoryBackupRemote::new();
        let old_device = key_store_on(&MemoryKvStore::new());
        old_device.vault().setup("vault phrase").await.unwrap();
        let room = creator_room("room-1");
        old_device.save_room_key(&room).await.unwrap();

        // a delivery made while approving a participant
        let participant = generate_ecdh_key_pair();
        let wrapped =
            wrap_group_key(&room.group_key, &room.key_pair.private_key, &participant.public_key)
                .unwrap();

        backup_for(&remote, old_device)
            .backup_room_key("room-1", "recovery phrase")
            .await
            .unwrap();
        assert!(remote
            .get_backup(&room_backup_id("room-1"))
            .await
            .unwrap()
            .is_some());

        let new_device = key_store_on(&MemoryKvStore::new());
        let backup = backup_for(&remote, new_device.clone());
        assert!(matches!(
            backup
                .recover_room_key("room-1", "wrong phrase", &wrapped, &participant.public_key)
                .await,
            Err(BackupError::IncorrectPassphrase)
        ));

        let RecoveryOutcome::Recovered(recovered) = backup
            .recover_room_key("room-1", "recovery phrase", &wrapped, &participant.public_key)
            .await
            .unwrap()
        else {
            panic!("expected recovery");
        };
        assert_eq!(recovered.group_key, room.group_key);
        assert_eq!(recovered.key_pair, room.key_pair);
        assert!(recovered.is_creator);

        let stored = new_device.require_room_key("room-1").await.unwrap();
        assert_eq!(stored, recovered);
    }

    #[tokio::test]
    async fn test_recover_room_key_with_wrong_delivery() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        store.vault().setup("pass").await.unwrap();
        let room = creator_room("r");
        store.save_room_key(&room).await.unwrap();
        let backup = backup_for(&remote, store);
        backup.backup_room_key("r", "pass").await.unwrap();

        let participant = generate_ecdh_key_pair();
        let wrapped =
            wrap_group_key(&room.group_key, &room.key_pair.private_key, &participant.public_key)
                .unwrap();
        let outsider = generate_ecdh_key_pair();
        assert!(matches!(
            backup
                .recover_room_key("r", "pass", &wrapped, &outsider.public_key)
                .await,
            Err(BackupError::Room(RoomError::Unwrap))
        ));
        assert_eq!(
            backup
                .recover_room_key("missing", "pass", &wrapped, &participant.public_key)
                .await
                .unwrap(),
            RecoveryOutcome::NoBackup
        );
    }

    #[tokio::test]
    async fn test_recover_room_key_needs_open_vault() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        store.vault().setup("vault phrase").await.unwrap();
        let room = creator_room("r");
        store.save_room_key(&room).await.unwrap();
        let backup = backup_for(&remote, store.clone());
        backup.backup_room_key("r", "backup phrase").await.unwrap();
        store.vault().lock().await.unwrap();

        let participant = generate_ecdh_key_pair();
        let wrapped =
            wrap_group_key(&room.group_key, &room.key_pair.private_key, &participant.public_key)
                .unwrap();
        assert!(matches!(
            backup
                .recover_room_key("r", "backup phrase", &wrapped, &participant.public_key)
                .await,
            Err(BackupError::KeyStore(KeyStoreError::Vault(VaultError::VaultLocked)))
        ));
    }

    #[tokio::test]
    async fn test_backup_room_key_requires_creator() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        let mut joined = creator_room("joined");
        joined.is_creator = false;
        store.save_room_key(&joined).await.unwrap();

        let backup = backup_for(&remote, store);
        assert!(matches!(
            backup.backup_room_key("joined", "pass").await,
            Err(BackupError::NotCreator(_))
        ));
        assert!(matches!(
            backup.backup_room_key("unknown", "pass").await,
            Err(BackupError::KeyStore(KeyStoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_backup_all_keys() {
        let remote = MemoryBackupRemote::new();
        let store = key_store_on(&MemoryKvStore::new());
        store.vault().setup("pass").await.unwrap();
        store
            .save_link_key(&LinkKeyRecord::new("link", generate_key_pair()))
            .await
            .unwrap();
        store.save_room_key(&creator_room("r")).await.unwrap();

        let report = backup_for(&remote, store)
            .backup_all_keys("pass")
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.succeeded, vec!["link".to_string(), room_backup_id("r")]);
        assert!(remote.get_backup("link").await.unwrap().is_some());
        assert!(remote.get_backup("room:r").await.unwrap().is_some());
    }
}
