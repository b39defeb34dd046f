//! Integration tests for passphrase backup and recovery

mod common;

use ::common::backup::{BackupRemote, KeyBackup, MemoryBackupRemote, RecoveryOutcome};
use ::common::crypto::{generate_key_pair, unwrap_private_key, wrap_private_key, PassphraseError};
use ::common::key_store::LinkKeyRecord;
use ::common::vault::VaultStatus;

#[test]
fn test_wrap_with_production_parameters() {
    let pair = generate_key_pair();
    let wrapped = wrap_private_key(&pair.private_key, "correct-passphrase").unwrap();

    let wrong = unwrap_private_key(
        &wrapped.wrapped_key,
        "wrong-passphrase",
        &wrapped.salt,
        &wrapped.iv,
    );
    assert!(matches!(wrong, Err(PassphraseError::IncorrectPassphrase)));

    let recovered = unwrap_private_key(
        &wrapped.wrapped_key,
        "correct-passphrase",
        &wrapped.salt,
        &wrapped.iv,
    )
    .unwrap();
    assert_eq!(recovered, pair.private_key);
}

#[tokio::test]
async fn test_lost_device_recovery() {
    let remote = MemoryBackupRemote::new();

    let old_device = common::setup_device();
    let record = LinkKeyRecord::new("link", generate_key_pair());
    old_device.key_store.save_link_key(&record).await.unwrap();
    KeyBackup::new(remote.clone(), old_device.key_store.clone())
        .backup_link_key("link", "recovery")
        .await
        .unwrap();
    let stored = remote.get_backup("link").await.unwrap().unwrap();
    assert_eq!(hex::decode(&stored.salt).unwrap().len(), 32);

    let new_device = common::setup_device();
    let backup = KeyBackup::new(remote, new_device.key_store.clone());
    assert_eq!(
        backup.recover_link_key("other", "recovery").await.unwrap(),
        RecoveryOutcome::NoBackup
    );

    let RecoveryOutcome::Recovered(recovered) =
        backup.recover_link_key("link", "recovery").await.unwrap()
    else {
        panic!("expected the backup to be recovered");
    };
    assert_eq!(recovered.link_id, "link");
    assert_eq!(recovered.key_pair, record.key_pair);
    assert_eq!(
        new_device.vault().status().await.unwrap(),
        VaultStatus::Unlocked
    );
    assert_eq!(
        new_device
            .key_store
            .get_link_key("link")
            .await
            .unwrap()
            .unwrap()
            .key_pair,
        record.key_pair
    );
}
