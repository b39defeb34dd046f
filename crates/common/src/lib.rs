/**
 * Cryptographic types and operations.
 *  - P-256 key pairs and their portable export format
 *  - ECDH key agreement into AES-256-GCM keys
 *  - Passphrase wrapping of private keys
 */
pub mod crypto;
/**
 * Pairwise encryption for anonymous sender to
 *  link owner messages, using a fresh ephemeral
 *  key pair per message.
 */
pub mod e2ee;
/**
 * Group encryption for rooms. One symmetric key
 *  per room, distributed to each participant
 *  wrapped under a pairwise ECDH key.
 */
pub mod room;
/**
 * Storage seams consumed by the key lifecycle:
 *  a durable partitioned key-value store and a
 *  per-tab session store, plus in-memory versions.
 */
pub mod storage;
/**
 * Passphrase-derived at-rest encryption for every
 *  key persisted on the device.
 */
pub mod vault;
/**
 * Orchestration over the stores and the vault:
 *  which representation each key category uses,
 *  migration, expiry and bulk export.
 */
pub mod key_store;
/**
 * Passphrase-wrapped key backup to, and recovery
 *  from, a remote per-key slot.
 */
pub mod backup;

pub mod prelude {
    pub use crate::backup::{BackupRecord, BackupRemote, KeyBackup, RecoveryOutcome};
    pub use crate::crypto::{KeyPair, PortablePrivateKey, PrivateKey, PublicKey, Secret};
    pub use crate::e2ee::{DecryptOutcome, EncryptedMessage};
    pub use crate::key_store::{KeyStore, KeyStoreError, LinkKeyRecord, RoomKeyData};
    pub use crate::room::{GroupKey, GroupMessage, WrappedGroupKey};
    pub use crate::storage::{KvStore, SessionStore, StoreName};
    pub use crate::vault::{Vault, VaultError, VaultStatus};
}
