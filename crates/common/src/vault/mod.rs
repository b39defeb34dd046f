//! Local vault
//!
//! At-rest protection for key material persisted on the device. The vault
//! holds a passphrase-derived master key in memory while unlocked; durable
//! state is limited to the salt, the iteration count and a verifier (a known
//! plaintext sealed under the master key) used to reject wrong passphrases.
//!
//! ```text
//!  uninitialized --setup--> unlocked <--unlock / restore-- locked
//!                              |                              ^
//!                              +------------lock--------------+
//! ```
//!
//! State transitions are serialised internally, so concurrent `unlock`
//! calls are safe. The master key is cached in the session store so a reload
//! within the same session can restore the unlocked state without the
//! passphrase; a different session store never sees it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::crypto::{
    derive_passphrase_key, generate_salt, PassphraseError, Pbkdf2Params, Sealed, Secret,
    SecretError,
};
use crate::storage::{KvStore, SessionStore, StorageError, StoreName, VaultEnvelope};

mod throttle;

pub use throttle::UnlockPolicy;
use throttle::Throttle;

const METADATA_KEY: &str = "config";
const SESSION_KEY: &str = "vault:master-key";
const VERIFIER_PLAINTEXT: &[u8] = b"burnware-vault-verifier-v1";

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault is not configured")]
    NotConfigured,
    #[error("vault is already configured")]
    AlreadyConfigured,
    #[error("incorrect passphrase")]
    IncorrectPassphrase,
    #[error("vault is locked")]
    VaultLocked,
    #[error("too many failed unlock attempts, retry in {}s", .retry_after.as_secs())]
    TooManyAttempts { retry_after: Duration },
    #[error("corrupt vault data: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("passphrase error: {0}")]
    Passphrase(#[from] PassphraseError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("vault error: {0}")]
    Default(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    Uninitialized,
    Locked,
    Unlocked,
}

/// What the vault persists about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    /// hex
    pub salt: String,
    pub iterations: u32,
    /// base64 ciphertext of the verifier plaintext
    pub verifier: String,
    /// base64
    pub verifier_iv: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Handle to the device vault. Clones share state.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<VaultInner>,
}

struct VaultInner {
    kv: Arc<dyn KvStore>,
    session: Arc<dyn SessionStore>,
    params: Pbkdf2Params,
    policy: UnlockPolicy,
    master_key: RwLock<Option<Secret>>,
    transitions: Mutex<Throttle>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("unlocked", &self.is_unlocked())
            .field("params", &self.inner.params)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl Vault {
    pub fn new(kv: Arc<dyn KvStore>, session: Arc<dyn SessionStore>) -> Self {
        Self::with_config(kv, session, Pbkdf2Params::default(), UnlockPolicy::default())
    }

    pub fn with_config(
        kv: Arc<dyn KvStore>,
        session: Arc<dyn SessionStore>,
        params: Pbkdf2Params,
        policy: UnlockPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(VaultInner {
                kv,
                session,
                params,
                policy,
                master_key: RwLock::new(None),
                transitions: Mutex::new(Throttle::default()),
            }),
        }
    }

    /// First-time initialisation. Leaves the vault unlocked.
    pub async fn setup(&self, passphrase: &str) -> Result<(), VaultError> {
        let _guard = self.inner.transitions.lock().await;
        if self.load_metadata().await?.is_some() {
            return Err(VaultError::AlreadyConfigured);
        }

        let salt = generate_salt()?;
        let key = derive_off_thread(passphrase, salt.to_vec(), self.inner.params).await?;
        let verifier = key.seal(VERIFIER_PLAINTEXT)?;

        let metadata = VaultMetadata {
            salt: hex::encode(salt),
            iterations: self.inner.params.iterations(),
            verifier: verifier.ciphertext_base64(),
            verifier_iv: verifier.iv_base64(),
            created_at: Utc::now(),
        };
        self.inner
            .kv
            .put(
                StoreName::VaultMeta,
                METADATA_KEY,
                serde_json::to_value(&metadata)?,
            )
            .await?;

        self.install(key).await?;
        tracing::info!(iterations = metadata.iterations, "vault configured");
        Ok(())
    }

    /// Unlock an existing vault with its passphrase
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotConfigured`] if [`Vault::setup`] never ran
    /// - [`VaultError::IncorrectPassphrase`] when the verifier does not open
    /// - [`VaultError::TooManyAttempts`] while backing off after repeated
    ///   failures
    pub async fn unlock(&self, passphrase: &str) -> Result<(), VaultError> {
        let mut throttle = self.inner.transitions.lock().await;
        if let Some(retry_after) = throttle.retry_after(Instant::now()) {
            return Err(VaultError::TooManyAttempts { retry_after });
        }

        let metadata = self
            .load_metadata()
            .await?
            .ok_or(VaultError::NotConfigured)?;
        let key = derive_for(&metadata, passphrase).await?;

        if !verify(&metadata, &key)? {
            throttle.record_failure(&self.inner.policy, Instant::now());
            tracing::warn!(
                failures = throttle.failures(),
                "vault unlock failed: incorrect passphrase"
            );
            return Err(VaultError::IncorrectPassphrase);
        }

        throttle.reset();
        self.install(key).await?;
        tracing::debug!("vault unlocked");
        Ok(())
    }

    /// Unlock if `passphrase` happens to be the vault passphrase
    ///
    /// For callers holding a passphrase for something else that may also
    /// open the vault. A mismatch is not a failed attempt: the throttle is
    /// left alone and `Ok(false)` comes back. While backing off, no
    /// derivation runs and the answer is `Ok(false)` as well.
    pub(crate) async fn try_unlock_quietly(&self, passphrase: &str) -> Result<bool, VaultError> {
        let mut throttle = self.inner.transitions.lock().await;
        if self.is_unlocked() {
            return Ok(true);
        }
        if throttle.retry_after(Instant::now()).is_some() {
            return Ok(false);
        }

        let metadata = self
            .load_metadata()
            .await?
            .ok_or(VaultError::NotConfigured)?;
        let key = derive_for(&metadata, passphrase).await?;
        if !verify(&metadata, &key)? {
            return Ok(false);
        }

        throttle.reset();
        self.install(key).await?;
        tracing::debug!("vault unlocked");
        Ok(true)
    }

    /// Restore the unlocked state from the session cache, if this session
    /// unlocked the vault before. Returns whether the vault is now unlocked.
    pub async fn try_restore_from_session(&self) -> Result<bool, VaultError> {
        let _guard = self.inner.transitions.lock().await;
        if self.is_unlocked() {
            return Ok(true);
        }

        let Some(encoded) = self.inner.session.get(SESSION_KEY).await? else {
            return Ok(false);
        };
        let encoded = Zeroizing::new(encoded);

        let restored = match (self.load_metadata().await?, Secret::from_base64(&encoded)) {
            (Some(metadata), Ok(key)) => verify(&metadata, &key)?.then_some(key),
            _ => None,
        };

        match restored {
            Some(key) => {
                *self.inner.master_key.write() = Some(key);
                tracing::debug!("vault restored from session");
                Ok(true)
            }
            None => {
                tracing::warn!("discarding stale vault session cache");
                self.inner.session.remove(SESSION_KEY).await?;
                Ok(false)
            }
        }
    }

    /// Forget the master key, in memory and in the session cache
    pub async fn lock(&self) -> Result<(), VaultError> {
        let _guard = self.inner.transitions.lock().await;
        self.inner.master_key.write().take();
        self.inner.session.remove(SESSION_KEY).await?;
        tracing::debug!("vault locked");
        Ok(())
    }

    pub async fn status(&self) -> Result<VaultStatus, VaultError> {
        if self.is_unlocked() {
            return Ok(VaultStatus::Unlocked);
        }
        Ok(if self.is_configured().await? {
            VaultStatus::Locked
        } else {
            VaultStatus::Uninitialized
        })
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.master_key.read().is_some()
    }

    pub async fn is_configured(&self) -> Result<bool, VaultError> {
        Ok(self.load_metadata().await?.is_some())
    }

    /// Seal bytes under the master key
    ///
    /// Fails with [`VaultError::VaultLocked`] unless unlocked; there is no
    /// fallback to plaintext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<VaultEnvelope, VaultError> {
        let guard = self.inner.master_key.read();
        let key = guard.as_ref().ok_or(VaultError::VaultLocked)?;
        let sealed = key.seal(plaintext)?;
        Ok(VaultEnvelope::new(
            sealed.ciphertext_base64(),
            sealed.iv_base64(),
        ))
    }

    /// Open an envelope sealed by [`Vault::encrypt`]
    ///
    /// A locked vault yields [`VaultError::VaultLocked`]; anything that is
    /// wrong with the envelope itself yields [`VaultError::Corrupt`].
    pub fn decrypt(&self, envelope: &VaultEnvelope) -> Result<Vec<u8>, VaultError> {
        let guard = self.inner.master_key.read();
        let key = guard.as_ref().ok_or(VaultError::VaultLocked)?;
        let sealed = Sealed::from_base64(&envelope.ciphertext, &envelope.iv)
            .map_err(|e| VaultError::Corrupt(e.to_string()))?;
        key.open(&sealed).map_err(|e| match e {
            SecretError::Authentication => {
                VaultError::Corrupt("envelope failed authentication".to_string())
            }
            other => other.into(),
        })
    }

    pub fn encrypt_value<T: Serialize>(&self, value: &T) -> Result<VaultEnvelope, VaultError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
        self.encrypt(&plaintext)
    }

    pub fn decrypt_value<T: DeserializeOwned>(
        &self,
        envelope: &VaultEnvelope,
    ) -> Result<T, VaultError> {
        let plaintext = Zeroizing::new(self.decrypt(envelope)?);
        serde_json::from_slice(&plaintext).map_err(|e| VaultError::Corrupt(e.to_string()))
    }

    async fn load_metadata(&self) -> Result<Option<VaultMetadata>, VaultError> {
        match self.inner.kv.get(StoreName::VaultMeta, METADATA_KEY).await? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(|e| VaultError::Corrupt(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn install(&self, key: Secret) -> Result<(), VaultError> {
        self.inner
            .session
            .set(SESSION_KEY, key.to_base64())
            .await?;
        *self.inner.master_key.write() = Some(key);
        Ok(())
    }
}

fn verify(metadata: &VaultMetadata, key: &Secret) -> Result<bool, VaultError> {
    let sealed = Sealed::from_base64(&metadata.verifier, &metadata.verifier_iv)
        .map_err(|e| VaultError::Corrupt(format!("invalid verifier: {}", e)))?;
    match key.open(&sealed) {
        Ok(plaintext) => Ok(plaintext == VERIFIER_PLAINTEXT),
        Err(SecretError::Authentication) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn derive_for(metadata: &VaultMetadata, passphrase: &str) -> Result<Secret, VaultError> {
    let salt = hex::decode(&metadata.salt)
        .map_err(|e| VaultError::Corrupt(format!("invalid salt: {}", e)))?;
    derive_off_thread(
        passphrase,
        salt,
        Pbkdf2Params::stored(metadata.iterations),
    )
    .await
}

/// PBKDF2 at production cost takes long enough to stall a runtime worker
async fn derive_off_thread(
    passphrase: &str,
    salt: Vec<u8>,
    params: Pbkdf2Params,
) -> Result<Secret, VaultError> {
    let passphrase = Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || derive_passphrase_key(&passphrase, &salt, &params))
        .await
        .map_err(|e| VaultError::Default(anyhow::anyhow!("key derivation task failed: {}", e)))
}
