//! Shared test utilities for key lifecycle integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::key_store::KeyStore;
use common::storage::{MemoryKvStore, MemorySessionStore};
use common::vault::Vault;

/// One device: durable store, session store and a key store over both
pub struct Device {
    pub kv: MemoryKvStore,
    pub session: MemorySessionStore,
    pub key_store: KeyStore,
}

impl Device {
    pub fn vault(&self) -> &Vault {
        self.key_store.vault()
    }

    /// The same device after a reload: same stores, fresh in-memory state
    pub fn reload(&self) -> Device {
        device_on(self.kv.clone(), self.session.clone())
    }

    /// A second session (another tab) on the same durable store
    pub fn new_session(&self) -> Device {
        device_on(self.kv.clone(), MemorySessionStore::new())
    }
}

/// Route `RUST_LOG`-filtered logs to the test harness output
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up a fresh device with production vault parameters
pub fn setup_device() -> Device {
    init_test_logging();
    device_on(MemoryKvStore::new(), MemorySessionStore::new())
}

fn device_on(kv: MemoryKvStore, session: MemorySessionStore) -> Device {
    let vault = Vault::new(Arc::new(kv.clone()), Arc::new(session.clone()));
    let key_store = KeyStore::new(Arc::new(kv.clone()), Arc::new(session.clone()), vault);
    Device {
        kv,
        session,
        key_store,
    }
}
