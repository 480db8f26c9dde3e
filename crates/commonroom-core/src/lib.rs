//! Core library for the Commonroom client.
//!
//! - `api`: the HTTP client facade with one method per backend endpoint
//! - `auth`: session credential storage and the login redirect hook
//! - `config`: base URL, storage backend and timeout settings

pub mod api;
pub mod auth;
pub mod config;

use std::sync::Arc;

use anyhow::Result;

pub use api::{ApiClient, ApiError, ResourceUpload};
pub use auth::{AuthRecord, CredentialStore, FileStore, KeyringStore, MemoryStore, Navigator};
pub use config::{Config, StoreKind};

/// Open the credential store selected by the config.
pub fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.store {
        StoreKind::File => Arc::new(FileStore::new(config.data_dir()?)),
        StoreKind::Keyring => Arc::new(KeyringStore::new()),
    };
    Ok(store)
}
