//! Authentication module for the session credential.
//!
//! This module provides:
//! - `CredentialStore`: key/value storage for the raw credential record,
//!   with file, OS keychain and in-memory backends
//! - `Session` / `AuthRecord`: the parsed credential stored under `auth`
//! - `Navigator`: the hook told to show the login page after an auth failure

pub mod credentials;
pub mod navigator;
pub mod session;
pub mod store;

pub use credentials::KeyringStore;
pub use navigator::{LogNavigator, Navigator, LOGIN_PATH};
pub use session::{AuthRecord, Session, AUTH_KEY};
pub use store::{CredentialStore, FileStore, MemoryStore};
