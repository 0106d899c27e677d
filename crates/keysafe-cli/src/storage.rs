use std::path::PathBuf;

use crate::config::{Config, KeySource};
use color_eyre::Result;
use dirs::data_dir;
use keysafe_storage::{
    encrypted_store::{EncryptedFileStore, DEFAULT_FILE_NAME},
    key_provider::{KeyProvider, KeyringProvider, PassphraseKeyProvider},
};
use tracing::debug;

const KEYRING_SERVICE: &str = "keysafe";
const KEYRING_ACCOUNT: &str = "store-key";

/// Store type used by the binary; the key source is chosen at runtime.
pub type AppStore = EncryptedFileStore<Box<dyn KeyProvider>>;

/// Resolve the default data directory for Keysafe.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("keysafe"))
}

/// Full path of the encrypted file, honoring config overrides.
pub fn store_path(config: &Config) -> Result<PathBuf> {
    let dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let file_name = config.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME);
    Ok(dir.join(file_name))
}

pub fn key_provider(config: &Config) -> Box<dyn KeyProvider> {
    match &config.key {
        KeySource::Keyring => Box::new(KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT)),
        KeySource::Passphrase { passphrase } => Box::new(PassphraseKeyProvider::new(passphrase)),
    }
}

/// Build the encrypted store described by `config`.
pub fn store_from_config(config: &Config) -> Result<AppStore> {
    let path = store_path(config)?;
    debug!(?path, "initializing encrypted store");
    Ok(EncryptedFileStore::new(path, key_provider(config)))
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_store(
    root: impl AsRef<std::path::Path>,
) -> EncryptedFileStore<keysafe_storage::key_provider::InMemoryKeyProvider> {
    EncryptedFileStore::in_dir(root, Default::default())
}
