use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length in bytes of the AES-256 key.
pub const KEY_LEN: usize = 32;

/// Key material used for encryption at rest. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("no key stored for {0}")]
    Missing(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Supplies the store key (OS keychain in production; memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Key previously created, or [`KeyError::Missing`]. Never creates one.
    async fn get(&self) -> Result<KeyMaterial, KeyError>;

    /// Existing key, or a freshly generated and stored one.
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// OS keyring-backed provider. A random key is generated on first save and
/// kept in the platform keychain under `service`/`account`.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// Run a blocking keyring call off the async worker; the secret-service
    /// backend drives its own executor.
    async fn with_entry<T, F>(&self, op: F) -> Result<T, KeyError>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry, String) -> Result<T, KeyError> + Send + 'static,
    {
        let service = self.service.clone();
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account)
                .map_err(|e| KeyError::Keyring(e.to_string()))?;
            op(entry, format!("{service}/{account}"))
        })
        .await
        .map_err(|e| KeyError::Keyring(format!("keyring task failed: {e}")))?
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get(&self) -> Result<KeyMaterial, KeyError> {
        self.with_entry(|entry, name| match entry.get_password() {
            Ok(secret) => decode_key(&secret),
            Err(keyring::Error::NoEntry) => Err(KeyError::Missing(name)),
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        })
        .await
    }

    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        self.with_entry(|entry, name| match entry.get_password() {
            Ok(secret) => decode_key(&secret),
            Err(keyring::Error::NoEntry) => {
                info!(entry = %name, "creating store key in the OS keyring");
                let material = generate_key();
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        })
        .await
    }
}

/// Fixed-passphrase provider.
///
/// The passphrase bytes are truncated or zero-padded to [`KEY_LEN`] and used
/// directly as the key: no salt, no key derivation. Anyone holding the
/// passphrase (or the config file it lives in) can read the store.
pub struct PassphraseKeyProvider {
    material: KeyMaterial,
}

impl PassphraseKeyProvider {
    pub fn new(passphrase: &str) -> Self {
        warn!("using a fixed passphrase key; this scheme has no key derivation and is not secure");
        Self {
            material: passphrase_key(passphrase),
        }
    }
}

impl fmt::Debug for PassphraseKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseKeyProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyProvider for PassphraseKeyProvider {
    async fn get(&self) -> Result<KeyMaterial, KeyError> {
        Ok(self.material.clone())
    }

    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        Ok(self.material.clone())
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

impl InMemoryKeyProvider {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<KeyMaterial>>, KeyError> {
        self.inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get(&self) -> Result<KeyMaterial, KeyError> {
        self.lock()?
            .clone()
            .ok_or_else(|| KeyError::Missing("in-memory key".to_string()))
    }

    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self.lock()?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

#[async_trait]
impl<P: KeyProvider + ?Sized> KeyProvider for Box<P> {
    async fn get(&self) -> Result<KeyMaterial, KeyError> {
        (**self).get().await
    }

    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        (**self).get_or_create().await
    }
}

fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: "default".to_string(),
        bytes,
    }
}

fn passphrase_key(passphrase: &str) -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    let raw = passphrase.as_bytes();
    let take = raw.len().min(KEY_LEN);
    bytes[..take].copy_from_slice(&raw[..take]);
    KeyMaterial {
        id: "passphrase".to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let mut bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != KEY_LEN {
        let len = bytes.len();
        bytes.zeroize();
        return Err(KeyError::Decode(format!(
            "expected {KEY_LEN} bytes, got {len}"
        )));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(KeyMaterial {
        id: "default".to_string(),
        bytes: out,
    })
}
