use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use crate::credentials::RecordCollection;

/// Errors produced by credential store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No store has been written yet.
    #[error("no credential store at {location}")]
    NotFound { location: String },
    /// The store exists but cannot be decrypted or decoded.
    #[error("credential store is unreadable: {reason}")]
    Corrupt { reason: String },
    /// Key material could not be obtained.
    #[error("key unavailable: {reason}")]
    Key { reason: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Whole-collection persistence contract.
///
/// `load` never treats a missing store as an error; it returns an empty
/// collection. Every other failure is reported with a distinct kind so the
/// caller can tell "nothing saved yet" from "saved data is unreadable".
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read and decode the full collection.
    async fn load(&self) -> Result<RecordCollection, StoreError>;

    /// Encode and overwrite the full collection.
    async fn save(&self, records: &RecordCollection) -> Result<(), StoreError>;

    /// Fail-open load: any error is logged and reported as an empty collection.
    async fn load_or_empty(&self) -> RecordCollection {
        match self.load().await {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "failed to load credentials, starting empty");
                RecordCollection::new()
            }
        }
    }

    /// Fire-and-forget save: failures are logged and swallowed.
    async fn save_logged(&self, records: &RecordCollection) {
        if let Err(err) = self.save(records).await {
            error!(%err, "failed to save credentials");
        }
    }
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn load(&self) -> Result<RecordCollection, StoreError> {
        (**self).load().await
    }

    async fn save(&self, records: &RecordCollection) -> Result<(), StoreError> {
        (**self).save(records).await
    }
}

/// In-memory store that simulates encryption for tests and smoke runs.
/// This is not cryptographically secure; the file-backed store in
/// `keysafe-storage` uses AES-GCM.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    inner: Arc<Mutex<Option<Vec<u8>>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw bytes, as if a damaged blob had been saved.
    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(mask(&bytes.into())))),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Vec<u8>>>, StoreError> {
        self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<RecordCollection, StoreError> {
        let guard = self.lock()?;
        match guard.as_deref() {
            None => Ok(RecordCollection::new()),
            Some(masked) => {
                serde_json::from_slice(&unmask(masked)).map_err(|e| StoreError::Corrupt {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn save(&self, records: &RecordCollection) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(records).map_err(|e| StoreError::Storage {
            reason: e.to_string(),
        })?;
        // XOR is a placeholder to avoid holding plaintext in tests.
        *self.lock()? = Some(mask(&bytes));
        Ok(())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

fn unmask(input: &[u8]) -> Vec<u8> {
    mask(input)
}
