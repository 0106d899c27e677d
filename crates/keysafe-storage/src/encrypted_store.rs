use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keysafe_core::{
    credentials::RecordCollection,
    storage::{CredentialStore, StoreError},
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};
use zeroize::Zeroize;

use crate::key_provider::{KeyError, KeyMaterial, KeyProvider};

/// Default name of the backing file inside the data directory.
pub const DEFAULT_FILE_NAME: &str = "credentials.dat";

const NONCE_LEN: usize = 12;

/// AES-GCM encrypted single-file store holding the whole credential collection.
///
/// Every save rewrites the file in full through a temp file and rename, so a
/// crash mid-write leaves the previous snapshot in place.
pub struct EncryptedFileStore<P: KeyProvider> {
    path: PathBuf,
    key_provider: P,
}

impl<P: KeyProvider> EncryptedFileStore<P> {
    pub fn new(path: impl Into<PathBuf>, key_provider: P) -> Self {
        Self {
            path: path.into(),
            key_provider,
        }
    }

    /// Store at `dir/credentials.dat`.
    pub fn in_dir(dir: impl AsRef<Path>, key_provider: P) -> Self {
        Self::new(dir.as_ref().join(DEFAULT_FILE_NAME), key_provider)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cipher for reading an existing file. A missing key is an error here,
    /// never a reason to mint a new one.
    async fn read_cipher(&self) -> Result<Aes256Gcm, StoreError> {
        let key_material = self.key_provider.get().await.map_err(key_err)?;
        build_cipher(&key_material)
    }

    async fn write_cipher(&self) -> Result<Aes256Gcm, StoreError> {
        let key_material = self
            .key_provider
            .get_or_create()
            .await
            .map_err(key_err)?;
        build_cipher(&key_material)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredBlob {
    nonce: String,
    ciphertext: String,
}

#[async_trait]
impl<P: KeyProvider> CredentialStore for EncryptedFileStore<P> {
    #[instrument(skip_all)]
    async fn load(&self) -> Result<RecordCollection, StoreError> {
        let blob = match read_blob(&self.path) {
            Ok(blob) => blob,
            Err(StoreError::NotFound { .. }) => {
                debug!(path = %self.path.display(), "no credential store yet; starting empty");
                return Ok(RecordCollection::new());
            }
            Err(err) => return Err(err),
        };

        let cipher = self.read_cipher().await?;

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(blob.nonce)
            .map_err(|e| corrupt(format!("nonce decode failed: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(corrupt(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(blob.ciphertext)
            .map_err(|e| corrupt(format!("ciphertext decode failed: {e}")))?;

        let mut plaintext = cipher
            .decrypt(nonce, ciphertext.as_slice())
            .map_err(|_| corrupt("decrypt failed (wrong key or tampered data)"))?;

        let records = serde_json::from_slice::<RecordCollection>(&plaintext)
            .map_err(|e| corrupt(format!("malformed collection: {e}")));
        plaintext.zeroize();
        let records = records?;
        debug!(count = records.len(), "credential store decrypted");
        Ok(records)
    }

    #[instrument(skip_all)]
    async fn save(&self, records: &RecordCollection) -> Result<(), StoreError> {
        let cipher = self.write_cipher().await?;

        let mut plaintext = serde_json::to_vec(records).map_err(storage_err)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext.as_slice());
        plaintext.zeroize();
        let ciphertext = ciphertext.map_err(|e| StoreError::Storage {
            reason: format!("encrypt failed: {e}"),
        })?;

        let blob = StoredBlob {
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        };

        write_blob(&self.path, &blob)?;
        debug!(path = %self.path.display(), count = records.len(), "credential store written");
        Ok(())
    }
}

fn write_blob(path: &Path, blob: &StoredBlob) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec(blob).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_blob(path: &Path) -> Result<StoredBlob, StoreError> {
    let mut file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                location: path.to_string_lossy().to_string(),
            }
        } else {
            storage_err(err)
        }
    })?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    serde_json::from_slice(&buf).map_err(|e| corrupt(format!("unreadable envelope: {e}")))
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, StoreError> {
    Aes256Gcm::new_from_slice(&material.bytes).map_err(|e| StoreError::Key {
        reason: format!("cipher init failed: {e}"),
    })
}

fn corrupt(reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        reason: reason.into(),
    }
}

fn key_err(err: KeyError) -> StoreError {
    StoreError::Key {
        reason: err.to_string(),
    }
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}
