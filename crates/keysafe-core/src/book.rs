use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    credentials::{CredentialRecord, IndexOutOfRange, RecordCollection},
    storage::{CredentialStore, StoreError},
};

/// What to do when the saved collection exists but cannot be read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CorruptPolicy {
    /// Refuse to open; the unreadable file is left untouched.
    #[default]
    Fail,
    /// Log the failure and continue with an empty collection. The unreadable
    /// file is kept until the first add, edit or delete overwrites it.
    StartEmpty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    #[error("select an entry first (no entry at index {index})")]
    NoSuchEntry { index: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IndexOutOfRange> for BookError {
    fn from(err: IndexOutOfRange) -> Self {
        BookError::NoSuchEntry { index: err.index }
    }
}

/// In-memory owner of the credential collection.
///
/// The collection held here is the source of truth; every mutation is
/// followed by a full save so the store mirrors it.
pub struct CredentialBook<S: CredentialStore> {
    store: S,
    records: RecordCollection,
    /// Opened empty over an unreadable store; nothing has been written yet.
    unreadable: bool,
}

impl<S: CredentialStore> CredentialBook<S> {
    /// Load the collection from `store`. A missing store opens empty.
    #[instrument(skip(store))]
    pub async fn open(store: S, policy: CorruptPolicy) -> Result<Self, BookError> {
        let (records, unreadable) = match store.load().await {
            Ok(records) => (records, false),
            Err(err @ StoreError::Corrupt { .. }) if policy == CorruptPolicy::StartEmpty => {
                warn!(%err, "credential store unreadable, starting empty");
                (RecordCollection::new(), true)
            }
            Err(err) => return Err(err.into()),
        };
        info!(count = records.len(), "credentials loaded");
        Ok(Self {
            store,
            records,
            unreadable,
        })
    }

    pub fn records(&self) -> &RecordCollection {
        &self.records
    }

    pub fn labels(&self) -> Vec<String> {
        self.records.labels()
    }

    pub fn get(&self, index: usize) -> Result<&CredentialRecord, BookError> {
        self.records
            .get(index)
            .ok_or(BookError::NoSuchEntry { index })
    }

    pub fn username(&self, index: usize) -> Result<&str, BookError> {
        self.get(index).map(CredentialRecord::username)
    }

    pub fn password(&self, index: usize) -> Result<&str, BookError> {
        self.get(index).map(CredentialRecord::password)
    }

    /// Append a record and persist. Returns the new record's index.
    #[instrument(skip_all)]
    pub async fn add(&mut self, record: CredentialRecord) -> Result<usize, BookError> {
        self.records.push(record);
        self.persist().await?;
        info!("entry added");
        Ok(self.records.len() - 1)
    }

    #[instrument(skip(self, record))]
    pub async fn edit(&mut self, index: usize, record: CredentialRecord) -> Result<(), BookError> {
        self.records.replace(index, record)?;
        self.persist().await?;
        info!("entry edited");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&mut self, index: usize) -> Result<CredentialRecord, BookError> {
        let removed = self.records.remove(index)?;
        self.persist().await?;
        info!("entry deleted");
        Ok(removed)
    }

    /// Final save on shutdown. An unreadable store that was never changed
    /// is left as it was.
    pub async fn close(mut self) -> Result<(), BookError> {
        if self.unreadable {
            info!("no changes made; leaving unreadable credential store in place");
            return Ok(());
        }
        self.persist().await
    }

    async fn persist(&mut self) -> Result<(), BookError> {
        self.store.save(&self.records).await?;
        self.unreadable = false;
        Ok(())
    }
}
