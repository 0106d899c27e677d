use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stored (application, username, password) triple.
///
/// Records are immutable once built; editing replaces the record at its index.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    app_name: String,
    username: String,
    password: String,
}

impl CredentialRecord {
    pub fn new(
        app_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Plaintext secret. Avoid logging the returned value.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// List label shown for this record: `"<app> - <username>"`.
    pub fn display_line(&self) -> String {
        format!("{} - {}", self.app_name, self.username)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("app_name", &self.app_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Raised when an index does not address a record in the collection.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no entry at index {index} (collection has {len})")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Ordered, index-addressable set of credential records.
///
/// Identity is positional; duplicate app/username pairs are allowed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RecordCollection {
    records: Vec<CredentialRecord>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CredentialRecord> {
        self.records.get(index)
    }

    pub fn push(&mut self, record: CredentialRecord) {
        self.records.push(record);
    }

    /// Swap the record at `index` for `record`, returning the previous one.
    pub fn replace(
        &mut self,
        index: usize,
        record: CredentialRecord,
    ) -> Result<CredentialRecord, IndexOutOfRange> {
        let len = self.records.len();
        let slot = self
            .records
            .get_mut(index)
            .ok_or(IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, record))
    }

    pub fn remove(&mut self, index: usize) -> Result<CredentialRecord, IndexOutOfRange> {
        if index >= self.records.len() {
            return Err(IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        Ok(self.records.remove(index))
    }

    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(CredentialRecord::display_line).collect()
    }
}

impl From<Vec<CredentialRecord>> for RecordCollection {
    fn from(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }
}
