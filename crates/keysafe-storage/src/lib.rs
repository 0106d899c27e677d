//! File-backed credential storage with encryption at rest.
//! Uses AES-GCM with keys sourced from the OS keyring, a configured
//! passphrase, or test doubles.

pub mod encrypted_store;
pub mod key_provider;
