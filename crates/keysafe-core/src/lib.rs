//! Core abstractions for Keysafe: credential records, the whole-collection
//! store contract, and the in-memory credential book that drives it.

pub mod book;
pub mod credentials;
pub mod storage;
