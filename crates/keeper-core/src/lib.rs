//! keeper-core - Core library for Keeper
//!
//! Shared record models, the versioned record store, the encryption and
//! token capabilities, and both halves of the sync protocol. Used by the
//! `keeper` CLI and the `keeper-api` server.

pub mod auth;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Conflict, ConflictReason, HistoryEntry, Record, RecordId, RecordKind};
