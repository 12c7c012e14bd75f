//! Database layer for Keeper

mod connection;
mod migrations;
mod record_store;

pub use connection::{Database, DatabaseLocation};
pub use record_store::{LibSqlRecordStore, RecordStore, HISTORY_LIMIT};
