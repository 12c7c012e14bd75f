//! Data models for Keeper

mod account;
mod payload;
mod record;
mod sync;

pub use account::{
    ApiResponse, AuthResponse, LoginRequest, RegisterRequest, UserInfo, MIN_PASSWORD_CHARS,
};
pub use payload::{validate_payload, LoginCredential, PaymentCard};
pub use record::{
    base64_bytes, validate_title, HistoryEntry, Record, RecordId, RecordKind, MAX_TITLE_CHARS,
};
pub use sync::{Conflict, ConflictReason, SyncRequest, SyncResponse};
