//! Client/server record synchronization
//!
//! One round: the client sends every record it changed since its watermark,
//! the server merges them with timestamp/version tie-breaking and answers
//! with its own changes since that watermark, a new watermark, and any
//! conflicts it refused to apply.

mod coordinator;
mod handler;

#[cfg(test)]
mod tests;

pub use coordinator::{SyncCoordinator, SyncOutcome, DEFAULT_SYNC_TIMEOUT};
pub use handler::SyncHandler;

use crate::error::Result;
use crate::models::{SyncRequest, SyncResponse};

/// Carries one sync request to the server and returns its answer.
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse>;
}
