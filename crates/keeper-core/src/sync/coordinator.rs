//! Client side of a sync round.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::SyncTransport;
use crate::crypto::Cipher;
use crate::db::RecordStore;
use crate::error::{Error, Result};
use crate::models::{Conflict, Record, RecordId, SyncRequest};

pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// What one round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Local changes sent to the server
    pub sent: usize,
    /// Server changes saved locally
    pub applied: usize,
    /// Server changes left alone because they conflicted with ours
    pub skipped: usize,
    /// Refused changes, payloads decrypted where possible
    pub conflicts: Vec<Conflict>,
    pub new_watermark: DateTime<Utc>,
}

/// Drives sync rounds for one owner.
pub struct SyncCoordinator<S, C, T> {
    store: S,
    cipher: C,
    transport: T,
    owner_id: String,
    timeout: Duration,
}

impl<S, C, T> SyncCoordinator<S, C, T>
where
    S: RecordStore,
    C: Cipher,
    T: SyncTransport,
{
    pub fn new(store: S, cipher: C, transport: T, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            cipher,
            transport,
            owner_id: owner_id.into(),
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Run one round.
    ///
    /// The watermark only moves when the server answered. Server changes for
    /// records that came back as conflicts are not applied, so the local copy
    /// survives until the user edits it again. The server's version is noted
    /// so that edit lands above it.
    ///
    /// Records saved here get a fresh local `updated_at`, so they are sent
    /// back once on the following round; the server accepts them as newer.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let since = self.store.watermark(&self.owner_id).await?;
        let pending = self.store.list_since(&self.owner_id, since).await?;

        let changes = pending
            .iter()
            .map(|record| Ok(record.with_payload(self.cipher.encrypt(&record.payload)?)))
            .collect::<Result<Vec<Record>>>()?;
        let request = SyncRequest { since, changes };
        tracing::info!(
            owner = %self.owner_id,
            since = %since,
            outgoing = request.changes.len(),
            "Starting sync round"
        );

        let response = tokio::time::timeout(self.timeout, self.transport.exchange(&request))
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let conflicted: HashSet<RecordId> = response
            .conflicts
            .iter()
            .map(|conflict| conflict.local.id)
            .collect();

        let mut applied = 0;
        let mut skipped = 0;
        for change in &response.changes {
            if conflicted.contains(&change.id) {
                tracing::warn!(record = %change.id, "Skipping server change that conflicts with a local edit");
                skipped += 1;
                continue;
            }

            let mut incoming = change.with_payload(self.cipher.decrypt(&change.payload)?);
            incoming.owner_id.clone_from(&self.owner_id);
            self.store.save(&incoming).await?;
            applied += 1;
        }

        for conflict in &response.conflicts {
            self.store
                .note_server_version(&conflict.local.id, conflict.server.version)
                .await?;
        }

        self.store
            .advance_watermark(&self.owner_id, response.new_watermark)
            .await?;

        let conflicts = response
            .conflicts
            .into_iter()
            .map(|conflict| self.readable_conflict(conflict))
            .collect::<Vec<_>>();
        for conflict in &conflicts {
            tracing::warn!(
                record = %conflict.local.id,
                reason = %conflict.reason,
                "Server kept its copy"
            );
        }

        tracing::info!(
            owner = %self.owner_id,
            sent = request.changes.len(),
            applied,
            skipped,
            conflicts = conflicts.len(),
            "Sync round complete"
        );

        Ok(SyncOutcome {
            sent: request.changes.len(),
            applied,
            skipped,
            conflicts,
            new_watermark: response.new_watermark,
        })
    }

    fn readable_conflict(&self, conflict: Conflict) -> Conflict {
        Conflict {
            local: self.decrypt_for_display(conflict.local),
            server: self.decrypt_for_display(conflict.server),
            reason: conflict.reason,
        }
    }

    fn decrypt_for_display(&self, record: Record) -> Record {
        match self.cipher.decrypt(&record.payload) {
            Ok(plaintext) => record.with_payload(plaintext),
            Err(error) => {
                tracing::debug!(record = %record.id, %error, "Conflict payload left encrypted");
                record
            }
        }
    }
}
