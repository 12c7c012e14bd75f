//! Server side of a sync round.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::crypto::Cipher;
use crate::db::RecordStore;
use crate::error::{Error, Result};
use crate::models::{Conflict, ConflictReason, Record, RecordId, SyncResponse};
use crate::util;

enum MergeOutcome {
    Applied,
    Conflict(Box<Conflict>),
    Unchanged,
}

/// Merges client batches into the authoritative store.
///
/// Each change is saved in its own transaction; a batch is not atomic, and a
/// failure part-way leaves earlier changes committed ([`Error::PartialMerge`]).
/// There is no per-owner lock, so two concurrent merges for the same owner
/// can interleave their read-compare-write steps and lose an update.
pub struct SyncHandler<S, C> {
    store: S,
    at_rest: C,
}

impl<S, C> SyncHandler<S, C>
where
    S: RecordStore,
    C: Cipher,
{
    /// `at_rest` wraps incoming payloads before they are stored and is peeled
    /// off again before anything is returned.
    pub const fn new(store: S, at_rest: C) -> Self {
        Self { store, at_rest }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn cipher(&self) -> &C {
        &self.at_rest
    }

    pub async fn merge(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
        changes: Vec<Record>,
    ) -> Result<SyncResponse> {
        // Taken before anything is applied: changes from this batch are not
        // echoed back in the same round.
        let snapshot = self.store.list_since(owner_id, since).await?;

        let incoming = changes.len();
        let mut applied: Vec<RecordId> = Vec::new();
        let mut conflicts = Vec::new();

        for change in changes {
            let id = change.id;
            match self.merge_one(owner_id, change).await {
                Ok(MergeOutcome::Applied) => applied.push(id),
                Ok(MergeOutcome::Conflict(conflict)) => conflicts.push(*conflict),
                Ok(MergeOutcome::Unchanged) => {}
                Err(source) => {
                    tracing::warn!(owner = owner_id, record = %id, error = %source, "Merge aborted");
                    if applied.is_empty() {
                        return Err(source);
                    }
                    return Err(Error::PartialMerge {
                        applied,
                        source: Box::new(source),
                    });
                }
            }
        }

        let changes = snapshot
            .into_iter()
            .map(|record| self.outbound(record))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            owner = owner_id,
            incoming,
            applied = applied.len(),
            conflicts = conflicts.len(),
            outgoing = changes.len(),
            "Merged sync batch"
        );

        Ok(SyncResponse {
            changes,
            new_watermark: util::now(),
            conflicts,
        })
    }

    async fn merge_one(&self, owner_id: &str, mut change: Record) -> Result<MergeOutcome> {
        change.owner_id = owner_id.to_string();
        change.validate_title()?;

        let existing = match self.store.get(&change.id).await {
            Ok(record) => Some(record),
            Err(Error::NotFound(_)) => None,
            Err(error) => return Err(error),
        };
        if let Some(existing) = &existing {
            if existing.owner_id != owner_id {
                return Err(Error::unauthorized(format!(
                    "record {} belongs to another owner",
                    change.id
                )));
            }
        }

        let stored = change.with_payload(self.at_rest.encrypt(&change.payload)?);

        let Some(existing) = existing else {
            self.store.save(&stored).await?;
            return Ok(MergeOutcome::Applied);
        };

        let reason = match change.updated_at.cmp(&existing.updated_at) {
            Ordering::Greater => None,
            Ordering::Less => Some(ConflictReason::ServerNewerByTimestamp),
            Ordering::Equal => match change.version.cmp(&existing.version) {
                Ordering::Greater => None,
                Ordering::Less => Some(ConflictReason::ServerNewerByVersion),
                Ordering::Equal => {
                    // Same instant, same version: nothing is written and no
                    // conflict is reported.
                    tracing::debug!(record = %change.id, version = change.version, "Identical change ignored");
                    return Ok(MergeOutcome::Unchanged);
                }
            },
        };

        match reason {
            None => {
                self.store.save(&stored).await?;
                Ok(MergeOutcome::Applied)
            }
            Some(reason) => {
                tracing::debug!(record = %change.id, %reason, "Conflict detected");
                Ok(MergeOutcome::Conflict(Box::new(Conflict {
                    local: change,
                    server: self.outbound(existing)?,
                    reason,
                })))
            }
        }
    }

    fn outbound(&self, record: Record) -> Result<Record> {
        let payload = self.at_rest.decrypt(&record.payload)?;
        Ok(record.with_payload(payload))
    }
}
