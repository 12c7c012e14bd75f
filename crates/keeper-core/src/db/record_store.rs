//! Versioned record store with bounded history

use std::sync::Arc;

use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};
use tokio::sync::Mutex;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{HistoryEntry, Record, RecordId};
use crate::util;

/// History entries kept per record.
pub const HISTORY_LIMIT: i64 = 10;

const RECORD_COLUMNS: &str = "id, owner_id, kind, title, payload, metadata, version, \
     created_at, updated_at, last_sync_watermark, is_deleted";

const HISTORY_COLUMNS: &str = "record_id, owner_id, kind, title, payload, metadata, version, \
     created_at, updated_at, last_sync_watermark, is_deleted";

/// Storage contract shared by the client cache and the server store.
///
/// The store never computes versions: callers pass the version they want
/// persisted (1 for new records, the previous version + 1 for edits, the
/// winning version during a merge).
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Insert or overwrite a record, append its history entry and prune
    /// history, all in one transaction.
    async fn save(&self, record: &Record) -> Result<Record>;

    /// Current state of a record, tombstones included.
    async fn get(&self, id: &RecordId) -> Result<Record>;

    /// Live records for an owner, newest `updated_at` first.
    async fn list(&self, owner_id: &str) -> Result<Vec<Record>>;

    /// Every record (tombstones included) updated strictly after `since`.
    async fn list_since(&self, owner_id: &str, since: DateTime<Utc>) -> Result<Vec<Record>>;

    /// Mark a record deleted. Does not write a history entry.
    async fn soft_delete(&self, id: &RecordId) -> Result<()>;

    /// History entries, newest version first. Versions may have gaps.
    async fn history(&self, id: &RecordId) -> Result<Vec<HistoryEntry>>;

    /// The owner's sync cursor, or the Unix epoch when it has no records.
    async fn watermark(&self, owner_id: &str) -> Result<DateTime<Utc>>;

    /// Move the owner's sync cursor on every one of its records.
    async fn advance_watermark(&self, owner_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Remember that the server holds `version` of a record whose copy was
    /// not pulled. Never lowers the stored value and leaves `updated_at` alone.
    async fn note_server_version(&self, id: &RecordId, version: i64) -> Result<()>;

    /// Highest version the server reported through
    /// [`note_server_version`](Self::note_server_version), 0 if none.
    async fn server_version(&self, id: &RecordId) -> Result<i64>;
}

/// libSQL implementation of `RecordStore`
#[derive(Clone)]
pub struct LibSqlRecordStore {
    db: Arc<Mutex<Database>>,
}

impl LibSqlRecordStore {
    pub fn new(db: Database) -> Self {
        Self::from_shared(Arc::new(Mutex::new(db)))
    }

    /// Share a database with other repositories.
    pub const fn from_shared(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Store over a fresh in-memory database (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Ids of the owner's records starting with `prefix`, at most `limit`.
    pub async fn find_ids_by_prefix(
        &self,
        owner_id: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let pattern = format!("{}%", prefix.replace(['%', '_'], ""));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = db
            .connection()
            .query(
                "SELECT id FROM records WHERE owner_id = ?1 AND id LIKE ?2 ORDER BY id LIMIT ?3",
                params![owner_id, pattern, limit],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    async fn save_in_transaction(conn: &Connection, record: &Record) -> Result<Record> {
        let now = util::now();
        let id = record.id.as_str();

        let mut rows = conn
            .query(
                "SELECT owner_id, created_at, last_sync_watermark FROM records WHERE id = ?1",
                params![id.clone()],
            )
            .await?;
        let existing = match rows.next().await? {
            Some(row) => Some((
                row.get::<String>(0)?,
                row.get::<i64>(1)?,
                row.get::<i64>(2)?,
            )),
            None => None,
        };
        drop(rows);

        let saved = if let Some((owner_id, created_at, watermark)) = existing {
            conn.execute(
                "UPDATE records
                 SET kind = ?1, title = ?2, payload = ?3, metadata = ?4, version = ?5,
                     updated_at = ?6, is_deleted = ?7
                 WHERE id = ?8",
                params![
                    record.kind.as_str(),
                    record.title.clone(),
                    record.payload.clone(),
                    record.metadata.clone(),
                    record.version,
                    util::to_micros(&now),
                    i64::from(record.is_deleted),
                    id.clone()
                ],
            )
            .await?;

            Record {
                owner_id,
                created_at: util::from_micros(created_at),
                updated_at: now,
                last_sync_watermark: util::from_micros(watermark),
                ..record.clone()
            }
        } else {
            let watermark = Self::owner_watermark(conn, &record.owner_id).await?;
            conn.execute(
                "INSERT INTO records (id, owner_id, kind, title, payload, metadata, version,
                                      created_at, updated_at, last_sync_watermark, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10)",
                params![
                    id.clone(),
                    record.owner_id.clone(),
                    record.kind.as_str(),
                    record.title.clone(),
                    record.payload.clone(),
                    record.metadata.clone(),
                    record.version,
                    util::to_micros(&now),
                    watermark,
                    i64::from(record.is_deleted)
                ],
            )
            .await?;

            Record {
                created_at: now,
                updated_at: now,
                last_sync_watermark: util::from_micros(watermark),
                ..record.clone()
            }
        };

        Self::append_history(conn, &saved).await?;
        Ok(saved)
    }

    async fn append_history(conn: &Connection, record: &Record) -> Result<()> {
        let id = record.id.as_str();
        conn.execute(
            "INSERT OR REPLACE INTO history (record_id, version, owner_id, kind, title, payload,
                                             metadata, created_at, updated_at,
                                             last_sync_watermark, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.clone(),
                record.version,
                record.owner_id.clone(),
                record.kind.as_str(),
                record.title.clone(),
                record.payload.clone(),
                record.metadata.clone(),
                util::to_micros(&record.created_at),
                util::to_micros(&record.updated_at),
                util::to_micros(&record.last_sync_watermark),
                i64::from(record.is_deleted)
            ],
        )
        .await?;

        let pruned = conn
            .execute(
                "DELETE FROM history
                 WHERE record_id = ?1
                   AND version NOT IN (
                       SELECT version FROM history
                       WHERE record_id = ?1
                       ORDER BY version DESC
                       LIMIT ?2
                   )",
                params![id, HISTORY_LIMIT],
            )
            .await?;
        if pruned > 0 {
            tracing::debug!(record = %record.id, pruned, "Pruned history entries");
        }
        Ok(())
    }

    async fn owner_watermark(conn: &Connection, owner_id: &str) -> Result<i64> {
        let mut rows = conn
            .query(
                "SELECT COALESCE(MAX(last_sync_watermark), 0) FROM records WHERE owner_id = ?1",
                params![owner_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        let mut rows = db.connection().query(sql, params).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record(&row)?);
        }
        Ok(records)
    }
}

impl RecordStore for LibSqlRecordStore {
    async fn save(&self, record: &Record) -> Result<Record> {
        if record.version < 1 {
            return Err(Error::validation(format!(
                "version must be positive, got {}",
                record.version
            )));
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let saved = match Self::save_in_transaction(conn, record).await {
            Ok(saved) => saved,
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
        };
        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        Ok(saved)
    }

    async fn get(&self, id: &RecordId) -> Result<Record> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1");
        self.query_records(&sql, params![id.as_str()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("record {id}")))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE owner_id = ?1 AND is_deleted = 0
             ORDER BY updated_at DESC, id DESC"
        );
        self.query_records(&sql, params![owner_id]).await
    }

    async fn list_since(&self, owner_id: &str, since: DateTime<Utc>) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE owner_id = ?1 AND updated_at > ?2
             ORDER BY updated_at DESC, id DESC"
        );
        self.query_records(&sql, params![owner_id, util::to_micros(&since)])
            .await
    }

    async fn soft_delete(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        // A tombstone must not go out below a version the server already has.
        let changed = db
            .connection()
            .execute(
                "UPDATE records
                 SET is_deleted = 1, updated_at = ?1,
                     version = CASE WHEN server_version >= version
                                    THEN server_version + 1 ELSE version END
                 WHERE id = ?2 AND is_deleted = 0",
                params![util::to_micros(&util::now()), id.as_str()],
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    async fn history(&self, id: &RecordId) -> Result<Vec<HistoryEntry>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE record_id = ?1 ORDER BY version DESC"
        );
        let mut rows = db.connection().query(&sql, params![id.as_str()]).await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(HistoryEntry::from_record(&parse_record(&row)?));
        }
        Ok(entries)
    }

    async fn watermark(&self, owner_id: &str) -> Result<DateTime<Utc>> {
        let db = self.db.lock().await;
        let micros = Self::owner_watermark(db.connection(), owner_id).await?;
        Ok(util::from_micros(micros))
    }

    async fn advance_watermark(&self, owner_id: &str, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        let updated = db
            .connection()
            .execute(
                "UPDATE records SET last_sync_watermark = ?1 WHERE owner_id = ?2",
                params![util::to_micros(&at), owner_id],
            )
            .await?;
        tracing::debug!(owner = owner_id, updated, watermark = %at, "Advanced sync watermark");
        Ok(())
    }

    async fn note_server_version(&self, id: &RecordId, version: i64) -> Result<()> {
        let db = self.db.lock().await;
        let changed = db
            .connection()
            .execute(
                "UPDATE records SET server_version = MAX(server_version, ?1) WHERE id = ?2",
                params![version, id.as_str()],
            )
            .await?;
        if changed == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    async fn server_version(&self, id: &RecordId) -> Result<i64> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT server_version FROM records WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Err(Error::NotFound(format!("record {id}"))),
        }
    }
}

/// Parse a row selected with `RECORD_COLUMNS` or `HISTORY_COLUMNS`.
fn parse_record(row: &Row) -> Result<Record> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    Ok(Record {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid record id `{id}`")))?,
        owner_id: row.get(1)?,
        kind: kind
            .parse()
            .map_err(|_| Error::Database(format!("invalid record kind `{kind}`")))?,
        title: row.get(3)?,
        payload: row.get(4)?,
        metadata: row.get(5)?,
        version: row.get(6)?,
        created_at: util::from_micros(row.get(7)?),
        updated_at: util::from_micros(row.get(8)?),
        last_sync_watermark: util::from_micros(row.get(9)?),
        is_deleted: row.get::<i64>(10)? != 0,
    })
}
