use std::time::Duration;

use chrono::DateTime;
use pretty_assertions::assert_eq;

use super::*;
use crate::crypto::{AesGcmCipher, Cipher};
use crate::db::{LibSqlRecordStore, RecordStore};
use crate::error::Error;
use crate::models::{ConflictReason, Record, RecordKind, SyncRequest, SyncResponse};
use crate::services::{RecordUpdate, VaultService};
use crate::util;

const OWNER: &str = "alice";

/// Runs the server handler in-process, going through JSON like the real wire.
struct Loopback {
    handler: SyncHandler<LibSqlRecordStore, AesGcmCipher>,
    owner_id: String,
}

impl SyncTransport for Loopback {
    async fn exchange(&self, request: &SyncRequest) -> crate::Result<SyncResponse> {
        let wire: SyncRequest = serde_json::from_str(&serde_json::to_string(request)?)?;
        let response = self
            .handler
            .merge(&self.owner_id, wire.since, wire.changes)
            .await?;
        Ok(serde_json::from_str(&serde_json::to_string(&response)?)?)
    }
}

struct Stalled;

impl SyncTransport for Stalled {
    async fn exchange(&self, _request: &SyncRequest) -> crate::Result<SyncResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(Error::Transport("never answered".to_string()))
    }
}

struct Refused;

impl SyncTransport for Refused {
    async fn exchange(&self, _request: &SyncRequest) -> crate::Result<SyncResponse> {
        Err(Error::Transport("connection refused".to_string()))
    }
}

struct Harness {
    client: LibSqlRecordStore,
    server: LibSqlRecordStore,
    client_cipher: AesGcmCipher,
    server_cipher: AesGcmCipher,
    coordinator: SyncCoordinator<LibSqlRecordStore, AesGcmCipher, Loopback>,
}

impl Harness {
    async fn new() -> Self {
        let client = LibSqlRecordStore::open_in_memory().await.unwrap();
        let server = LibSqlRecordStore::open_in_memory().await.unwrap();
        let client_cipher = AesGcmCipher::from_passphrase("client passphrase").unwrap();
        let server_cipher = AesGcmCipher::from_passphrase("server passphrase").unwrap();

        let transport = Loopback {
            handler: SyncHandler::new(server.clone(), server_cipher.clone()),
            owner_id: OWNER.to_string(),
        };
        let coordinator =
            SyncCoordinator::new(client.clone(), client_cipher.clone(), transport, OWNER);

        Self {
            client,
            server,
            client_cipher,
            server_cipher,
            coordinator,
        }
    }

    fn handler(&self) -> SyncHandler<LibSqlRecordStore, AesGcmCipher> {
        SyncHandler::new(self.server.clone(), self.server_cipher.clone())
    }

    /// A record as the server would hold it after receiving `plaintext` via sync.
    fn server_side(&self, record: &Record, plaintext: &[u8]) -> Record {
        let transit = self.client_cipher.encrypt(plaintext).unwrap();
        record.with_payload(self.server_cipher.encrypt(&transit).unwrap())
    }

    /// Peel both layers off a payload stored on the server.
    fn read_server_payload(&self, record: &Record) -> Vec<u8> {
        let transit = self.server_cipher.decrypt(&record.payload).unwrap();
        self.client_cipher.decrypt(&transit).unwrap()
    }
}

fn text(title: &str, body: &str) -> Record {
    Record::new(OWNER, RecordKind::FreeText, title, body.as_bytes().to_vec(), "")
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_a_unsynced_edits_arrive_as_latest_version() {
    let h = Harness::new().await;
    let mut r1 = h.client.save(&text("r1", "first")).await.unwrap();
    r1.version = 2;
    r1.payload = b"second".to_vec();
    h.client.save(&r1).await.unwrap();

    let outcome = h.coordinator.sync().await.unwrap();
    assert_eq!(outcome.sent, 1);
    assert!(outcome.conflicts.is_empty());

    let on_server = h.server.get(&r1.id).await.unwrap();
    assert_eq!(on_server.version, 2);
    assert_eq!(on_server.owner_id, OWNER);
    assert_eq!(h.read_server_payload(&on_server), b"second");
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_b_newer_client_edit_overwrites_then_settles() {
    let h = Harness::new().await;
    let mut r1 = h.client.save(&text("r1", "v1")).await.unwrap();
    h.coordinator.sync().await.unwrap();
    assert_eq!(h.server.get(&r1.id).await.unwrap().version, 1);

    r1.version = 2;
    r1.payload = b"v2".to_vec();
    h.client.save(&r1).await.unwrap();

    let second = h.coordinator.sync().await.unwrap();
    assert_eq!(second.sent, 1);
    assert!(second.conflicts.is_empty());
    let on_server = h.server.get(&r1.id).await.unwrap();
    assert_eq!(on_server.version, 2);
    assert_eq!(h.read_server_payload(&on_server), b"v2");

    let third = h.coordinator.sync().await.unwrap();
    assert_eq!(third.sent, 0);
    assert_eq!(third.applied, 0);
    assert!(third.conflicts.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_c_stale_client_copy_conflicts_and_nothing_changes() {
    let h = Harness::new().await;
    let r1 = h.client.save(&text("r1", "stale")).await.unwrap();

    let mut newer = h.server_side(&r1, b"server copy");
    newer.version = 3;
    h.server.save(&newer).await.unwrap();

    let outcome = h.coordinator.sync().await.unwrap();
    assert_eq!(outcome.conflicts.len(), 1);
    let conflict = &outcome.conflicts[0];
    assert_eq!(conflict.reason, ConflictReason::ServerNewerByTimestamp);
    assert_eq!(conflict.local.payload, b"stale");
    assert_eq!(conflict.server.payload, b"server copy");
    assert_eq!(conflict.server.version, 3);

    // Server keeps its copy; the client's copy is not overwritten either.
    assert_eq!(h.server.get(&r1.id).await.unwrap().version, 3);
    let local = h.client.get(&r1.id).await.unwrap();
    assert_eq!(local.version, 1);
    assert_eq!(local.payload, b"stale");
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.applied, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn editing_after_a_conflict_lands_above_the_server_version() {
    let h = Harness::new().await;
    let r1 = h.client.save(&text("r1", "stale")).await.unwrap();
    let mut newer = h.server_side(&r1, b"server copy");
    newer.version = 3;
    h.server.save(&newer).await.unwrap();

    let first = h.coordinator.sync().await.unwrap();
    assert_eq!(first.conflicts.len(), 1);
    let second = h.coordinator.sync().await.unwrap();
    assert_eq!(second.sent, 0);
    assert!(second.conflicts.is_empty());

    let vault = VaultService::new(h.client.clone(), OWNER);
    let edited = vault
        .edit(
            &r1.id,
            RecordUpdate {
                payload: Some(b"resolved".to_vec()),
                ..RecordUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.version, 4);

    let third = h.coordinator.sync().await.unwrap();
    assert_eq!(third.sent, 1);
    assert!(third.conflicts.is_empty());

    let on_server = h.server.get(&r1.id).await.unwrap();
    assert_eq!(on_server.version, 4);
    assert_eq!(h.read_server_payload(&on_server), b"resolved");
    let versions: Vec<i64> = h
        .server
        .history(&r1.id)
        .await
        .unwrap()
        .iter()
        .map(|entry| entry.version)
        .collect();
    assert_eq!(versions, vec![4, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_after_a_conflict_lands_above_the_server_version() {
    let h = Harness::new().await;
    let r1 = h.client.save(&text("r1", "stale")).await.unwrap();
    let mut newer = h.server_side(&r1, b"server copy");
    newer.version = 3;
    h.server.save(&newer).await.unwrap();
    h.coordinator.sync().await.unwrap();

    h.client.soft_delete(&r1.id).await.unwrap();
    let outcome = h.coordinator.sync().await.unwrap();
    assert!(outcome.conflicts.is_empty());

    let on_server = h.server.get(&r1.id).await.unwrap();
    assert!(on_server.is_deleted);
    assert_eq!(on_server.version, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn consecutive_syncs_are_idempotent() {
    let h = Harness::new().await;
    let remote = text("from another device", "");
    h.server
        .save(&h.server_side(&remote, b"remote secret"))
        .await
        .unwrap();
    h.client.save(&text("local", "local secret")).await.unwrap();

    let first = h.coordinator.sync().await.unwrap();
    assert_eq!(first.sent, 1);
    assert_eq!(first.applied, 1);
    assert_eq!(
        h.client.get(&remote.id).await.unwrap().payload,
        b"remote secret"
    );

    // The pulled record goes back once, and the server has nothing new.
    let second = h.coordinator.sync().await.unwrap();
    assert_eq!(second.applied + second.skipped, 0);
    assert!(second.conflicts.is_empty());

    let third = h.coordinator.sync().await.unwrap();
    assert_eq!(third.sent, 0);
    assert_eq!(third.applied + third.skipped, 0);
    assert!(third.conflicts.is_empty());
    assert!(third.new_watermark > second.new_watermark);
}

#[tokio::test(flavor = "multi_thread")]
async fn tombstones_propagate() {
    let h = Harness::new().await;
    let r1 = h.client.save(&text("r1", "bye")).await.unwrap();
    h.coordinator.sync().await.unwrap();

    h.client.soft_delete(&r1.id).await.unwrap();
    let outcome = h.coordinator.sync().await.unwrap();
    assert_eq!(outcome.sent, 1);

    assert!(h.server.get(&r1.id).await.unwrap().is_deleted);
    assert!(h.server.list(OWNER).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn watermark_advances_even_with_conflicts() {
    let h = Harness::new().await;
    let r1 = h.client.save(&text("r1", "old")).await.unwrap();
    let mut newer = h.server_side(&r1, b"new");
    newer.version = 2;
    h.server.save(&newer).await.unwrap();

    let outcome = h.coordinator.sync().await.unwrap();
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(
        h.client.watermark(OWNER).await.unwrap(),
        outcome.new_watermark
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_leaves_watermark_unadvanced() {
    let client = LibSqlRecordStore::open_in_memory().await.unwrap();
    client.save(&text("pending", "x")).await.unwrap();
    let cipher = AesGcmCipher::from_passphrase("k").unwrap();
    let coordinator = SyncCoordinator::new(client.clone(), cipher, Stalled, OWNER)
        .with_timeout(Duration::from_millis(20));

    let err = coordinator.sync().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(
        client.watermark(OWNER).await.unwrap(),
        DateTime::UNIX_EPOCH
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn transport_failure_leaves_watermark_unadvanced() {
    let client = LibSqlRecordStore::open_in_memory().await.unwrap();
    client.save(&text("pending", "x")).await.unwrap();
    let cipher = AesGcmCipher::from_passphrase("k").unwrap();
    let coordinator = SyncCoordinator::new(client.clone(), cipher, Refused, OWNER);

    assert!(matches!(
        coordinator.sync().await.unwrap_err(),
        Error::Transport(_)
    ));
    assert_eq!(
        client.watermark(OWNER).await.unwrap(),
        DateTime::UNIX_EPOCH
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_does_not_echo_changes_from_the_same_batch() {
    let h = Harness::new().await;
    let response = h
        .handler()
        .merge(OWNER, DateTime::UNIX_EPOCH, vec![text("new", "payload")])
        .await
        .unwrap();

    assert!(response.changes.is_empty());
    assert!(response.conflicts.is_empty());
    assert_eq!(h.server.list(OWNER).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_breaks_timestamp_ties_by_version() {
    let h = Harness::new().await;
    let handler = h.handler();
    let existing = h
        .server
        .save(&h.server_side(&text("tied", ""), b"server"))
        .await
        .unwrap();

    let same = existing.with_payload(b"client".to_vec());
    let mut higher = same.clone();
    higher.version = 2;

    // Equal timestamp and version: silently ignored.
    let response = handler
        .merge(OWNER, util::now(), vec![same])
        .await
        .unwrap();
    assert!(response.conflicts.is_empty());
    assert_eq!(h.server.history(&existing.id).await.unwrap().len(), 1);

    // Equal timestamp, higher version: applied.
    handler
        .merge(OWNER, util::now(), vec![higher])
        .await
        .unwrap();
    let applied = h.server.get(&existing.id).await.unwrap();
    assert_eq!(applied.version, 2);

    // Equal timestamp, lower version: refused.
    let mut ahead = h.server_side(&text("ahead", ""), b"server");
    ahead.version = 5;
    let ahead = h.server.save(&ahead).await.unwrap();
    let mut behind = ahead.with_payload(b"client".to_vec());
    behind.version = 4;
    let response = handler
        .merge(OWNER, util::now(), vec![behind])
        .await
        .unwrap();
    assert_eq!(response.conflicts.len(), 1);
    assert_eq!(
        response.conflicts[0].reason,
        ConflictReason::ServerNewerByVersion
    );
    assert_eq!(h.server.get(&ahead.id).await.unwrap().version, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_forces_owner_and_rejects_foreign_records() {
    let h = Harness::new().await;
    let handler = h.handler();

    let mut claimed = text("claimed", "x");
    claimed.owner_id = "mallory".to_string();
    handler
        .merge(OWNER, DateTime::UNIX_EPOCH, vec![claimed.clone()])
        .await
        .unwrap();
    assert_eq!(h.server.get(&claimed.id).await.unwrap().owner_id, OWNER);

    let mut intruder = claimed.clone();
    intruder.version = 2;
    intruder.updated_at = util::now();
    let err = handler
        .merge("bob", DateTime::UNIX_EPOCH, vec![intruder])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(h.server.get(&claimed.id).await.unwrap().version, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_failure_keeps_earlier_changes() {
    let h = Harness::new().await;
    let good = text("good", "x");
    let bad = text(&"t".repeat(300), "y");

    let err = h
        .handler()
        .merge(OWNER, DateTime::UNIX_EPOCH, vec![good.clone(), bad.clone()])
        .await
        .unwrap_err();

    match &err {
        Error::PartialMerge { applied, source } => {
            assert_eq!(applied, &vec![good.id]);
            assert!(matches!(**source, Error::Validation(_)));
        }
        other => panic!("expected partial merge, got {other:?}"),
    }
    assert!(matches!(err.root(), Error::Validation(_)));
    assert!(h.server.get(&good.id).await.is_ok());
    assert!(h.server.get(&bad.id).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_returns_server_changes_in_transit_form() {
    let h = Harness::new().await;
    let remote = h
        .server
        .save(&h.server_side(&text("remote", ""), b"hello"))
        .await
        .unwrap();

    let response = h
        .handler()
        .merge(OWNER, DateTime::UNIX_EPOCH, Vec::new())
        .await
        .unwrap();
    assert_eq!(response.changes.len(), 1);
    assert_eq!(response.changes[0].id, remote.id);
    // One layer removed: still client ciphertext.
    assert_eq!(
        h.client_cipher.decrypt(&response.changes[0].payload).unwrap(),
        b"hello"
    );
    assert!(response.new_watermark > remote.updated_at);
}
