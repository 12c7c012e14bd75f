use std::path::PathBuf;
use std::time::Duration;

use keeper_core::auth::TokenSigner;
use keeper_core::models::LoginCredential;
use keeper_core::{ConflictReason, Record, RecordKind};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::commands::common::{
    build_payload, format_relative_time, open_vault, parse_fields, patch_payload,
    payload_summary, preview, resolve_record, resolve_record_id,
};
use crate::commands::{
    format_sync_lines, run_add, run_delete, run_edit, run_list, run_logout, run_sync, EditArgs,
};
use crate::config::ClientConfig;
use crate::error::CliError;
use crate::session::SessionStore;

fn test_config(dir: &TempDir, encryption_key: Option<&str>) -> ClientConfig {
    ClientConfig {
        server_url: "http://127.0.0.1:9".to_string(),
        config_dir: dir.path().to_path_buf(),
        encryption_key: encryption_key.map(ToString::to_string),
        sync_timeout: Duration::from_secs(1),
    }
}

fn token_for(user_id: &str, ttl: Duration) -> String {
    let signer = TokenSigner::new(b"cli-test-secret", ttl).unwrap();
    signer.issue(user_id, "alice").unwrap().0
}

fn logged_in(encryption_key: Option<&str>) -> (TempDir, ClientConfig) {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, encryption_key);
    config
        .session_store()
        .save(&token_for("user-1", Duration::from_secs(3600)))
        .unwrap();
    (dir, config)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

async fn only_record(config: &ClientConfig) -> Record {
    let (_, vault) = open_vault(config).await.unwrap();
    let mut records = vault.list().await.unwrap();
    assert_eq!(records.len(), 1);
    records.remove(0)
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn preview_truncates_with_ellipsis() {
    assert_eq!(
        preview("This is a very long sentence that should be shortened", 20),
        "This is a very lo..."
    );
    assert_eq!(preview("first line\nsecond", 40), "first line");
}

#[test]
fn parse_fields_requires_key_value_pairs() {
    let fields = parse_fields(&strings(&["Login=alice", "password = s3cret=x"])).unwrap();
    assert_eq!(
        fields,
        vec![
            ("login".to_string(), "alice".to_string()),
            ("password".to_string(), "s3cret=x".to_string()),
        ]
    );

    let err = parse_fields(&strings(&["alice"])).unwrap_err();
    assert!(matches!(err, CliError::InvalidField(_)));
}

#[test]
fn build_login_payload_from_fields() {
    let payload = build_payload(
        RecordKind::LoginCredential,
        &strings(&["user=alice", "pass=s3cret", "url=example.com"]),
        None,
    )
    .unwrap();
    let login: LoginCredential = serde_json::from_slice(&payload).unwrap();
    assert_eq!(login.login, "alice");
    assert_eq!(login.password, "s3cret");
    assert_eq!(login.website.as_deref(), Some("example.com"));
    assert_eq!(login.notes, None);
}

#[test]
fn build_payload_rejects_unknown_fields_and_misplaced_files() {
    let err = build_payload(RecordKind::PaymentCard, &strings(&["pin=1234"]), None).unwrap_err();
    assert!(err.to_string().contains("unknown card field `pin`"));

    let file = PathBuf::from("/tmp/whatever.bin");
    let err = build_payload(RecordKind::FreeText, &strings(&["hi"]), Some(&file)).unwrap_err();
    assert!(matches!(err, CliError::InvalidField(_)));

    let err = build_payload(RecordKind::BinaryBlob, &[], None).unwrap_err();
    assert!(err.to_string().contains("--file"));
}

#[test]
fn build_binary_payload_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blob.bin");
    std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();

    let payload = build_payload(RecordKind::BinaryBlob, &[], Some(&path)).unwrap();
    assert_eq!(payload, vec![0u8, 159, 146, 150]);
}

#[test]
fn patch_payload_keeps_untouched_login_fields() {
    let payload =
        build_payload(RecordKind::LoginCredential, &strings(&["login=alice", "password=old"]), None)
            .unwrap();
    let record = Record::new("user-1", RecordKind::LoginCredential, "mail", payload, "");

    let patched = patch_payload(&record, &strings(&["password=new"]), None)
        .unwrap()
        .unwrap();
    let login: LoginCredential = serde_json::from_slice(&patched).unwrap();
    assert_eq!(login.login, "alice");
    assert_eq!(login.password, "new");

    assert_eq!(patch_payload(&record, &[], None).unwrap(), None);
}

#[test]
fn payload_summary_hides_secrets() {
    let login = build_payload(
        RecordKind::LoginCredential,
        &strings(&["login=alice", "password=s3cret", "website=example.com"]),
        None,
    )
    .unwrap();
    let record = Record::new("u", RecordKind::LoginCredential, "mail", login, "");
    let summary = payload_summary(&record);
    assert_eq!(summary, "alice @ example.com");
    assert!(!summary.contains("s3cret"));

    let card = build_payload(
        RecordKind::PaymentCard,
        &strings(&["number=4111 1111 1111 4242", "expiry=12/29", "cvv=123", "holder=A B"]),
        None,
    )
    .unwrap();
    let record = Record::new("u", RecordKind::PaymentCard, "visa", card, "");
    assert_eq!(payload_summary(&record), "**** 4242");
}

#[test]
fn session_round_trips_per_config_dir() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());
    let token = token_for("user-42", Duration::from_secs(600));

    let saved = store.save(&token).unwrap();
    assert_eq!(saved.user_id(), "user-42");

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.token, token);
    assert_eq!(loaded.claims.username, "alice");

    let other = TempDir::new().unwrap();
    assert!(SessionStore::new(other.path()).load().unwrap().is_none());

    let debug = format!("{loaded:?}");
    assert!(!debug.contains(&token));
}

#[test]
fn expired_or_missing_session_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());
    assert!(matches!(store.require(), Err(CliError::NotLoggedIn)));

    store.save(&token_for("user-1", Duration::ZERO)).unwrap();
    assert!(matches!(store.require(), Err(CliError::SessionExpired)));
}

#[test]
fn malformed_token_is_refused() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());
    let err = store.save("not-a-token").unwrap_err();
    assert!(matches!(err, CliError::Core(keeper_core::Error::Unauthorized(_))));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn logout_removes_session() {
    let (_dir, config) = logged_in(None);
    let store = config.session_store();
    run_logout(&config).unwrap();
    assert!(store.load().unwrap().is_none());
    assert!(!store.clear().unwrap());
    run_logout(&config).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_require_login() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, Some("passphrase"));

    let err = run_list(&config, false, false).await.unwrap_err();
    assert!(matches!(err, CliError::NotLoggedIn));

    let err = run_sync(&config).await.unwrap_err();
    assert!(matches!(err, CliError::NotLoggedIn));
}

#[tokio::test(flavor = "multi_thread")]
async fn add_edit_delete_flow() {
    let (_dir, config) = logged_in(None);

    run_add(
        &config,
        RecordKind::LoginCredential,
        "  Mail  ",
        "work",
        None,
        &strings(&["login=alice", "password=s3cret"]),
    )
    .await
    .unwrap();

    let record = only_record(&config).await;
    assert_eq!(record.title, "Mail");
    assert_eq!(record.owner_id, "user-1");
    assert_eq!(record.version, 1);

    let prefix = record.id.to_string().chars().take(8).collect::<String>();
    run_edit(
        &config,
        &prefix,
        EditArgs {
            fields: strings(&["password=n3w"]),
            ..EditArgs::default()
        },
    )
    .await
    .unwrap();

    let edited = only_record(&config).await;
    assert_eq!(edited.version, 2);
    let login: LoginCredential = serde_json::from_slice(&edited.payload).unwrap();
    assert_eq!(login.password, "n3w");

    let (_, vault) = open_vault(&config).await.unwrap();
    assert_eq!(vault.history(&record.id).await.unwrap().len(), 2);

    run_delete(&config, &record.id.to_string()).await.unwrap();
    let err = resolve_record(&record.id.to_string(), &vault).await.unwrap_err();
    assert!(matches!(err, CliError::RecordNotFound(_)));
    assert!(vault.list().await.unwrap().is_empty());

    let tombstone = resolve_record_id(&prefix, &vault).await.unwrap();
    assert_eq!(tombstone, record.id);
    assert_eq!(vault.history(&tombstone).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn add_rejects_invalid_payload_without_saving() {
    let (_dir, config) = logged_in(None);

    let err = run_add(
        &config,
        RecordKind::LoginCredential,
        "Mail",
        "",
        None,
        &strings(&["login=alice"]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CliError::Core(keeper_core::Error::Validation(_))));

    let (_, vault) = open_vault(&config).await.unwrap();
    assert!(vault.list().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_without_changes_is_an_error() {
    let (_dir, config) = logged_in(None);
    run_add(&config, RecordKind::FreeText, "note", "", None, &strings(&["hello"]))
        .await
        .unwrap();
    let record = only_record(&config).await;

    let err = run_edit(&config, &record.id.to_string(), EditArgs::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::EmptyEdit));
    assert_eq!(only_record(&config).await.version, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn ambiguous_prefix_lists_candidates() {
    let (_dir, config) = logged_in(None);
    for title in ["one", "two"] {
        run_add(&config, RecordKind::FreeText, title, "", None, &strings(&["body"]))
            .await
            .unwrap();
    }

    let (_, vault) = open_vault(&config).await.unwrap();
    let records = vault.list().await.unwrap();
    let prefix = records[0].id.to_string().chars().take(3).collect::<String>();

    let err = resolve_record(&prefix, &vault).await.unwrap_err();
    let CliError::AmbiguousRecordId(message) = err else {
        panic!("expected ambiguity, got {err:?}");
    };
    assert!(message.contains(&prefix));

    let err = resolve_record("zzzz", &vault).await.unwrap_err();
    assert!(matches!(err, CliError::RecordNotFound(_)));

    let err = resolve_record("   ", &vault).await.unwrap_err();
    assert!(matches!(err, CliError::EmptyRecordId));
}

#[tokio::test(flavor = "multi_thread")]
async fn records_are_scoped_to_the_logged_in_user() {
    let (_dir, config) = logged_in(None);
    run_add(&config, RecordKind::FreeText, "mine", "", None, &strings(&["secret"]))
        .await
        .unwrap();
    let record = only_record(&config).await;

    config
        .session_store()
        .save(&token_for("user-2", Duration::from_secs(3600)))
        .unwrap();
    let (_, vault) = open_vault(&config).await.unwrap();
    assert!(vault.list().await.unwrap().is_empty());
    let err = resolve_record(&record.id.to_string(), &vault).await.unwrap_err();
    assert!(matches!(err, CliError::RecordNotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_needs_an_encryption_key() {
    let (_dir, config) = logged_in(None);
    let err = run_sync(&config).await.unwrap_err();
    assert!(matches!(err, CliError::MissingEncryptionKey));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_sync_leaves_watermark_alone() {
    let (_dir, config) = logged_in(Some("correct horse battery staple"));
    run_add(&config, RecordKind::FreeText, "note", "", None, &strings(&["hello"]))
        .await
        .unwrap();

    let err = run_sync(&config).await.unwrap_err();
    assert!(matches!(
        err,
        CliError::Core(keeper_core::Error::Transport(_) | keeper_core::Error::Timeout(_))
    ));

    let (_, vault) = open_vault(&config).await.unwrap();
    let record = only_record(&config).await;
    assert_eq!(record.last_sync_watermark, chrono::DateTime::UNIX_EPOCH);
    assert_eq!(vault.owner_id(), "user-1");
}

#[test]
fn sync_summary_lists_conflicts() {
    let local = Record::new("u", RecordKind::FreeText, "shopping list", b"milk".to_vec(), "");
    let mut server = local.clone();
    server.version = 4;
    let outcome = keeper_core::sync::SyncOutcome {
        sent: 2,
        applied: 1,
        skipped: 1,
        conflicts: vec![keeper_core::Conflict {
            local,
            server,
            reason: ConflictReason::ServerNewerByVersion,
        }],
        new_watermark: keeper_core::util::now(),
    };

    let lines = format_sync_lines(&outcome);
    assert_eq!(lines[0], "Sync completed: sent 2, received 1, kept local 1");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("server newer by version"));
    assert!(lines[1].contains("(local v1, server v4)"));
}
