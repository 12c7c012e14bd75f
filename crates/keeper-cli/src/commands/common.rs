use std::io::{self, IsTerminal, Read};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use keeper_core::crypto::AesGcmCipher;
use keeper_core::db::LibSqlRecordStore;
use keeper_core::models::{LoginCredential, PaymentCard};
use keeper_core::services::VaultService;
use keeper_core::{Record, RecordId, RecordKind};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::CliError;
use crate::session::Session;

pub type Vault = VaultService<LibSqlRecordStore>;

const SHORT_ID_CHARS: usize = 13;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub kind: RecordKind,
    pub title: String,
    pub summary: String,
    pub metadata: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct RecordDetail {
    pub id: String,
    pub kind: RecordKind,
    pub title: String,
    pub metadata: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Open the local vault of the logged-in user.
pub async fn open_vault(config: &ClientConfig) -> Result<(Session, Vault), CliError> {
    let session = config.session_store().require()?;
    let vault = Vault::open_path(config.vault_path(), session.user_id()).await?;
    Ok((session, vault))
}

pub fn client_cipher(config: &ClientConfig) -> Result<AesGcmCipher, CliError> {
    let key = config
        .encryption_key
        .as_deref()
        .ok_or(CliError::MissingEncryptionKey)?;
    Ok(AesGcmCipher::from_passphrase(key)?)
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a live record by full id or unique id prefix.
pub async fn resolve_record(query: &str, vault: &Vault) -> Result<Record, CliError> {
    let id = resolve_record_id(query, vault).await?;
    vault.get(&id).await.map_err(|error| match error {
        keeper_core::Error::NotFound(_) => CliError::RecordNotFound(query.to_string()),
        other => other.into(),
    })
}

/// Like [`resolve_record`], but tombstoned records resolve too.
pub async fn resolve_record_id(query: &str, vault: &Vault) -> Result<RecordId, CliError> {
    let query = normalize_record_identifier(query)?;
    if let Ok(id) = query.parse::<RecordId>() {
        return Ok(id);
    }

    let matching_ids = vault.find_ids_by_prefix(&query, 3).await?;
    match matching_ids.len() {
        0 => Err(CliError::RecordNotFound(query)),
        1 => matching_ids[0]
            .parse::<RecordId>()
            .map_err(|_| CliError::RecordNotFound(query)),
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_CHARS).collect()
}

/// Split `key=value` arguments. Keys are matched case-insensitively.
pub fn parse_fields(fields: &[String]) -> Result<Vec<(String, String)>, CliError> {
    fields
        .iter()
        .map(|field| {
            let (key, value) = field.split_once('=').ok_or_else(|| {
                CliError::InvalidField(format!("expected key=value, got `{field}`"))
            })?;
            Ok((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Plaintext payload for a new record.
pub fn build_payload(
    kind: RecordKind,
    fields: &[String],
    file: Option<&Path>,
) -> Result<Vec<u8>, CliError> {
    reject_misplaced_file(kind, file)?;
    match kind {
        RecordKind::LoginCredential => {
            let mut login = LoginCredential {
                login: String::new(),
                password: String::new(),
                website: None,
                notes: None,
            };
            apply_login_fields(&mut login, &parse_fields(fields)?)?;
            Ok(serde_json::to_vec(&login)?)
        }
        RecordKind::PaymentCard => {
            let mut card = PaymentCard {
                card_number: String::new(),
                expiry_date: String::new(),
                cvv: String::new(),
                cardholder: String::new(),
                bank: None,
                notes: None,
            };
            apply_card_fields(&mut card, &parse_fields(fields)?)?;
            Ok(serde_json::to_vec(&card)?)
        }
        RecordKind::FreeText => {
            let text = resolve_text(fields)?.unwrap_or_default();
            Ok(text.into_bytes())
        }
        RecordKind::BinaryBlob => {
            if !fields.is_empty() {
                return Err(CliError::InvalidField(
                    "binary records take their content from --file".to_string(),
                ));
            }
            let path = file.ok_or_else(|| {
                CliError::InvalidField("binary records need --file <PATH>".to_string())
            })?;
            Ok(std::fs::read(path)?)
        }
    }
}

/// Replacement payload for an edit, or `None` when nothing payload-related
/// was given.
///
/// Structured kinds are patched field by field; text and binary are replaced.
pub fn patch_payload(
    record: &Record,
    fields: &[String],
    file: Option<&Path>,
) -> Result<Option<Vec<u8>>, CliError> {
    reject_misplaced_file(record.kind, file)?;
    if fields.is_empty() && file.is_none() {
        return Ok(None);
    }

    let payload = match record.kind {
        RecordKind::LoginCredential => {
            let mut login: LoginCredential = serde_json::from_slice(&record.payload)?;
            apply_login_fields(&mut login, &parse_fields(fields)?)?;
            serde_json::to_vec(&login)?
        }
        RecordKind::PaymentCard => {
            let mut card: PaymentCard = serde_json::from_slice(&record.payload)?;
            apply_card_fields(&mut card, &parse_fields(fields)?)?;
            serde_json::to_vec(&card)?
        }
        RecordKind::FreeText | RecordKind::BinaryBlob => {
            build_payload(record.kind, fields, file)?
        }
    };
    Ok(Some(payload))
}

fn reject_misplaced_file(kind: RecordKind, file: Option<&Path>) -> Result<(), CliError> {
    if file.is_some() && kind != RecordKind::BinaryBlob {
        return Err(CliError::InvalidField(format!(
            "--file only applies to binary records, not {kind}"
        )));
    }
    Ok(())
}

fn apply_login_fields(
    login: &mut LoginCredential,
    fields: &[(String, String)],
) -> Result<(), CliError> {
    for (key, value) in fields {
        match key.as_str() {
            "login" | "username" | "user" => login.login.clone_from(value),
            "password" | "pass" => login.password.clone_from(value),
            "website" | "url" | "site" => login.website = optional(value),
            "notes" | "note" => login.notes = optional(value),
            other => {
                return Err(CliError::InvalidField(format!(
                    "unknown login field `{other}` (expected login, password, website, notes)"
                )))
            }
        }
    }
    Ok(())
}

fn apply_card_fields(card: &mut PaymentCard, fields: &[(String, String)]) -> Result<(), CliError> {
    for (key, value) in fields {
        match key.as_str() {
            "number" | "card_number" => card.card_number.clone_from(value),
            "expiry" | "expiry_date" | "exp" => card.expiry_date.clone_from(value),
            "cvv" | "cvc" => card.cvv.clone_from(value),
            "holder" | "cardholder" | "name" => card.cardholder.clone_from(value),
            "bank" => card.bank = optional(value),
            "notes" | "note" => card.notes = optional(value),
            other => {
                return Err(CliError::InvalidField(format!(
                    "unknown card field `{other}` (expected number, expiry, cvv, holder, bank, notes)"
                )))
            }
        }
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    keeper_core::util::normalize_text_option(Some(value.to_string()))
}

fn resolve_text(parts: &[String]) -> Result<Option<String>, CliError> {
    if let Some(text) = normalize_content(&parts.join(" ")) {
        return Ok(Some(text));
    }
    read_piped_stdin()
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

/// One-line description of a payload that never shows a secret.
pub fn payload_summary(record: &Record) -> String {
    match record.kind {
        RecordKind::LoginCredential => serde_json::from_slice::<LoginCredential>(&record.payload)
            .map_or_else(
                |_| "(unreadable)".to_string(),
                |login| match login.website {
                    Some(website) => format!("{} @ {website}", login.login),
                    None => login.login,
                },
            ),
        RecordKind::PaymentCard => serde_json::from_slice::<PaymentCard>(&record.payload)
            .map_or_else(|_| "(unreadable)".to_string(), |card| card.masked_number()),
        RecordKind::FreeText => preview(&String::from_utf8_lossy(&record.payload), 40),
        RecordKind::BinaryBlob => format!("{} bytes", record.payload.len()),
    }
}

/// Full payload, secrets included, as JSON.
pub fn payload_value(record: &Record) -> serde_json::Value {
    match record.kind {
        RecordKind::LoginCredential | RecordKind::PaymentCard => {
            serde_json::from_slice(&record.payload).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&record.payload).into_owned())
            })
        }
        RecordKind::FreeText => {
            serde_json::Value::String(String::from_utf8_lossy(&record.payload).into_owned())
        }
        RecordKind::BinaryBlob => serde_json::json!({
            "size": record.payload.len(),
            "base64": STANDARD.encode(&record.payload),
        }),
    }
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn record_to_list_item(record: &Record) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    RecordListItem {
        id: record.id.to_string(),
        kind: record.kind,
        title: record.title.clone(),
        summary: payload_summary(record),
        metadata: record.metadata.clone(),
        version: record.version,
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at.timestamp_millis(), now_ms),
    }
}

pub fn record_to_detail(record: &Record) -> RecordDetail {
    RecordDetail {
        id: record.id.to_string(),
        kind: record.kind,
        title: record.title.clone(),
        metadata: record.metadata.clone(),
        version: record.version,
        created_at: record.created_at,
        updated_at: record.updated_at,
        payload: payload_value(record),
    }
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let short_id = short_id(&record.id.to_string());
            let title = preview(&record.title, 30);
            let summary = payload_summary(record);
            let relative_time =
                format_relative_time(record.updated_at.timestamp_millis(), now_ms);
            format!(
                "{short_id:<13}  {:<16}  {title:<30}  {summary:<30}  {relative_time}",
                record.kind.as_str()
            )
        })
        .collect()
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
