//! Record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util;

/// Maximum title length, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

/// A unique identifier for a record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Discriminant selecting which sub-schema a payload encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[serde(alias = "login_password")]
    LoginCredential,
    #[serde(alias = "text")]
    FreeText,
    #[serde(alias = "binary")]
    BinaryBlob,
    #[serde(alias = "bank_card")]
    PaymentCard,
}

impl RecordKind {
    pub const ALL: [Self; 4] = [
        Self::LoginCredential,
        Self::FreeText,
        Self::BinaryBlob,
        Self::PaymentCard,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginCredential => "login_credential",
            Self::FreeText => "free_text",
            Self::BinaryBlob => "binary_blob",
            Self::PaymentCard => "payment_card",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "login_credential" | "login_password" | "login" => Ok(Self::LoginCredential),
            "free_text" | "text" => Ok(Self::FreeText),
            "binary_blob" | "binary" => Ok(Self::BinaryBlob),
            "payment_card" | "bank_card" | "card" => Ok(Self::PaymentCard),
            other => Err(Error::validation(format!("unknown record kind `{other}`"))),
        }
    }
}

/// A user-owned secret entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier
    pub id: RecordId,
    /// Identity that exclusively owns this record
    #[serde(default)]
    pub owner_id: String,
    pub kind: RecordKind,
    /// Display label
    pub title: String,
    /// Plaintext locally, ciphertext in transit
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: String,
    /// Starts at 1, +1 per mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owner-wide sync cursor, stored on every row
    #[serde(default)]
    pub last_sync_watermark: DateTime<Utc>,
    /// Tombstone flag
    #[serde(default)]
    pub is_deleted: bool,
}

impl Record {
    /// Create a version-1 record owned by `owner_id`
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        kind: RecordKind,
        title: impl Into<String>,
        payload: Vec<u8>,
        metadata: impl Into<String>,
    ) -> Self {
        let now = util::now();
        Self {
            id: RecordId::new(),
            owner_id: owner_id.into(),
            kind,
            title: title.into(),
            payload,
            metadata: metadata.into(),
            version: 1,
            created_at: now,
            updated_at: now,
            last_sync_watermark: DateTime::UNIX_EPOCH,
            is_deleted: false,
        }
    }

    /// Check the title bounds.
    pub fn validate_title(&self) -> Result<()> {
        validate_title(&self.title)
    }

    /// Check the title and the payload shape for the record's kind.
    ///
    /// Only meaningful on plaintext payloads.
    pub fn validate(&self) -> Result<()> {
        self.validate_title()?;
        super::payload::validate_payload(self.kind, &self.payload)
    }

    /// Copy of this record with the payload replaced.
    #[must_use]
    pub fn with_payload(&self, payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::validation("title must not be empty"));
    }
    let chars = title.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(Error::validation(format!(
            "title is {chars} characters; the limit is {MAX_TITLE_CHARS}"
        )));
    }
    Ok(())
}

/// Immutable snapshot of a record at one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub record_id: RecordId,
    pub version: i64,
    pub owner_id: String,
    pub kind: RecordKind,
    pub title: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_sync_watermark: DateTime<Utc>,
    pub is_deleted: bool,
}

impl HistoryEntry {
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            record_id: record.id,
            version: record.version,
            owner_id: record.owner_id.clone(),
            kind: record.kind,
            title: record.title.clone(),
            payload: record.payload.clone(),
            metadata: record.metadata.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_sync_watermark: record.last_sync_watermark,
            is_deleted: record.is_deleted,
        }
    }
}

/// Serde adapter: bytes as standard base64 text.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
