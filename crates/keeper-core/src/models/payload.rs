//! Payload sub-schemas, one per record kind

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::RecordKind;

static EXPIRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0[1-9]|1[0-2])/\d{2}(\d{2})?$").expect("Invalid regex"));

/// Payload of a `login_credential` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredential {
    pub login: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Payload of a `payment_card` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCard {
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
    pub cardholder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LoginCredential {
    fn validate(&self) -> Result<()> {
        require("login", &self.login)?;
        require("password", &self.password)
    }
}

impl PaymentCard {
    fn validate(&self) -> Result<()> {
        require("card_number", &self.card_number)?;
        require("expiry_date", &self.expiry_date)?;
        require("cvv", &self.cvv)?;
        require("cardholder", &self.cardholder)?;

        let digits: String = self
            .card_number
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '-'))
            .collect();
        if !(12..=19).contains(&digits.len()) || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(Error::validation("card_number must contain 12 to 19 digits"));
        }
        if !EXPIRY_RE.is_match(self.expiry_date.trim()) {
            return Err(Error::validation("expiry_date must look like MM/YY"));
        }
        let cvv = self.cvv.trim();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(Error::validation("cvv must be 3 or 4 digits"));
        }
        Ok(())
    }

    /// Card number with everything but the last four digits hidden.
    #[must_use]
    pub fn masked_number(&self) -> String {
        let digits: Vec<char> = self
            .card_number
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        format!("**** {tail}")
    }
}

/// Check that `payload` is well-formed plaintext for `kind`.
pub fn validate_payload(kind: RecordKind, payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::validation(format!("{kind} payload must not be empty")));
    }

    match kind {
        RecordKind::LoginCredential => parse::<LoginCredential>(kind, payload)?.validate(),
        RecordKind::PaymentCard => parse::<PaymentCard>(kind, payload)?.validate(),
        RecordKind::FreeText => {
            let text = std::str::from_utf8(payload)
                .map_err(|_| Error::validation("free_text payload must be UTF-8"))?;
            require("text", text)
        }
        RecordKind::BinaryBlob => Ok(()),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: RecordKind, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|error| Error::validation(format!("malformed {kind} payload: {error}")))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}
