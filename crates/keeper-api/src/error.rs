use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    /// A batch failed after some of it was committed.
    #[error("{source} (applied before the failure: {})", applied.len())]
    Partial {
        applied: Vec<String>,
        source: Box<AppError>,
    },
}

/// The failure half of the response envelope.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<PartialData>,
}

#[derive(Debug, Serialize)]
struct PartialData {
    applied: Vec<String>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Status of the underlying failure; a partial batch answers like its
    /// failing change would have on its own.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Partial { source, .. } => source.status(),
        }
    }
}

impl From<keeper_core::Error> for AppError {
    fn from(error: keeper_core::Error) -> Self {
        use keeper_core::Error;

        match error {
            Error::PartialMerge { applied, source } => Self::Partial {
                applied: applied.iter().map(ToString::to_string).collect(),
                source: Box::new(Self::from(*source)),
            },
            Error::NotFound(message) => Self::NotFound(message),
            Error::Unauthorized(message) => Self::Unauthorized(message),
            Error::Validation(message) => Self::BadRequest(message),
            other => {
                tracing::error!(error = %other, "Request failed");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let data = match self {
            Self::Partial { applied, .. } => Some(PartialData { applied }),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error,
            code: status.as_u16(),
            data,
        };
        (status, Json(body)).into_response()
    }
}
