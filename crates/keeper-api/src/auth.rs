use axum::http::HeaderMap;
use keeper_core::auth::{IdentityVerifier, TokenError};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
}

/// Resolve the caller behind the request's bearer token.
pub fn authenticate(
    verifier: &impl IdentityVerifier,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, AppError> {
    let token = extract_bearer_token(headers)?;
    let identity = verifier.verify(token).map_err(|error| match error {
        TokenError::Missing => AppError::unauthorized("Bearer token is empty"),
        TokenError::Expired => AppError::unauthorized("Token is expired"),
        TokenError::Invalid(reason) => {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&reason)))
        }
    })?;

    Ok(AuthenticatedUser {
        user_id: identity.user_id,
        username: identity.username,
    })
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;
    use keeper_core::auth::TokenSigner;

    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret", Duration::from_secs(300)).unwrap()
    }

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let headers = headers_with("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        assert!(extract_bearer_token(&headers_with("Basic abc")).is_err());
    }

    #[test]
    fn missing_header_is_reported() {
        let err = extract_bearer_token(&HeaderMap::new()).unwrap_err();
        assert!(err.to_string().contains("Missing Authorization header"));
    }

    #[test]
    fn authenticate_resolves_identity() {
        let signer = signer();
        let (token, _) = signer.issue("user-1", "alice").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let user = authenticate(&signer, &headers).unwrap();
        assert_eq!(user.user_id, "user-1");
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn authenticate_rejects_foreign_signatures() {
        let other = TokenSigner::new(b"other-secret", Duration::from_secs(300)).unwrap();
        let (token, _) = other.issue("user-1", "alice").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let err = authenticate(&signer(), &headers).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
