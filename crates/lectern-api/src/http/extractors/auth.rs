//! API key check for `/api/v1` routes.
//!
//! A key is accepted from `Authorization: Bearer <key>` or `X-API-Key: <key>`.
//! Only the SHA-256 of the configured key is kept in [`AppState`].

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::http::error::AppError;
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";
const KEY_PREFIX: &str = "lectern_";

/// Marker extractor: present in a handler's arguments means the caller
/// presented the configured key.
pub struct Authenticated;

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.api_key_hash.as_deref() else {
            return Err(AppError::Internal("No API key configured".to_string()));
        };

        let presented = presented_key(&parts.headers)?.ok_or_else(|| {
            AppError::Unauthorized(
                "Missing API key. Send 'Authorization: Bearer <key>' or 'X-API-Key: <key>'."
                    .to_string(),
            )
        })?;

        if hash_api_key(presented) != expected {
            tracing::debug!("rejected request with unknown API key");
            return Err(AppError::Unauthorized("Invalid API key".to_string()));
        }
        Ok(Authenticated)
    }
}

/// The key a request carries, if any. A bearer token wins over `X-API-Key`.
fn presented_key(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    if let Some(token) =
        header_str(headers, AUTHORIZATION.as_str())?.and_then(|v| v.strip_prefix("Bearer "))
    {
        return Ok(Some(token.trim()).filter(|t| !t.is_empty()));
    }
    Ok(header_str(headers, API_KEY_HEADER)?
        .map(str::trim)
        .filter(|t| !t.is_empty()))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::Unauthorized(format!("{name} header is not ASCII")))
        })
        .transpose()
}

/// Lowercase hex SHA-256 of a key.
pub fn hash_api_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// A fresh random key, `lectern_` followed by 64 hex characters.
pub fn generate_api_key() -> String {
    let entropy = [uuid::Uuid::new_v4(), uuid::Uuid::new_v4()];
    let hex: String = entropy.iter().map(|u| u.simple().to_string()).collect();
    format!("{KEY_PREFIX}{hex}")
}
