//! JSON envelope shared by every `/api/v1` response.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [{ "code": "SESSION_BUSY", "message": "...", "retriable": true }],
//!   "_links": { "self": "/api/v1/sessions/..." }
//! }
//! ```
//!
//! Successful responses carry `data` and no `errors`; failures the reverse.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub meta: ApiMeta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: Uuid,
    /// RFC 3339.
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl ApiMeta {
    fn since(start: Option<Instant>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: start.map_or(0, |s| s.elapsed().as_millis() as u64),
        }
    }
}

/// One entry of `errors`. `retriable` tells clients whether repeating the
/// same request may succeed.
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub retriable: bool,
}

impl<T: Serialize> ApiResponse<T> {
    /// Success envelope timed from `start`.
    pub fn timed(data: T, start: Instant) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::since(Some(start)),
            errors: Vec::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &'static str, href: &str) -> Self {
        self.links.insert(rel, href.to_string());
        self
    }
}

impl ApiResponse<()> {
    /// Failure envelope with a single error and no data.
    pub fn failure(detail: ApiErrorDetail) -> Self {
        Self {
            data: None,
            meta: ApiMeta::since(None),
            errors: vec![detail],
            links: BTreeMap::new(),
        }
    }
}
