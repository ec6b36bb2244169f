//! Session HTTP handlers.
//!
//! Endpoints:
//! - POST   /api/v1/sessions                     - Create a session (multipart)
//! - GET    /api/v1/courses/{course_id}/sessions - List a course's sessions
//! - GET    /api/v1/sessions/{id}                - Session plus visible history
//! - PATCH  /api/v1/sessions/{id}                - Rename
//! - DELETE /api/v1/sessions/{id}                - Delete (idempotent)
//! - POST   /api/v1/sessions/{id}/messages       - Send a message (multipart)
//! - GET    /api/v1/sessions/{id}/transcript     - Visible transcript
//! - POST   /api/v1/sessions/{id}/next-slide     - Explain the next slide
//! - PUT    /api/v1/sessions/{id}/deck           - Replace the deck (multipart)

use std::time::Instant;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lectern_core::chat::{SlideAdvance, TurnExchange};
use lectern_types::session::{DeckKind, Session};
use lectern_types::transcript::{MediaRef, TranscriptEntry};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::multipart::UploadForm;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Client-facing view of a session. Storage paths stay server-side.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub slides_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck: Option<DeckView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeckView {
    pub name: String,
    pub kind: DeckKind,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            course_id: s.course_id,
            title: s.title.clone(),
            slides_mode: s.slides_mode,
            deck: s.deck.as_ref().map(|d| DeckView {
                name: d.original_name.clone(),
                kind: d.kind,
            }),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub session: SessionView,
    pub history: Vec<TranscriptEntry>,
}

/// Result of `next-slide`. Exhaustion is a normal 200 response.
#[derive(Debug, Serialize)]
pub struct NextSlideView {
    pub exhausted: bool,
    pub slides_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageView>,
}

#[derive(Debug, Serialize)]
pub struct PageView {
    /// 1-based page number.
    pub number: u32,
    pub page_count: u32,
    pub page_ref: MediaRef,
    pub explanation: TranscriptEntry,
}

impl From<SlideAdvance> for NextSlideView {
    fn from(advance: SlideAdvance) -> Self {
        match advance {
            SlideAdvance::Page(page) => Self {
                exhausted: false,
                slides_mode: true,
                page: Some(PageView {
                    number: page.number(),
                    page_count: page.page_count,
                    page_ref: page.page_ref,
                    explanation: page.explanation,
                }),
            },
            SlideAdvance::Exhausted { session } => Self {
                exhausted: true,
                slides_mode: session.slides_mode,
                page: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

/// Parse a UUID from a path parameter or form field, returning a 400 on
/// invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.trim()
        .parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

fn session_link(id: Uuid) -> String {
    format!("/api/v1/sessions/{id}")
}

/// POST /api/v1/sessions - Create a session, optionally with a deck.
pub async fn create_session(
    State(state): State<AppState>,
    _auth: Authenticated,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<SessionView>>), AppError> {
    let start = Instant::now();
    let mut form = UploadForm::read(multipart).await?;

    let course_id = parse_uuid(form.require_text("course_id")?)?;
    let title = form.require_text("title")?.to_string();
    let deck = form.take_file("deck");

    let session = state
        .coordinator
        .create_session(course_id, &title, deck)
        .await?;

    let resp = ApiResponse::timed(SessionView::from(&session), start)
        .with_link("self", &session_link(session.id));
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/courses/{course_id}/sessions - List sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(course_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<SessionView>>>, AppError> {
    let start = Instant::now();
    let course_id = parse_uuid(&course_id)?;

    let sessions = state.coordinator.list_sessions(course_id).await?;
    let views: Vec<SessionView> = sessions.iter().map(SessionView::from).collect();

    let resp = ApiResponse::timed(views, start)
        .with_link("self", &format!("/api/v1/courses/{course_id}/sessions"));
    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id} - Session with its visible history.
pub async fn get_conversation(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ConversationView>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;

    let conversation = state.coordinator.get_conversation(sid).await?;
    let view = ConversationView {
        session: SessionView::from(&conversation.session),
        history: conversation.history,
    };

    let resp = ApiResponse::timed(view, start)
        .with_link("self", &session_link(sid))
        .with_link("transcript", &format!("{}/transcript", session_link(sid)));
    Ok(Json(resp))
}

/// PATCH /api/v1/sessions/{id} - Rename a session.
pub async fn rename_session(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
    Json(body): Json<RenameRequest>,
) -> Result<Json<ApiResponse<SessionView>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;

    let session = state.coordinator.rename_session(sid, &body.title).await?;

    Ok(Json(ApiResponse::timed(SessionView::from(&session), start)))
}

/// DELETE /api/v1/sessions/{id} - Delete a session and all its artifacts.
pub async fn delete_session(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;

    state.coordinator.delete_session(sid).await?;

    Ok(Json(ApiResponse::timed(
        serde_json::json!({ "deleted": true, "id": sid }),
        start,
    )))
}

/// POST /api/v1/sessions/{id}/messages - Send a message, optionally with an
/// image, and return the committed exchange.
pub async fn send_message(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<TurnExchange>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;
    let mut form = UploadForm::read(multipart).await?;

    let text = form.text("text").unwrap_or_default().to_string();
    let file = form.take_file("file");

    let exchange = state.coordinator.append_user_turn(sid, &text, file).await?;

    Ok(Json(
        ApiResponse::timed(exchange, start).with_link("session", &session_link(sid)),
    ))
}

/// GET /api/v1/sessions/{id}/transcript - Ordered visible transcript.
pub async fn get_transcript(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TranscriptEntry>>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;

    let entries = state.coordinator.get_transcript(sid).await?;

    Ok(Json(ApiResponse::timed(entries, start)))
}

/// POST /api/v1/sessions/{id}/next-slide - Rasterize and explain the next
/// page of the session's deck.
pub async fn next_slide(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<NextSlideView>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;

    let advance = state.coordinator.advance_slide(sid).await?;

    Ok(Json(ApiResponse::timed(NextSlideView::from(advance), start)))
}

/// PUT /api/v1/sessions/{id}/deck - Replace the deck and restart the walk.
pub async fn replace_deck(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SessionView>>, AppError> {
    let start = Instant::now();
    let sid = parse_uuid(&session_id)?;
    let mut form = UploadForm::read(multipart).await?;

    let deck = form
        .take_file("deck")
        .ok_or_else(|| AppError::Validation("Missing file field 'deck'".to_string()))?;

    let session = state.coordinator.replace_deck(sid, deck).await?;

    Ok(Json(ApiResponse::timed(SessionView::from(&session), start)))
}
