// src/handlers/portal.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::{
        attempt::{
            InitAttemptRequest, PortalCredentials, PortalLoginRequest, StartAttemptRequest,
            SubmitAnswersRequest,
        },
        user::{User, normalize_email},
    },
    state::AppState,
};

/// Validates (and thereby renews) the portal session, then resolves the
/// candidate behind it.
async fn authenticate(state: &AppState, session: &PortalCredentials) -> AppResult<User> {
    let email = normalize_email(&session.email);
    state
        .sessions
        .require_portal_session(&email, &session.token)
        .await?;
    state
        .users
        .user_by_email(&email)
        .await?
        .ok_or_else(AppError::invalid_token)
}

/// Candidate login with email and birth date.
///
/// Issues a fresh session token, replacing any earlier one, and lists the
/// tests the candidate is assigned to.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<PortalLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&payload.email);

    let candidate = state
        .users
        .user_by_email(&email)
        .await?
        .filter(|user| user.is_active && user.birth_date == Some(payload.birth_date))
        .ok_or_else(|| AppError::Unauthorized("Invalid email or birth date".to_string()))?;

    let token = state.sessions.issue_portal_session(&email).await?;
    let tests = state.catalog.candidate_overview(candidate.id).await?;
    tracing::info!(candidate_id = candidate.id, "portal session opened");

    Ok(Json(json!({
        "token": token,
        "tests": tests,
    })))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<PortalCredentials>,
) -> Result<impl IntoResponse, AppError> {
    authenticate(&state, &payload).await?;
    Ok(Json(json!({ "valid": true })))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<PortalCredentials>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&payload.email);
    state
        .sessions
        .require_portal_session(&email, &payload.token)
        .await?;
    state.sessions.end_portal_session(&email, &payload.token).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

/// Consumes one attempt and freezes its question draw.
pub async fn init_attempt(
    State(state): State<AppState>,
    Json(payload): Json<InitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let candidate = authenticate(&state, &payload.session).await?;
    let attempt = state
        .attempts
        .initialize(candidate.id, payload.test_id)
        .await?;
    Ok(Json(attempt))
}

pub async fn start_attempt(
    State(state): State<AppState>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let candidate = authenticate(&state, &payload.session).await?;
    let started = state
        .attempts
        .start(payload.attempt_id, candidate.id)
        .await?;
    Ok(Json(started))
}

pub async fn submit_answers(
    State(state): State<AppState>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let candidate = authenticate(&state, &payload.session).await?;
    let attempt = state
        .attempts
        .submit_answers(payload.attempt_id, candidate.id, payload.answers)
        .await?;

    Ok(Json(json!({
        "attempt_id": attempt.id,
        "deadline": attempt.deadline(),
        "message": "Answers saved",
    })))
}
