// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use url::Url;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::user::{LoginRequest, VerifyLoginRequest, normalize_email},
    state::AppState,
    utils::jwt::sign_jwt,
};

/// Builds `<base>/auth/verify?email=..&token=..` with proper escaping.
fn magic_link(base_url: &str, email: &str, token: &str) -> AppResult<String> {
    let mut url = Url::parse(base_url)
        .and_then(|base| base.join("auth/verify"))
        .map_err(|e| AppError::Internal(format!("invalid BASE_URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("email", email)
        .append_pair("token", token);
    Ok(url.into())
}

/// Sends a one-time login link to the given email.
///
/// Unknown addresses are registered on the spot. Requests are throttled per
/// email; delivery failures are logged only.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    state.sessions.throttle_login(&email).await?;

    let user = state.users.find_or_create_user(&email).await?;
    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    let token = state.sessions.issue_magic_link(&email).await?;
    let link = magic_link(&state.config.base_url, &email, &token)?;

    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send_magic_link(&email, &link).await {
            tracing::warn!(%email, "failed to send login link: {}", e);
        }
    });

    Ok(Json(json!({ "message": "Login link sent" })))
}

/// Redeems a login link and returns a JWT token.
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    state.sessions.redeem_magic_link(&email, &payload.token).await?;

    let user = state
        .users
        .user_by_email(&email)
        .await?
        .ok_or_else(AppError::invalid_token)?;

    let token = sign_jwt(user.id, &state.config.jwt_secret, state.config.jwt_expiration)?;
    tracing::info!(user_id = user.id, "user signed in");

    let notifier = state.notifier.clone();
    let at = state.clock.now();
    let to = user.email.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send_login_notice(&to, at).await {
            tracing::warn!(email = %to, "failed to send login notice: {}", e);
        }
    });

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user,
    })))
}
