// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use validator::Validate;

use crate::{
    error::AppError,
    models::user::UpdateProfileRequest,
    state::AppState,
    utils::jwt::Claims,
};

/// Get current user's profile, coin balance included.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .user_by_id(claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Update name and/or birth date. Omitted fields are left as they are.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let name = payload.name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(AppError::Validation("name cannot be blank".to_string()));
    }

    let user = state
        .users
        .update_profile(claims.user_id()?, name, payload.birth_date)
        .await?;

    Ok(Json(user))
}
