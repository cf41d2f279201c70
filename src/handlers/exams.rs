// src/handlers/exams.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::exam::{AssignCandidatesRequest, CreateTestRequest, FundTestRequest, TestDefinition},
    services::catalog::Catalog,
    utils::jwt::Claims,
};

/// Create a new test owned by the caller.
pub async fn create_test(
    State(catalog): State<Catalog>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let test = catalog.create_test(claims.user_id()?, payload).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn list_tests(
    State(catalog): State<Catalog>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let tests = catalog.list_tests(claims.user_id()?).await?;
    Ok(Json(tests))
}

pub async fn get_test(
    State(catalog): State<Catalog>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = catalog.get_test(claims.user_id()?, test_id).await?;
    Ok(Json(test))
}

/// Upload or replace the question bank.
pub async fn set_definition(
    State(catalog): State<Catalog>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(payload): Json<TestDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let test = catalog
        .set_definition(claims.user_id()?, test_id, payload)
        .await?;
    Ok(Json(test))
}

pub async fn fund_test(
    State(catalog): State<Catalog>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(payload): Json<FundTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let balance = catalog
        .fund_test(claims.user_id()?, test_id, payload.coins)
        .await?;
    Ok(Json(json!({ "test_id": test_id, "coins": balance })))
}

pub async fn assign_candidates(
    State(catalog): State<Catalog>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(payload): Json<AssignCandidatesRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let assigned = catalog
        .assign_candidates(
            claims.user_id()?,
            test_id,
            &payload.candidate_emails,
            payload.attempts,
        )
        .await?;
    Ok(Json(assigned))
}
