// src/handlers/coins.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::payment::{PurchaseCoinsRequest, VerifyPaymentRequest},
    services::settlement::Settlement,
    utils::jwt::Claims,
};

/// Opens a coin purchase. The response carries everything the checkout needs.
pub async fn purchase(
    State(settlement): State<Settlement>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PurchaseCoinsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let order = settlement
        .create_intent(claims.user_id()?, payload.coins, payload.currency)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "key_id": config.razorpay.key_id,
            "order": order,
        })),
    ))
}

/// Client-side confirmation after checkout.
pub async fn verify(
    State(settlement): State<Settlement>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let outcome = settlement
        .confirm(&payload.order_ref, &payload.payment_ref, &payload.signature)
        .await?;

    Ok(Json(json!({ "outcome": outcome })))
}

/// The caller's purchases, newest first.
pub async fn list_orders(
    State(settlement): State<Settlement>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let orders = settlement.orders(claims.user_id()?).await?;
    Ok(Json(orders))
}
