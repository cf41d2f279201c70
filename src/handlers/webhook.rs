// src/handlers/webhook.rs

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};

use crate::{error::AppError, services::settlement::Settlement};

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Gateway webhook. The signature covers the raw body, so it is read as bytes.
pub async fn razorpay(
    State(settlement): State<Settlement>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    match settlement.handle_webhook(&body, signature).await {
        Ok(ack) => Ok(Json(ack)),
        Err(e @ (AppError::InvalidSignature | AppError::Integrity(_))) => Err(e),
        Err(e) => {
            tracing::warn!("webhook rejected: {}", e);
            Err(AppError::Validation("webhook could not be processed".to_string()))
        }
    }
}
