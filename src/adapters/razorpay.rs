// src/adapters/razorpay.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    config::RazorpayConfig,
    error::{AppError, AppResult},
    ports::{OrderRequest, PaymentGateway},
};

const API_BASE: &str = "https://api.razorpay.com";

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
}

/// Orders API client authenticated with the key pair.
pub struct RazorpayGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(config: &RazorpayConfig) -> AppResult<Self> {
        Self::with_base_url(config, API_BASE)
    }

    pub fn with_base_url(config: &RazorpayConfig, base_url: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| AppError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, order: &OrderRequest) -> AppResult<String> {
        let body = CreateOrderBody {
            amount: order.amount_minor,
            currency: order.currency.code(),
            receipt: &order.receipt,
            payment_capture: 1,
        };

        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("order request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "order request rejected with {status}: {detail}"
            )));
        }

        let created: OrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("unreadable order response: {e}")))?;
        Ok(created.id)
    }
}
