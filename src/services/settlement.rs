// src/services/settlement.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    config::RazorpayConfig,
    error::{AppError, AppResult},
    models::payment::{
        Currency, PaymentIntent, SettlementEvent, SettlementOutcome,
    },
    ports::{Invoice, NewPaymentIntent, Notifier, OrderRequest, PaymentGateway, PaymentStore, UserStore},
    utils::signature,
};

/// Secrets used to authenticate gateway confirmations.
#[derive(Debug, Clone)]
pub struct SigningSecrets {
    /// Signs client-path confirmations.
    pub key_secret: String,
    /// Signs webhook bodies.
    pub webhook_secret: String,
}

impl From<&RazorpayConfig> for SigningSecrets {
    fn from(config: &RazorpayConfig) -> Self {
        Self {
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

/// What the payer needs to open the gateway checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub intent_id: i64,
    pub order_ref: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub coins: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "outcome", rename_all = "snake_case")]
pub enum WebhookAck {
    Processed(SettlementOutcome),
    Ignored,
}

/// Drives payment intents from `pending` to a terminal state.
///
/// Both confirmation paths end in `PaymentStore::settle`, which checks the
/// status and credits the owner under one row lock. Whichever path takes the
/// lock first while the intent is `pending` credits; the other observes
/// `completed` and does nothing.
#[derive(Clone)]
pub struct Settlement {
    payments: Arc<dyn PaymentStore>,
    users: Arc<dyn UserStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    secrets: SigningSecrets,
}

impl Settlement {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        users: Arc<dyn UserStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        secrets: SigningSecrets,
    ) -> Self {
        Self {
            payments,
            users,
            gateway,
            notifier,
            secrets,
        }
    }

    /// Records a `pending` intent and opens a gateway order for it.
    pub async fn create_intent(
        &self,
        owner_id: i64,
        coins: i64,
        currency: Currency,
    ) -> AppResult<CreatedOrder> {
        let amount_minor = currency.price_minor(coins)?;

        let intent = self
            .payments
            .insert_intent(NewPaymentIntent {
                owner_id,
                amount_minor,
                currency,
                coins,
            })
            .await?;

        let order = OrderRequest {
            amount_minor,
            currency,
            receipt: format!("ORDER-{}", intent.id),
        };

        let order_ref = match self.gateway.create_order(&order).await {
            Ok(order_ref) => order_ref,
            Err(e) => {
                tracing::warn!(intent_id = intent.id, "gateway order creation failed: {}", e);
                self.abandon(intent.id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.payments.attach_order_ref(intent.id, &order_ref).await {
            tracing::error!(intent_id = intent.id, %order_ref, "failed to record order reference: {}", e);
            self.abandon(intent.id).await;
            return Err(e);
        }
        tracing::info!(intent_id = intent.id, %order_ref, coins, "payment intent created");

        Ok(CreatedOrder {
            intent_id: intent.id,
            order_ref,
            amount_minor,
            currency,
            coins,
        })
    }

    /// Client-path confirmation. A bad signature changes nothing.
    pub async fn confirm(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> AppResult<SettlementOutcome> {
        if !signature::verify_payment(&self.secrets.key_secret, order_ref, payment_ref, signature) {
            tracing::warn!(%order_ref, "client confirmation carried an invalid signature");
            return Err(AppError::InvalidSignature);
        }

        let event = SettlementEvent::Paid {
            payment_ref: payment_ref.to_string(),
        };
        self.apply(order_ref, &event).await
    }

    /// Webhook-path confirmation over the exact bytes the gateway sent.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature_header: &str) -> AppResult<WebhookAck> {
        if !signature::verify_webhook(&self.secrets.webhook_secret, raw_body, signature_header) {
            tracing::warn!("discarding webhook with an invalid signature");
            return Err(AppError::InvalidSignature);
        }

        let Some((order_ref, event)) = parse_webhook(raw_body)? else {
            return Ok(WebhookAck::Ignored);
        };

        self.apply(&order_ref, &event).await.map(WebhookAck::Processed)
    }

    pub async fn orders(&self, owner_id: i64) -> AppResult<Vec<PaymentIntent>> {
        self.payments.intents_for_owner(owner_id).await
    }

    /// Moves a `pending` intent to `failed`, logging instead of returning errors.
    async fn abandon(&self, intent_id: i64) {
        if let Err(e) = self.payments.abandon_intent(intent_id).await {
            tracing::error!(intent_id, "failed to abandon intent: {}", e);
        }
    }

    async fn apply(&self, order_ref: &str, event: &SettlementEvent) -> AppResult<SettlementOutcome> {
        let (intent, outcome) = self.payments.settle(order_ref, event).await?;

        match outcome {
            SettlementOutcome::Credited => {
                tracing::info!(intent_id = intent.id, owner_id = intent.owner_id, coins = intent.coins, "payment completed");
                self.dispatch_invoice(intent);
            }
            SettlementOutcome::MarkedFailed => {
                tracing::info!(intent_id = intent.id, "payment marked failed");
            }
            SettlementOutcome::AlreadyCompleted | SettlementOutcome::Ignored => {
                tracing::debug!(intent_id = intent.id, ?outcome, "confirmation already applied");
            }
        }
        Ok(outcome)
    }

    /// Best-effort and post-commit; never affects the settlement result.
    fn dispatch_invoice(&self, intent: PaymentIntent) {
        let users = Arc::clone(&self.users);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let owner = match users.user_by_id(intent.owner_id).await {
                Ok(Some(owner)) => owner,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(intent_id = intent.id, "invoice skipped: {}", e);
                    return;
                }
            };
            let invoice = Invoice {
                email: owner.email,
                name: owner.name,
                intent_id: intent.id,
                coins: intent.coins,
                currency: intent.currency,
                amount_minor: intent.amount_minor,
            };
            if let Err(e) = notifier.send_invoice(&invoice).await {
                tracing::warn!(intent_id = intent.id, "failed to send invoice: {}", e);
            }
        });
    }
}

//=========================================================================================
// Webhook payloads
//=========================================================================================

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Deserialize)]
struct OrderEntity {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct OrderPaid {
    order: Wrapped<OrderEntity>,
    payment: Wrapped<PaymentEntity>,
}

#[derive(Deserialize)]
struct PaymentFailed {
    payment: Wrapped<PaymentEntity>,
}

/// Maps a verified webhook body to a settlement event.
/// Returns `None` for events that carry no settlement.
fn parse_webhook(raw_body: &[u8]) -> AppResult<Option<(String, SettlementEvent)>> {
    let envelope: Envelope = serde_json::from_slice(raw_body)?;

    match envelope.event.as_str() {
        "order.paid" => {
            let paid: OrderPaid = serde_json::from_value(envelope.payload)?;
            if paid.order.entity.status != "paid" {
                return Ok(None);
            }
            let event = SettlementEvent::Paid {
                payment_ref: paid.payment.entity.id,
            };
            Ok(Some((paid.order.entity.id, event)))
        }
        "payment.failed" => {
            let failed: PaymentFailed = serde_json::from_value(envelope.payload)?;
            let payment = failed.payment.entity;
            if payment.status != "failed" {
                return Ok(None);
            }
            let order_ref = payment.order_id.ok_or_else(|| {
                AppError::Validation("payment.failed event without order_id".to_string())
            })?;
            let event = SettlementEvent::Failed {
                payment_ref: payment.id,
            };
            Ok(Some((order_ref, event)))
        }
        other => {
            tracing::debug!(event = other, "ignoring webhook event");
            Ok(None)
        }
    }
}
