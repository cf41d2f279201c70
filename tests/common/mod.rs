// tests/common/mod.rs

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_platform::{
    adapters::memory::{ManualClock, MemoryStore},
    config::{Config, RazorpayConfig},
    error::{AppError, AppResult},
    models::exam::{AuthoredQuestion, AuthoredSection, QuestionType, TestDefinition},
    ports::{Invoice, Notifier, OrderRequest, PaymentGateway},
    routes,
    state::AppState,
    utils::signature,
};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";
pub const KEY_SECRET: &str = "rzp_test_key_secret";
pub const WEBHOOK_SECRET: &str = "rzp_test_webhook_secret";

pub fn test_config() -> Config {
    Config {
        database_url: None,
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        base_url: "http://localhost:5173".to_string(),
        magic_link_expiry: 900,
        portal_session_ttl: 900,
        login_throttle: 60,
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: KEY_SECRET.to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
        },
    }
}

/// Hands out sequential order ids, or fails every call when told to.
#[derive(Default)]
pub struct FakeGateway {
    next: AtomicU64,
    failing: AtomicBool,
    repeating: AtomicBool,
    pub receipts: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn fail_next_calls(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Every later order gets the id of the last one handed out.
    pub fn repeat_last_order(&self) {
        self.repeating.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, order: &OrderRequest) -> AppResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Gateway("connection reset".to_string()));
        }
        self.receipts.lock().unwrap().push(order.receipt.clone());
        let n = if self.repeating.load(Ordering::SeqCst) {
            self.next.load(Ordering::SeqCst)
        } else {
            self.next.fetch_add(1, Ordering::SeqCst) + 1
        };
        Ok(format!("order_test_{n}"))
    }
}

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub magic_links: Mutex<Vec<(String, String)>>,
    pub login_notices: Mutex<Vec<String>>,
    pub invoices: Mutex<Vec<Invoice>>,
}

impl RecordingNotifier {
    /// The most recent link sent to `email`, waiting briefly for the
    /// background send to land.
    pub async fn latest_link(&self, email: &str) -> String {
        wait_for(|| {
            self.magic_links
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, link)| link.clone())
        })
        .await
    }

    pub async fn invoice_count(&self) -> usize {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.invoices.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_magic_link(&self, email: &str, link: &str) -> AppResult<()> {
        self.magic_links
            .lock()
            .unwrap()
            .push((email.to_string(), link.to_string()));
        Ok(())
    }

    async fn send_login_notice(&self, email: &str, _at: DateTime<Utc>) -> AppResult<()> {
        self.login_notices.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn send_invoice(&self, invoice: &Invoice) -> AppResult<()> {
        self.invoices.lock().unwrap().push(invoice.clone());
        Ok(())
    }
}

/// Polls `probe` until it yields a value, for effects of spawned tasks.
pub async fn wait_for<T>(probe: impl Fn() -> Option<T>) -> T {
    for _ in 0..100 {
        if let Some(value) = probe() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn payment_signature(order_ref: &str, payment_ref: &str) -> String {
    signature::sign(KEY_SECRET, format!("{order_ref}|{payment_ref}").as_bytes())
}

pub fn webhook_signature(body: &str) -> String {
    signature::sign(WEBHOOK_SECRET, body.as_bytes())
}

pub fn order_paid_body(order_ref: &str, payment_ref: &str) -> String {
    serde_json::json!({
        "event": "order.paid",
        "payload": {
            "order": { "entity": { "id": order_ref, "status": "paid" } },
            "payment": { "entity": { "id": payment_ref, "order_id": order_ref, "status": "captured" } }
        }
    })
    .to_string()
}

pub fn payment_failed_body(order_ref: &str, payment_ref: &str) -> String {
    serde_json::json!({
        "event": "payment.failed",
        "payload": {
            "payment": { "entity": { "id": payment_ref, "order_id": order_ref, "status": "failed" } }
        }
    })
    .to_string()
}

/// A bank of single-choice questions, one entry per section:
/// `(questions in the section, questions to display)`.
pub fn question_bank(sections: &[(i32, i32)]) -> TestDefinition {
    TestDefinition {
        title: "General Aptitude".to_string(),
        sections: sections
            .iter()
            .enumerate()
            .map(|(i, &(count, display))| AuthoredSection {
                section_id: i as i32 + 1,
                title: format!("Section {}", i + 1),
                questions_to_display: display,
                questions: (1..=count)
                    .map(|n| AuthoredQuestion {
                        question_number: n,
                        question_type: QuestionType::SingleChoice,
                        success_marks: 4,
                        failure_marks: -1,
                        question_text: format!("Question {n}"),
                        options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                        correct_option: Some(1),
                        correct_options: Vec::new(),
                        model_answer: None,
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn unique_email(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}@example.com", &id[..8])
}

/// A running server on a random port, backed by the in-memory store.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(FakeGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let state = AppState::new(
        test_config(),
        store.clone(),
        gateway.clone(),
        notifier.clone(),
        clock.clone(),
    );
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        store,
        gateway,
        notifier,
        clock,
    }
}
