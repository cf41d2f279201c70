// tests/api_tests.rs

mod common;

use chrono::{NaiveDate, Utc};
use common::{
    JWT_SECRET, TestApp, order_paid_body, question_bank, spawn_app, unique_email,
    webhook_signature,
};
use exam_platform::{ports::UserStore, utils::jwt::sign_jwt};
use serde_json::{Value, json};

/// Signs in through the magic-link flow and returns the bearer token.
async fn sign_in(app: &TestApp, email: &str) -> String {
    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let link = app.notifier.latest_link(email).await;
    let link = url::Url::parse(&link).unwrap();
    let token = link
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let response = app
        .client
        .post(app.url("/auth/verify"))
        .json(&json!({ "email": email, "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn magic_link_login_returns_a_usable_token() {
    let app = spawn_app().await;
    let email = unique_email("alice");

    let token = sign_in(&app, &email).await;

    let response = app
        .client
        .get(app.url("/api/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let profile: Value = response.json().await.unwrap();
    assert_eq!(profile["email"], email);
    assert_eq!(profile["coins"], 1500);
}

#[tokio::test]
async fn magic_links_work_once() {
    let app = spawn_app().await;
    let email = unique_email("bob");
    sign_in(&app, &email).await;

    let link = app.notifier.latest_link(&email).await;
    let token = url::Url::parse(&link)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let response = app
        .client
        .post(app.url("/auth/verify"))
        .json(&json!({ "email": email, "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn login_requests_are_throttled() {
    let app = spawn_app().await;
    let email = unique_email("carol");

    let first = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    let second = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();

    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 429);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["kind"], "rate_limited");
}

#[tokio::test]
async fn api_routes_require_a_token() {
    let app = spawn_app().await;

    let missing = app.client.get(app.url("/api/profile")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 401);

    let forged = app
        .client
        .get(app.url("/api/orders"))
        .bearer_auth("not.a.jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status().as_u16(), 401);
}

#[tokio::test]
async fn profile_update_sets_name_and_birth_date() {
    let app = spawn_app().await;
    let token = sign_in(&app, &unique_email("dave")).await;

    let response = app
        .client
        .put(app.url("/api/profile"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Dave", "birth_date": "1999-04-01" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let profile: Value = response.json().await.unwrap();
    assert_eq!(profile["name"], "Dave");
    assert_eq!(profile["birth_date"], "1999-04-01");
}

#[tokio::test]
async fn purchase_is_credited_by_the_webhook() {
    let app = spawn_app().await;
    let token = sign_in(&app, &unique_email("erin")).await;

    let response = app
        .client
        .post(app.url("/api/coins/purchase"))
        .bearer_auth(&token)
        .json(&json!({ "coins": 500, "currency": "INR" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["order"]["amount_minor"], 50_000);
    let order_ref = body["order"]["order_ref"].as_str().unwrap().to_string();

    let payload = order_paid_body(&order_ref, "pay_http_1");
    let webhook = app
        .client
        .post(app.url("/webhook/razorpay"))
        .header("X-Razorpay-Signature", webhook_signature(&payload))
        .header("Content-Type", "application/json")
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(webhook.status().as_u16(), 200);

    let replay = app
        .client
        .post(app.url("/webhook/razorpay"))
        .header("X-Razorpay-Signature", webhook_signature(&payload))
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status().as_u16(), 200);

    let profile: Value = app
        .client
        .get(app.url("/api/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["coins"], 2000);

    let orders: Value = app
        .client
        .get(app.url("/api/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders[0]["status"], "completed");
}

#[tokio::test]
async fn unsigned_webhooks_are_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/webhook/razorpay"))
        .body(order_paid_body("order_x", "pay_x"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn candidate_sits_a_test_through_the_portal() {
    let app = spawn_app().await;

    // Examiner side, authenticated directly with a signed token
    let examiner = app
        .store
        .find_or_create_user(&unique_email("examiner"))
        .await
        .unwrap();
    let jwt = sign_jwt(examiner.id, JWT_SECRET, 600).unwrap();

    let starts_at = Utc::now();
    let created: Value = app
        .client
        .post(app.url("/api/tests"))
        .bearer_auth(&jwt)
        .json(&json!({
            "name": "Reasoning",
            "duration_minutes": 20,
            "starts_at": starts_at,
            "ends_at": starts_at + chrono::Duration::days(1),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let test_id = created["id"].as_i64().unwrap();

    let uploaded = app
        .client
        .put(app.url(&format!("/api/tests/{test_id}/definition")))
        .bearer_auth(&jwt)
        .json(&question_bank(&[(6, 2)]))
        .send()
        .await
        .unwrap();
    assert_eq!(uploaded.status().as_u16(), 200);

    let candidate_email = unique_email("candidate");
    let assigned = app
        .client
        .post(app.url(&format!("/api/tests/{test_id}/candidates")))
        .bearer_auth(&jwt)
        .json(&json!({ "attempts": 1, "candidate_emails": [candidate_email] }))
        .send()
        .await
        .unwrap();
    assert_eq!(assigned.status().as_u16(), 200);

    let candidate = app
        .store
        .user_by_email(&candidate_email)
        .await
        .unwrap()
        .unwrap();
    let birth_date = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap();
    app.store
        .update_profile(candidate.id, None, Some(birth_date))
        .await
        .unwrap();

    // Candidate side
    let wrong = app
        .client
        .post(app.url("/portal/login"))
        .json(&json!({ "email": candidate_email, "birth_date": "2001-02-04" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 401);

    let login: Value = app
        .client
        .post(app.url("/portal/login"))
        .json(&json!({ "email": candidate_email, "birth_date": "2001-02-03" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session = login["token"].as_str().unwrap().to_string();
    assert_eq!(login["tests"][0]["test_id"], test_id);

    let init: Value = app
        .client
        .post(app.url("/portal/init"))
        .json(&json!({ "email": candidate_email, "token": session, "test_id": test_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = init["attempt_id"].as_i64().unwrap();

    let again = app
        .client
        .post(app.url("/portal/init"))
        .json(&json!({ "email": candidate_email, "token": session, "test_id": test_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    let started: Value = app
        .client
        .post(app.url("/portal/start"))
        .json(&json!({ "email": candidate_email, "token": session, "attempt_id": attempt_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let questions = started["questions"]["sections"][0]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions[0].get("correctOption").is_none());

    let number = questions[0]["questionNumber"].as_i64().unwrap();
    let submitted = app
        .client
        .post(app.url("/portal/submit"))
        .json(&json!({
            "email": candidate_email,
            "token": session,
            "attempt_id": attempt_id,
            "answers": {
                "sections": [
                    { "sectionId": 1, "answers": [ { "questionNumber": number, "selectedOption": 2 } ] }
                ]
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(submitted.status().as_u16(), 200);

    let forged = app
        .client
        .post(app.url("/portal/start"))
        .json(&json!({ "email": candidate_email, "token": "forged", "attempt_id": attempt_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status().as_u16(), 401);

    let logout = app
        .client
        .post(app.url("/portal/logout"))
        .json(&json!({ "email": candidate_email, "token": session }))
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status().as_u16(), 200);

    let after = app
        .client
        .post(app.url("/portal/verify"))
        .json(&json!({ "email": candidate_email, "token": session }))
        .send()
        .await
        .unwrap();
    assert_eq!(after.status().as_u16(), 401);
}
