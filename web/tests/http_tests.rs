//! HTTP tests driving the router with `tower::ServiceExt::oneshot` over the
//! in-memory seat store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use exam_seating_core::environment::Clock;
use exam_seating_core::lifecycle::NoticeOutcome;
use exam_seating_core::types::{OfferingId, RegistrationStatus, StudentId};
use exam_seating_core::verification::GatewayNotice;
use exam_seating_runtime::{Engine, EngineConfig, RetryPolicy};
use exam_seating_testing::fixtures::{signed_notice, test_verifier, CatalogFixture, TEST_FEE};
use exam_seating_testing::{test_clock, InMemorySeatStore};
use exam_seating_web::handlers::registrations::RegistrationResponse;
use exam_seating_web::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup(capacities: &[u32]) -> (InMemorySeatStore, CatalogFixture, Router) {
    setup_with_store(InMemorySeatStore::new(), capacities).await
}

async fn setup_with_store(
    store: InMemorySeatStore,
    capacities: &[u32],
) -> (InMemorySeatStore, CatalogFixture, Router) {
    let catalog = CatalogFixture::new(capacities);
    catalog.seed(&store).await.unwrap();
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let config = EngineConfig {
        retry: RetryPolicy::none(),
        ..EngineConfig::default()
    };
    let engine = Engine::new(Arc::new(store.clone()), clock, test_verifier(), config);
    (store, catalog, router(AppState::new(engine)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn form_body(notice: &GatewayNotice) -> String {
    let mut fields = vec![
        ("merchant_id", notice.merchant_id.clone()),
        ("order_id", notice.order_id.clone()),
        ("amount", notice.amount.clone()),
        ("currency", notice.currency.clone()),
        ("status_code", notice.status_code.clone()),
        ("payment_id", notice.payment_id.clone()),
        ("signature", notice.signature.clone()),
    ];
    if let Some(method) = &notice.method {
        fields.push(("method", method.clone()));
    }
    fields
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

async fn notify(app: &Router, notice: &GatewayNotice) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/payments/notify")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body(notice)))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn register(app: &Router, catalog: &CatalogFixture, student: StudentId) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/offerings/{}/registrations", catalog.offering.id),
        Some(json!({ "student_id": student })),
    )
    .await
}

#[tokio::test]
async fn health_endpoints() {
    let (_store, _catalog, app) = setup(&[1]).await;

    let (status, _) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn allocation_maps_errors_to_status_codes() {
    let (_store, catalog, app) = setup(&[1]).await;
    let student = StudentId::new();

    let (status, body) = register(&app, &catalog, student).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RegistrationResponse = serde_json::from_value(body).unwrap();
    assert_eq!(created.status, RegistrationStatus::Pending);
    assert_eq!(created.location_id, Some(catalog.locations[0].id));

    let (status, body) = register(&app, &catalog, student).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_REGISTRATION");

    let (status, body) = register(&app, &catalog, StudentId::new()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CAPACITY_EXHAUSTED");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/offerings/{}/registrations", OfferingId::new()),
        Some(json!({ "student_id": StudentId::new() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/registrations/{}", created.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index_number"], created.index_number.as_str());
}

#[tokio::test]
async fn locked_store_returns_service_unavailable() {
    let store = InMemorySeatStore::with_lock_timeout(Duration::from_millis(20));
    let (store, catalog, app) = setup_with_store(store, &[1]).await;

    let _held = store.hold_lock().await;
    let (status, body) = register(&app, &catalog, StudentId::new()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn webhook_always_acknowledges() {
    let (store, catalog, app) = setup(&[1]).await;
    let (_, body) = register(&app, &catalog, StudentId::new()).await;
    let created: RegistrationResponse = serde_json::from_value(body).unwrap();

    let mut forged = signed_notice(created.id, TEST_FEE, 2, "PAY-1");
    forged.signature = "0".repeat(32);
    assert_eq!(notify(&app, &forged).await, (StatusCode::OK, "OK".to_string()));

    let notice = signed_notice(created.id, TEST_FEE, 2, "PAY-1");
    assert_eq!(notify(&app, &notice).await, (StatusCode::OK, "OK".to_string()));

    let (_, body) = send(&app, Method::GET, &format!("/api/registrations/{}", created.id), None).await;
    assert_eq!(body["status"], "registered");

    let outcomes: Vec<_> = store.audit_log().await.into_iter().map(|entry| entry.outcome).collect();
    assert_eq!(outcomes, vec![NoticeOutcome::SignatureInvalid, NoticeOutcome::Applied]);
}

#[tokio::test]
async fn notice_during_lock_timeout_is_audited_for_replay() {
    let store = InMemorySeatStore::with_lock_timeout(Duration::from_millis(20));
    let (store, catalog, app) = setup_with_store(store, &[1]).await;
    let (_, body) = register(&app, &catalog, StudentId::new()).await;
    let created: RegistrationResponse = serde_json::from_value(body).unwrap();
    let notice = signed_notice(created.id, TEST_FEE, 2, "PAY-1");

    let held = store.hold_lock().await;
    assert_eq!(notify(&app, &notice).await, (StatusCode::OK, "OK".to_string()));
    drop(held);

    let audit = store.audit_log().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, NoticeOutcome::ProcessingFailed);
    assert_eq!(audit[0].payload, notice);
}

#[tokio::test]
async fn unreadable_webhook_body_is_acknowledged_and_audited() {
    let (store, _catalog, app) = setup(&[1]).await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/payments/notify")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"order_id\":\"x\"}"))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let outcomes: Vec<_> = store.audit_log().await.into_iter().map(|entry| entry.outcome).collect();
    assert_eq!(outcomes, vec![NoticeOutcome::Malformed]);
}

#[tokio::test]
async fn capacity_administration() {
    let (_store, catalog, app) = setup(&[1, 1]).await;
    register(&app, &catalog, StudentId::new()).await;
    let hall = catalog.locations[0].id;

    let (status, body) = send(&app, Method::GET, &format!("/api/offerings/{}/locations", catalog.offering.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"][0]["occupancy"], 1);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/locations/{hall}/capacity"),
        Some(json!({ "capacity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_CAPACITY");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/locations/{hall}/capacity"),
        Some(json!({ "capacity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacity"], 3);

    let (status, body) = send(&app, Method::DELETE, &format!("/api/locations/{hall}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "LOCATION_OCCUPIED");

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/locations/{}", catalog.locations[1].id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
