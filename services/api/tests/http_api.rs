//! End-to-end checks of the router over the in-memory ports.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use procurement_core::memory::{MemoryStore, RecordingMail, StaticCapabilities};
use procurement_core::ports::Capability;

struct TestApp {
    router: Router,
    store: MemoryStore,
    mail: Arc<RecordingMail>,
    department_id: Uuid,
    buyer: Uuid,
}

async fn app_with(capabilities: Arc<StaticCapabilities>) -> TestApp {
    let store = MemoryStore::new();
    let mail = Arc::new(RecordingMail::default());
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        _ => None,
    })
    .unwrap();
    let state = AppState::new(
        Arc::new(store.clone()),
        mail.clone(),
        capabilities,
        Arc::new(config),
    );
    let department = store.add_department("Operations").await;
    let buyer = store.add_user("buyer@example.com", None).await;
    TestApp {
        router: web::router(Arc::new(state)),
        store,
        mail,
        department_id: department.id,
        buyer: buyer.id,
    }
}

async fn app() -> TestApp {
    app_with(Arc::new(StaticCapabilities::allow_all())).await
}

async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn request_body(app: &TestApp) -> Value {
    let now = chrono::Utc::now();
    json!({
        "title": "Office chairs",
        "department_id": app.department_id,
        "delivery_date": now + chrono::Duration::days(30),
        "delivery_address": "HQ, floor 2",
        "bidding_deadline": now + chrono::Duration::days(7),
        "visibility": "PUBLIC"
    })
}

async fn published_request(app: &TestApp) -> Uuid {
    let (status, created) = call(app, "POST", "/purchase-requests", Some(app.buyer), Some(request_body(app))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        app,
        "PUT",
        &format!("/purchase-requests/{}/status", id),
        Some(app.buyer),
        Some(json!({ "status": "published" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    Uuid::parse_str(&id).unwrap()
}

#[tokio::test]
async fn requests_without_a_user_header_are_rejected() {
    let app = app().await;
    let (status, body) = call(&app, "GET", "/purchase-requests", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "x-user-id header is required");
}

#[tokio::test]
async fn creating_a_request_returns_it_waiting_for_approval() {
    let app = app().await;
    let (status, body) = call(&app, "POST", "/purchase-requests", Some(app.buyer), Some(request_body(&app))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "WAITING_FOR_APPROVAL");
    assert!(body["request_code"].as_str().unwrap().starts_with("PR-"));

    let (status, listed) = call(&app, "GET", "/purchase-requests?status=waiting_for_approval", Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_capability_is_forbidden() {
    let capabilities = Arc::new(StaticCapabilities::default());
    let app = app_with(capabilities.clone()).await;

    let (status, body) = call(&app, "POST", "/purchase-requests", Some(app.buyer), Some(request_body(&app))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Missing permission: create_purchase_requests");

    capabilities.grant(app.buyer, Capability::CreatePurchaseRequests);
    let (status, _) = call(&app, "POST", "/purchase-requests", Some(app.buyer), Some(request_body(&app))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn business_errors_map_to_status_codes() {
    let app = app().await;

    let (status, body) = call(&app, "GET", &format!("/purchase-requests/{}", Uuid::new_v4()), Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let mut past = request_body(&app);
    past["bidding_deadline"] = json!(chrono::Utc::now() - chrono::Duration::hours(1));
    let (status, body) = call(&app, "POST", "/purchase-requests", Some(app.buyer), Some(past)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bidding deadline must be in the future");

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/purchase-requests/{}/status", Uuid::new_v4()),
        Some(app.buyer),
        Some(json!({ "status": "archived" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn a_supplier_can_bid_once_and_the_buyer_sees_it() {
    let app = app().await;
    let request_id = published_request(&app).await;
    let company = app.store.add_company("Acme").await;
    let supplier = app.store.add_user("sales@acme.example.com", Some(company.id)).await;

    let bid = json!({ "company_id": company.id, "description": "Ergonomic chairs" });
    let uri = format!("/purchase-requests/{}/bids", request_id);
    let (status, created) = call(&app, "POST", &uri, Some(supplier.id), Some(bid.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PENDING");

    let (status, body) = call(&app, "POST", &uri, Some(supplier.id), Some(bid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already"));

    let (status, page) = call(&app, "GET", &format!("{}?page=1&limit=5", uri), Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["company_id"], json!(company.id));

    let (status, latest) = call(&app, "GET", &format!("{}/latest", uri), Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest.as_array().unwrap().len(), 1);

    let (_, stats) = call(&app, "GET", "/bids/stats", Some(app.buyer), None).await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["pending"], 1);

    assert_eq!(app.mail.sent().len(), 1);
}

#[tokio::test]
async fn the_buyer_inbox_collects_bid_notifications() {
    let app = app().await;
    let request_id = published_request(&app).await;
    let company = app.store.add_company("Globex").await;
    let supplier = app.store.add_user("sales@globex.example.com", Some(company.id)).await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/purchase-requests/{}/bids", request_id),
        Some(supplier.id),
        Some(json!({ "company_id": company.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, inbox) = call(&app, "GET", "/notifications", Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = inbox
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"NEW_BID"));
    assert!(inbox
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["status"] == "UNREAD"));

    let (status, marked) = call(&app, "POST", "/notifications/read", Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(marked["updated"].as_u64().unwrap() >= 1);

    let (_, inbox) = call(&app, "GET", "/notifications", Some(app.buyer), None).await;
    assert!(inbox.as_array().unwrap().iter().all(|n| n["status"] == "READ"));
}

#[tokio::test]
async fn drafts_can_be_published_then_no_longer_deleted() {
    let app = app().await;
    let (status, draft) = call(&app, "POST", "/purchase-requests/drafts", Some(app.buyer), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(draft["title"], "No title");
    let id = draft["id"].as_str().unwrap();

    let (_, drafts) = call(&app, "GET", "/purchase-requests/drafts", Some(app.buyer), None).await;
    assert_eq!(drafts.as_array().unwrap().len(), 1);

    let (status, published) = call(&app, "POST", &format!("/purchase-requests/{}/publish", id), Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["status"], "SCHEDULED");

    let (status, _) = call(&app, "DELETE", &format!("/purchase-requests/{}", id), Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let code = published["request_code"].as_str().unwrap();
    let (status, found) = call(&app, "GET", &format!("/purchase-requests/code/{}", code), Some(app.buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], published["id"]);
}
