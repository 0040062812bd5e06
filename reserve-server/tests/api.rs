mod common;

use axum::Router;
use axum::body::Body;
use common::*;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use reserve_server::api::build_router;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn app(h: &Harness) -> Router {
    build_router(h.state.clone())
}

#[tokio::test]
async fn health_reports_pending_jobs() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let app = app(&h);

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending_jobs"], 0);
}

#[tokio::test]
async fn draft_flow_and_approval() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let app = app(&h);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/drafts/42/start",
        Some(json!({ "name": "Ivan" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ivan");

    let (status, body) = call(&app, Method::POST, "/api/drafts/42/submit", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 4003);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/drafts/42/phone",
        Some(json!({ "phone": "+7 900 000-00-00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/drafts/42/table",
        Some(json!({
            "table": "3",
            "table_id": "tbl-3",
            "date": "2024-06-01",
            "time": "20:30",
            "guests": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::POST, "/api/drafts/42/submit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PENDING");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = call(&app, Method::GET, "/api/drafts/42", None).await;
    assert!(body["data"].is_null());

    let (_, body) = call(&app, Method::GET, "/api/reservations/pending", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], id.as_str());

    let uri = format!("/api/reservations/{}/approve", id);
    let (status, body) = call(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CONFIRMED");
    assert_eq!(body["data"]["external_reference"], "ext-1");

    let (status, body) = call(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 4002);

    let (_, body) = call(&app, Method::GET, "/api/users/42/reservations", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(body["pending_jobs"], 1);
}

#[tokio::test]
async fn invalid_draft_time_is_rejected() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let app = app(&h);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/drafts/42",
        Some(json!({ "time": "25:99" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_reservation_is_not_found() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let app = app(&h);

    let (status, body) = call(&app, Method::GET, "/api/reservations/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 4001);

    let (status, _) = call(&app, Method::POST, "/api/reservations/nope/reject", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_by_another_user_is_forbidden() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let record = h.submit(GUEST, "2024-06-01", "19:00").await;
    h.state.controller.approve(&record.id).await.unwrap();
    let app = app(&h);

    let uri = format!("/api/reservations/{}/cancel", record.id);
    let (status, _) = call(&app, Method::POST, &uri, Some(json!({ "user_id": 7 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, &uri, Some(json!({ "user_id": GUEST }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.booking.cancels().len(), 1);
}

#[tokio::test]
async fn operator_view_registration() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let app = app(&h);
    let view = json!({ "chat_id": 900, "message_id": 17, "page": 1 });

    let (status, _) = call(&app, Method::PUT, "/api/operators/5/view", Some(view.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::PUT, "/api/operators/900/view", Some(view)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, Method::GET, "/api/operators/900", None).await;
    assert_eq!(body["data"]["is_operator"], true);
    assert_eq!(body["data"]["view"]["message_id"], 17);

    let (status, _) = call(&app, Method::DELETE, "/api/operators/900/view", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.state.views.get(900).is_none());
}

#[tokio::test]
async fn declined_reservation_shows_in_follow_up() {
    let h = Harness::in_memory(msk("2024-06-01", "10:00"));
    let app = app(&h);
    let record = h.submit(GUEST, "2024-06-01", "19:00").await;
    h.state.controller.approve(&record.id).await.unwrap();

    let (_, body) = call(&app, Method::GET, "/api/reservations/follow-up", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    h.set_time("2024-06-01", "17:00");
    h.run_due().await;
    let (_, body) = call(&app, Method::GET, "/api/users/42/reservations", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let uri = format!("/api/reservations/{}/attendance", record.id);
    let (status, _) = call(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "user_id": GUEST, "attending": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/api/reservations/follow-up", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], record.id.as_str());
    assert_eq!(body["data"][0]["status"], "DECLINED");
}
