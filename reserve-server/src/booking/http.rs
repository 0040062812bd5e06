//! HTTPS 预订后端客户端
//!
//! | 调用 | 路径 | 请求体 |
//! |------|------|--------|
//! | 登录 | `POST /api/1/access_token` | `{apiLogin}` → `{token}` |
//! | 创建 | `POST /api/1/reserve/create` | 见 [`CreateReserveBody`] → `{reserveInfo: {id}}` |
//! | 取消 | `POST /api/1/reserve/cancel` | `{organizationId, reserveId, cancelReason}` |
//!
//! Bearer token 缓存在内存中；缺失或收到 401 时重新登录并重试一次。

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{BookingBackend, BookingError, BookingRequest};
use crate::core::BookingConfig;

const TOKEN_PATH: &str = "/api/1/access_token";
const CREATE_PATH: &str = "/api/1/reserve/create";
const CANCEL_PATH: &str = "/api/1/reserve/cancel";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody<'a> {
    api_login: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct Customer<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Guests {
    count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateReserveBody<'a> {
    organization_id: &'a str,
    terminal_group_id: &'a str,
    customer: Customer<'a>,
    phone: &'a str,
    guests: Guests,
    table_ids: Vec<&'a str>,
    /// "YYYY-MM-DD HH:MM:SS.fff" (business timezone)
    estimated_start_time: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelReserveBody<'a> {
    organization_id: &'a str,
    reserve_id: &'a str,
    cancel_reason: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveInfo {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReserveResponse {
    reserve_info: ReserveInfo,
}

pub struct HttpBookingBackend {
    client: Client,
    config: BookingConfig,
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for HttpBookingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBookingBackend")
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

fn transport_error(e: reqwest::Error) -> BookingError {
    if e.is_timeout() {
        BookingError::Timeout
    } else {
        BookingError::Service(e.to_string())
    }
}

impl HttpBookingBackend {
    pub fn new(config: BookingConfig) -> Result<Self, BookingError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BookingError::Service(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn login(&self) -> Result<String, BookingError> {
        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .json(&TokenBody {
                api_login: &self.config.api_key,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BookingError::Auth(format!("status {status}: {body}")));
        }

        let TokenResponse { token } = response
            .json()
            .await
            .map_err(|e| BookingError::Auth(format!("Invalid token response: {e}")))?;

        *self.token.write() = Some(token.clone());
        tracing::debug!("Booking backend token refreshed");
        Ok(token)
    }

    async fn current_token(&self) -> Result<String, BookingError> {
        let cached = self.token.read().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    /// POST with bearer auth; a 401 triggers one re-login and retry
    async fn post_authorized<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, BookingError> {
        let token = self.current_token().await?;
        let response = self.send(path, &token, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        tracing::info!(path, "Booking token rejected, refreshing");
        *self.token.write() = None;
        let token = self.login().await?;
        let response = self.send(path, &token, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(BookingError::Auth("token rejected after refresh".into()));
        }
        check_status(response).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<reqwest::Response, BookingError> {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BookingError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::BAD_REQUEST {
        Err(BookingError::Rejected(body))
    } else {
        Err(BookingError::Service(format!("status {status}: {body}")))
    }
}

#[async_trait]
impl BookingBackend for HttpBookingBackend {
    async fn create_reservation(&self, request: &BookingRequest) -> Result<String, BookingError> {
        let body = CreateReserveBody {
            organization_id: &self.config.organization_id,
            terminal_group_id: &self.config.terminal_group_id,
            customer: Customer {
                name: &request.name,
            },
            phone: &request.phone,
            guests: Guests {
                count: request.guests,
            },
            table_ids: vec![request.table_id.as_str()],
            estimated_start_time: format!("{} {}:00.000", request.date, request.time),
        };

        let response = self.post_authorized(CREATE_PATH, &body).await?;
        let created: CreateReserveResponse = response
            .json()
            .await
            .map_err(|e| BookingError::Service(format!("Invalid create response: {e}")))?;

        tracing::info!(external_reference = %created.reserve_info.id, "External booking created");
        Ok(created.reserve_info.id)
    }

    async fn cancel_reservation(
        &self,
        external_reference: &str,
        reason_code: &str,
    ) -> Result<(), BookingError> {
        let body = CancelReserveBody {
            organization_id: &self.config.organization_id,
            reserve_id: external_reference,
            cancel_reason: reason_code,
        };
        self.post_authorized(CANCEL_PATH, &body).await?;
        tracing::info!(external_reference, reason_code, "External booking canceled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockBackend {
        logins: AtomicUsize,
        /// Number of upcoming create calls answered with 401
        expire_next: AtomicUsize,
        create_status: parking_lot::Mutex<Option<u16>>,
        last_create: parking_lot::Mutex<Option<Value>>,
        delay_ms: AtomicUsize,
    }

    async fn token(State(mock): State<Arc<MockBackend>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body["apiLogin"] != "key" {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let n = mock.logins.fetch_add(1, Ordering::SeqCst) + 1;
        (StatusCode::OK, Json(json!({"token": format!("t{n}")})))
    }

    async fn create(
        State(mock): State<Arc<MockBackend>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let delay = mock.delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Bearer t"))
        {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }
        if mock
            .expire_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }
        *mock.last_create.lock() = Some(body);
        match *mock.create_status.lock() {
            Some(code) => (
                StatusCode::from_u16(code).unwrap(),
                Json(json!({"description": "table is busy"})),
            ),
            None => (StatusCode::OK, Json(json!({"reserveInfo": {"id": "ext-1"}}))),
        }
    }

    async fn cancel(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        assert_eq!(body["reserveId"], "ext-1");
        (StatusCode::OK, Json(json!({})))
    }

    async fn start(mock: Arc<MockBackend>, timeout_ms: u64) -> HttpBookingBackend {
        let app = Router::new()
            .route(TOKEN_PATH, post(token))
            .route(CREATE_PATH, post(create))
            .route(CANCEL_PATH, post(cancel))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        HttpBookingBackend::new(BookingConfig {
            api_url: format!("http://{addr}/"),
            api_key: "key".into(),
            organization_id: "org".into(),
            terminal_group_id: "tg".into(),
            timeout_ms,
        })
        .unwrap()
    }

    fn request() -> BookingRequest {
        BookingRequest {
            name: "Ivan".into(),
            phone: "+79000000000".into(),
            table_id: "tbl-5".into(),
            guests: 4,
            date: "2024-06-01".into(),
            time: "19:00".into(),
        }
    }

    #[tokio::test]
    async fn test_create_caches_token() {
        let mock = Arc::new(MockBackend::default());
        let backend = start(mock.clone(), 2_000).await;

        assert_eq!(backend.create_reservation(&request()).await.unwrap(), "ext-1");
        assert_eq!(backend.create_reservation(&request()).await.unwrap(), "ext-1");
        assert_eq!(mock.logins.load(Ordering::SeqCst), 1);

        let body = mock.last_create.lock().clone().unwrap();
        assert_eq!(body["organizationId"], "org");
        assert_eq!(body["tableIds"][0], "tbl-5");
        assert_eq!(body["guests"]["count"], 4);
        assert_eq!(body["estimatedStartTime"], "2024-06-01 19:00:00.000");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let mock = Arc::new(MockBackend::default());
        let backend = start(mock.clone(), 2_000).await;
        backend.create_reservation(&request()).await.unwrap();

        mock.expire_next.store(1, Ordering::SeqCst);
        assert_eq!(backend.create_reservation(&request()).await.unwrap(), "ext-1");
        assert_eq!(mock.logins.load(Ordering::SeqCst), 2);

        mock.expire_next.store(2, Ordering::SeqCst);
        let err = backend.create_reservation(&request()).await.unwrap_err();
        assert!(matches!(err, BookingError::Auth(_)));
    }

    #[tokio::test]
    async fn test_bad_request_is_rejection() {
        let mock = Arc::new(MockBackend::default());
        *mock.create_status.lock() = Some(400);
        let backend = start(mock, 2_000).await;

        let err = backend.create_reservation(&request()).await.unwrap_err();
        match err {
            BookingError::Rejected(body) => assert!(body.contains("table is busy")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_service_error() {
        let mock = Arc::new(MockBackend::default());
        *mock.create_status.lock() = Some(503);
        let backend = start(mock, 2_000).await;

        let err = backend.create_reservation(&request()).await.unwrap_err();
        assert!(matches!(err, BookingError::Service(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock = Arc::new(MockBackend::default());
        mock.delay_ms.store(500, Ordering::SeqCst);
        let backend = start(mock, 100).await;
        // login is fast, create is slow
        let err = backend.create_reservation(&request()).await.unwrap_err();
        assert!(matches!(err, BookingError::Timeout));
    }

    #[tokio::test]
    async fn test_cancel() {
        let mock = Arc::new(MockBackend::default());
        let backend = start(mock, 2_000).await;
        backend.cancel_reservation("ext-1", "GUEST_CANCELED").await.unwrap();
    }
}
