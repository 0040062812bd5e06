//! 外部预订后端
//!
//! 引擎只依赖两个调用：创建预订 (返回外部引用) 和取消预订。
//! 调用不自动重试；失败时预约状态保持不变，错误返回给调用方。

mod http;

pub use http::HttpBookingBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::error::ErrorCode;
use shared::models::ReservationRequest;
use thiserror::Error;

use crate::utils::AppError;

/// 取消原因: 客人主动取消
pub const CANCEL_REASON_GUEST: &str = "GUEST_CANCELED";
/// 取消原因: 并发审批失败后的补偿取消
pub const CANCEL_REASON_COMPENSATION: &str = "APPROVAL_CONFLICT";

/// Fields forwarded to the booking backend on approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub name: String,
    pub phone: String,
    pub table_id: String,
    pub guests: u32,
    /// YYYY-MM-DD (business timezone)
    pub date: String,
    /// HH:MM
    pub time: String,
}

impl From<&ReservationRequest> for BookingRequest {
    fn from(r: &ReservationRequest) -> Self {
        Self {
            name: r.name.clone(),
            phone: r.phone.clone(),
            table_id: r.table_id.clone(),
            guests: r.guests,
            date: r.date.clone(),
            time: r.time.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    /// 后端拒绝 (HTTP 400)
    #[error("Booking rejected: {0}")]
    Rejected(String),

    #[error("Booking service error: {0}")]
    Service(String),

    #[error("Booking service timed out")]
    Timeout,

    #[error("Booking authentication failed: {0}")]
    Auth(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Rejected(msg) => AppError::booking_rejected(msg),
            BookingError::Auth(msg) => AppError::with_message(
                ErrorCode::BookingAuthFailed,
                format!("Booking authentication failed: {}", msg),
            ),
            other => AppError::external_service(other.to_string()),
        }
    }
}

#[async_trait]
pub trait BookingBackend: Send + Sync + 'static {
    /// Create the external booking, returning its reference
    async fn create_reservation(&self, request: &BookingRequest) -> Result<String, BookingError>;

    async fn cancel_reservation(
        &self,
        external_reference: &str,
        reason_code: &str,
    ) -> Result<(), BookingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_error_mapping() {
        let err: AppError = BookingError::Rejected("table busy".into()).into();
        assert_eq!(err.code, ErrorCode::BookingRejected);

        let err: AppError = BookingError::Timeout.into();
        assert_eq!(err.code, ErrorCode::BookingServiceError);

        let err: AppError = BookingError::Auth("bad key".into()).into();
        assert_eq!(err.code, ErrorCode::BookingAuthFailed);
    }
}
