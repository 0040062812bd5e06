//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound | Self::ReservationNotFound => StatusCode::NOT_FOUND,

            Self::ReservationConflict => StatusCode::CONFLICT,

            Self::ReservationNotOwned => StatusCode::FORBIDDEN,

            // 502: upstream booking service misbehaved
            Self::BookingServiceError | Self::BookingAuthFailed => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TransientStoreError => StatusCode::SERVICE_UNAVAILABLE,

            Self::InternalError | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (validation, incomplete drafts, backend rejections)
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::RequiredField
            | Self::DraftIncomplete
            | Self::BookingRejected => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ReservationNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(
            ErrorCode::ReservationConflict.http_status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_upstream_status() {
        assert_eq!(
            ErrorCode::BookingServiceError.http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::BookingRejected.http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_service_unavailable_status() {
        assert_eq!(
            ErrorCode::TransientStoreError.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
