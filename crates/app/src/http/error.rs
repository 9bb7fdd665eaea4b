use axum::http::StatusCode;
use domain::Error;
use tracing::error;

pub type ApiError = (StatusCode, String);

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotLoggedIn => StatusCode::UNAUTHORIZED,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::PermissionDenied(_) | Error::Blocked => StatusCode::FORBIDDEN,
        Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Conflict | Error::InFlight => StatusCode::CONFLICT,
        Error::Upload(_) => StatusCode::BAD_GATEWAY,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Carries the same text the screen would have put in its alert.
pub fn reject(err: Error) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (status, err.user_message())
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_denied_are_forbidden() {
        assert_eq!(status_for(&Error::Blocked), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&Error::PermissionDenied("x".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn signed_out_is_unauthorized_with_alert_text() {
        let (status, body) = reject(Error::NotLoggedIn);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, Error::NotLoggedIn.user_message());
    }

    #[test]
    fn in_flight_is_a_conflict() {
        assert_eq!(status_for(&Error::InFlight), StatusCode::CONFLICT);
    }
}
