use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{AuthError, FileOpError, PathError, SfsearchError};

/// Every failed request serialises as `{ "error": "<message>" }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.body.error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Missing | AuthError::InvalidOrExpired => StatusCode::FORBIDDEN,
        };
        Self::new(status, err.to_string())
    }
}

impl From<SfsearchError> for ApiError {
    fn from(err: SfsearchError) -> Self {
        let status = match &err {
            SfsearchError::Auth(auth) => return auth.clone().into(),
            SfsearchError::Path(PathError::InvalidPath) => StatusCode::NOT_FOUND,
            SfsearchError::Path(_) => StatusCode::FORBIDDEN,
            SfsearchError::FileOp(FileOpError::Unreadable) => StatusCode::FORBIDDEN,
            SfsearchError::FileOp(FileOpError::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            SfsearchError::QueryTooShort => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let err: ApiError = AuthError::Unauthenticated.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let err: ApiError = AuthError::Missing.into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Missing CSRF token");

        let err: ApiError = SfsearchError::from(PathError::TypeNotAllowed).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "File type not allowed");

        let err: ApiError = SfsearchError::from(FileOpError::TooLarge).into();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let err: ApiError = SfsearchError::from(FileOpError::BackupFailed("nope".into())).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "nope");
    }
}
