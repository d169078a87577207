use std::{future::Future, time::Duration};

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::users::StoreError;

/// Every failure a route can report. The response body is always
/// `{"message": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// The token was stored but the email carrying it was not sent.
    #[error("{0}")]
    DeliveryFailed(String),

    #[error("Internal Server Error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::EmailNotVerified => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AppError::Conflict("Username or email already exists".into()),
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

/// Runs a call to an external collaborator under a deadline. A hung store
/// surfaces as an internal error instead of hanging the request.
pub async fn bounded<T, E, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    AppError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(AppError::from),
        Err(_) => {
            tracing::error!(call = what, ?limit, "external call timed out");
            Err(AppError::Internal(anyhow::anyhow!("{what} timed out")))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            tracing::error!(error = ?e, "internal error");
        }
        let body = Json(serde_json::json!({ "message": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// `Json` that reports malformed bodies as a 400 with the usual error shape.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::Validation(e.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::InvalidOrExpiredToken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::DeliveryFailed("x".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn bounded_times_out_hung_calls() {
        let hung = std::future::pending::<Result<(), StoreError>>();
        let err = bounded(Duration::from_millis(10), "test call", hung).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let dup = async { Err::<(), _>(StoreError::Duplicate) };
        let err = bounded(Duration::from_secs(1), "test call", dup).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let resp = AppError::Internal(anyhow::anyhow!("db password is hunter2")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Internal Server Error");
    }
}
