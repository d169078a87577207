use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::{cookie, jwt::JwtKeys};
use crate::error::AppError;

/// Validates the session token and yields the user ID it was issued to.
///
/// The token is read from the `token` cookie; clients that cannot hold
/// cookies may send it as `Authorization: Bearer <token>` instead.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = cookie::read_cookie(&parts.headers, cookie::SESSION_COOKIE)
            .or_else(|| {
                parts
                    .headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
            })
            .ok_or(AppError::Unauthorized)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired session token");
            AppError::Unauthorized
        })?;

        Ok(AuthUser(claims.sub))
    }
}
