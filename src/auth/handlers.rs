use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            EmailRequest, LoginRequest, MeResponse, MessageResponse, ResetPasswordRequest,
            SignupRequest, SignupResponse, TokenRequest,
        },
        extractors::AuthUser,
        services::AuthService,
    },
    error::{AppError, JsonBody},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", get(logout))
        .route("/users/verifyemail", post(verify_email))
        .route("/users/resend-verification", post(resend_verification))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/resetemail", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[instrument(skip(auth, payload))]
pub async fn signup(
    State(auth): State<AuthService>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<Json<SignupResponse>, AppError> {
    let user = auth.signup(payload).await?;
    Ok(Json(SignupResponse {
        message: "User created successfully".into(),
        success: true,
        user: user.into(),
    }))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (_, token) = auth.login(payload).await?;
    Ok((
        [(SET_COOKIE, auth.session_cookie(&token))],
        Json(MessageResponse::ok("Login successful")),
    ))
}

#[instrument(skip(auth))]
pub async fn logout(State(auth): State<AuthService>) -> impl IntoResponse {
    (
        [(SET_COOKIE, auth.cleared_cookie())],
        Json(MessageResponse::ok("Logout successful")),
    )
}

#[instrument(skip(auth, payload))]
pub async fn verify_email(
    State(auth): State<AuthService>,
    JsonBody(payload): JsonBody<TokenRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.verify_email(&payload.token).await?;
    Ok(Json(MessageResponse::ok("Email verified successfully")))
}

#[instrument(skip(auth, payload))]
pub async fn resend_verification(
    State(auth): State<AuthService>,
    JsonBody(payload): JsonBody<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.resend_verification(&payload.email).await?;
    Ok(Json(MessageResponse::ok("Verification email sent")))
}

#[instrument(skip(auth, payload))]
pub async fn forgot_password(
    State(auth): State<AuthService>,
    JsonBody(payload): JsonBody<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.forgot_password(&payload.email).await?;
    Ok(Json(MessageResponse::ok("Email sent")))
}

#[instrument(skip(auth, payload))]
pub async fn reset_password(
    State(auth): State<AuthService>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.reset_password(&payload.token, payload.password).await?;
    Ok(Json(MessageResponse::ok("Password reset successfully")))
}

#[instrument(skip(auth))]
pub async fn get_me(
    State(auth): State<AuthService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = auth.current_user(user_id).await?;
    Ok(Json(MeResponse { user: user.into() }))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::auth::dto::PublicUser;

    #[test]
    fn me_response_hides_credentials() {
        let response = MeResponse {
            user: PublicUser {
                id: uuid::Uuid::new_v4(),
                username: "alice".into(),
                email: "test@example.com".into(),
                is_verified: true,
                requested_amount: 2500.0,
                credit_score: 720,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["user"]["email"], "test@example.com");
        assert_eq!(json["user"]["isVerified"], true);
        assert_eq!(json["user"]["creditScore"], 720);
        assert!(json["user"].get("passwordHash").is_none());
        assert!(json["user"].get("password_hash").is_none());
    }
}
