use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AmountRequest, CreditScoreRequest, CreditScoreResponse, PoolResponse},
    services::PoolService,
};
use crate::{
    auth::dto::MessageResponse,
    error::{AppError, JsonBody},
    state::AppState,
};

pub fn pool_routes() -> Router<AppState> {
    Router::new()
        .route("/users/totalamounts", get(list_amounts))
        .route("/users/amount", post(update_amount))
        .route("/users/savecibil", post(save_credit_score))
}

#[instrument(skip(pool))]
pub async fn list_amounts(State(pool): State<PoolService>) -> Result<Json<PoolResponse>, AppError> {
    let users = pool.list().await?;
    Ok(Json(PoolResponse { users }))
}

#[instrument(skip(pool))]
pub async fn update_amount(
    State(pool): State<PoolService>,
    JsonBody(payload): JsonBody<AmountRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    pool.update_amount(&payload.id, payload.amount).await?;
    Ok(Json(MessageResponse::ok("Amount updated successfully")))
}

#[instrument(skip(pool))]
pub async fn save_credit_score(
    State(pool): State<PoolService>,
    JsonBody(payload): JsonBody<CreditScoreRequest>,
) -> Result<Json<CreditScoreResponse>, AppError> {
    let user = pool
        .update_credit_score(&payload.id, payload.cibil_score)
        .await?;
    Ok(Json(CreditScoreResponse {
        message: "CIBIL score updated successfully".into(),
        user: user.into(),
    }))
}
