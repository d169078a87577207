use serde::{Deserialize, Serialize};

use crate::{auth::dto::PublicUser, users::PoolEntry};

/// Ids arrive as strings; anything that is not a UUID names no user.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub id: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditScoreRequest {
    pub id: String,
    pub cibil_score: f64,
}

#[derive(Debug, Serialize)]
pub struct CreditScoreResponse {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub users: Vec<PoolEntry>,
}
