use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{bounded, AppError},
    users::{PoolEntry, User, UserStore},
};

/// Scores live in (0, 900); 0 is the stored "no score" default and cannot be
/// set through this path.
pub const MAX_CREDIT_SCORE: i32 = 899;

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id.trim()).map_err(|_| {
        warn!(%id, "malformed user id");
        AppError::NotFound("User not found".into())
    })
}

pub(crate) fn check_credit_score(score: f64) -> Result<i32, AppError> {
    if !(score > 0.0 && score <= f64::from(MAX_CREDIT_SCORE)) || score.fract() != 0.0 {
        return Err(AppError::validation(
            "Invalid CIBIL score. It must be between 1 and 899.",
        ));
    }
    Ok(score as i32)
}

pub(crate) fn check_amount(amount: f64) -> Result<f64, AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::validation("Amount must be a non-negative number"));
    }
    Ok(amount)
}

#[derive(Clone)]
pub struct PoolService {
    users: Arc<dyn UserStore>,
    call_timeout: Duration,
}

impl PoolService {
    pub fn new(users: Arc<dyn UserStore>, call_timeout: Duration) -> Self {
        Self {
            users,
            call_timeout,
        }
    }

    pub async fn list(&self) -> Result<Vec<PoolEntry>, AppError> {
        bounded(self.call_timeout, "list_amounts", self.users.list_amounts()).await
    }

    pub async fn update_amount(&self, id: &str, amount: f64) -> Result<User, AppError> {
        let amount = check_amount(amount)?;
        let id = parse_id(id)?;
        let user = bounded(
            self.call_timeout,
            "update_amount",
            self.users.update_amount(id, amount),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        info!(user_id = %user.id, amount, "requested amount updated");
        Ok(user)
    }

    pub async fn update_credit_score(&self, id: &str, score: f64) -> Result<User, AppError> {
        let score = check_credit_score(score)?;
        let id = parse_id(id)?;
        let user = bounded(
            self.call_timeout,
            "update_credit_score",
            self.users.update_credit_score(id, score),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        info!(user_id = %user.id, score, "credit score updated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{MemoryUserStore, NewUser};
    use time::{Duration as TimeDuration, OffsetDateTime};

    async fn seeded() -> (PoolService, User) {
        let store = Arc::new(MemoryUserStore::new());
        let user = store
            .create(NewUser {
                username: "alice".into(),
                email: "a@x.com".into(),
                password_hash: "hash".into(),
                verify_token: "t".into(),
                verify_token_expiry: OffsetDateTime::now_utc() + TimeDuration::hours(1),
            })
            .await
            .unwrap();
        (PoolService::new(store, Duration::from_secs(1)), user)
    }

    #[test]
    fn credit_score_range() {
        for bad in [0.0, -5.0, 900.0, 1200.0, 750.5, f64::NAN] {
            assert!(check_credit_score(bad).is_err(), "{bad}");
        }
        assert_eq!(check_credit_score(1.0).unwrap(), 1);
        assert_eq!(check_credit_score(899.0).unwrap(), MAX_CREDIT_SCORE);
    }

    #[test]
    fn amount_must_be_finite_and_non_negative() {
        assert!(check_amount(-1.0).is_err());
        assert!(check_amount(f64::INFINITY).is_err());
        assert_eq!(check_amount(0.0).unwrap(), 0.0);
        assert_eq!(check_amount(50_000.0).unwrap(), 50_000.0);
    }

    #[tokio::test]
    async fn score_is_persisted_exactly() {
        let (pool, user) = seeded().await;
        let updated = pool
            .update_credit_score(&user.id.to_string(), 742.0)
            .await
            .unwrap();
        assert_eq!(updated.credit_score, 742);
    }

    #[tokio::test]
    async fn unknown_or_malformed_id_is_not_found() {
        let (pool, _) = seeded().await;
        let err = pool
            .update_amount(&Uuid::new_v4().to_string(), 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = pool.update_amount("64f0c0ffee", 10.0).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_reflects_amount_updates() {
        let (pool, user) = seeded().await;
        pool.update_amount(&user.id.to_string(), 25_000.0).await.unwrap();
        let rows = pool.list().await.unwrap();
        assert_eq!(
            rows,
            vec![PoolEntry {
                username: "alice".into(),
                requested_amount: 25_000.0
            }]
        );
    }
}
