use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, PoolEntry, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username or email already taken")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Backend(err.into()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records.
///
/// The `consume_*` methods must be atomic: a token matches at most one
/// caller, and a matched token is cleared in the same step. A token that
/// matches but has expired is cleared too and reported as no match.
///
/// The `set_*_token` methods return `false` when no row was updated.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Any user holding either the username or the email.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>>;
    async fn create(&self, new: NewUser) -> StoreResult<User>;

    /// Only unverified users take a verify token.
    async fn set_verify_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> StoreResult<bool>;
    /// Marks the holder of an unexpired verify token as verified.
    async fn consume_verify_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> StoreResult<bool>;
    /// Replaces the password of the holder of an unexpired reset token.
    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>>;

    async fn update_amount(&self, id: Uuid, amount: f64) -> StoreResult<Option<User>>;
    async fn update_credit_score(&self, id: Uuid, score: i32) -> StoreResult<Option<User>>;
    async fn list_amounts(&self) -> StoreResult<Vec<PoolEntry>>;
}

const USER_COLUMNS: &str = "id, username, email, password_hash, is_verified, \
     verify_token, verify_token_expiry, reset_token, reset_token_expiry, \
     requested_amount, credit_score, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, verify_token, verify_token_expiry)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.verify_token)
            .bind(new.verify_token_expiry)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn set_verify_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users SET verify_token = $2, verify_token_expiry = $3
            WHERE id = $1 AND is_verified = FALSE
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expiry)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn consume_verify_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET is_verified = TRUE, verify_token = NULL, verify_token_expiry = NULL
             WHERE verify_token = $1 AND verify_token_expiry > $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE users SET verify_token = NULL, verify_token_expiry = NULL
             WHERE verify_token = $1 AND verify_token_expiry <= $2
            "#,
        )
        .bind(token)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users SET reset_token = $2, reset_token_expiry = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expiry)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET password_hash = $2, reset_token = NULL, reset_token_expiry = NULL
             WHERE reset_token = $1 AND reset_token_expiry > $3
            RETURNING {USER_COLUMNS}
            "#
        );
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE users SET reset_token = NULL, reset_token_expiry = NULL
             WHERE reset_token = $1 AND reset_token_expiry <= $2
            "#,
        )
        .bind(token)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .bind(new_password_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn update_amount(&self, id: Uuid, amount: f64) -> StoreResult<Option<User>> {
        let sql =
            format!("UPDATE users SET requested_amount = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(amount)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn update_credit_score(&self, id: Uuid, score: i32) -> StoreResult<Option<User>> {
        let sql =
            format!("UPDATE users SET credit_score = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(score)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn list_amounts(&self) -> StoreResult<Vec<PoolEntry>> {
        let rows = sqlx::query_as::<_, PoolEntry>(
            r#"
            SELECT username, requested_amount
              FROM users
             ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
