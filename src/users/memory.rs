use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreResult, UserStore};
use super::repo_types::{NewUser, PoolEntry, User};

/// `UserStore` kept in process memory. A single write lock makes every
/// mutation atomic, matching the conditional updates of the Postgres store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the stored record wholesale. Tests use it to age tokens.
    #[cfg(test)]
    pub async fn put(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(super::repo::StoreError::Duplicate);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            is_verified: false,
            verify_token: Some(new.verify_token),
            verify_token_expiry: Some(new.verify_token_expiry),
            reset_token: None,
            reset_token_expiry: None,
            requested_amount: 0.0,
            credit_score: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_verify_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> StoreResult<bool> {
        match self.users.write().await.get_mut(&id) {
            Some(u) if !u.is_verified => {
                u.verify_token = Some(token.to_string());
                u.verify_token_expiry = Some(expiry);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_verify_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        let Some(u) = users
            .values_mut()
            .find(|u| u.verify_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        let live = u.verify_token_expiry.is_some_and(|exp| exp > now);
        u.verify_token = None;
        u.verify_token_expiry = None;
        if !live {
            return Ok(None);
        }
        u.is_verified = true;
        Ok(Some(u.clone()))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> StoreResult<bool> {
        match self.users.write().await.get_mut(&id) {
            Some(u) => {
                u.reset_token = Some(token.to_string());
                u.reset_token_expiry = Some(expiry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        let Some(u) = users
            .values_mut()
            .find(|u| u.reset_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        let live = u.reset_token_expiry.is_some_and(|exp| exp > now);
        u.reset_token = None;
        u.reset_token_expiry = None;
        if !live {
            return Ok(None);
        }
        u.password_hash = new_password_hash.to_string();
        Ok(Some(u.clone()))
    }

    async fn update_amount(&self, id: Uuid, amount: f64) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.requested_amount = amount;
            u.clone()
        }))
    }

    async fn update_credit_score(&self, id: Uuid, score: i32) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.credit_score = score;
            u.clone()
        }))
    }

    async fn list_amounts(&self) -> StoreResult<Vec<PoolEntry>> {
        let users = self.users.read().await;
        let mut rows: Vec<&User> = users.values().collect();
        rows.sort_by_key(|u| u.created_at);
        Ok(rows
            .into_iter()
            .map(|u| PoolEntry {
                username: u.username.clone(),
                requested_amount: u.requested_amount,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::StoreError;
    use time::Duration;

    fn new_user(name: &str, email: &str, token: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            verify_token: token.into(),
            verify_token_expiry: OffsetDateTime::now_utc() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username_or_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("alice", "a@x.com", "t1")).await.unwrap();

        let err = store.create(new_user("alice", "other@x.com", "t2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
        let err = store.create(new_user("bob", "a@x.com", "t3")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[tokio::test]
    async fn verify_token_is_consumed_once() {
        let store = MemoryUserStore::new();
        store.create(new_user("alice", "a@x.com", "tok")).await.unwrap();
        let now = OffsetDateTime::now_utc();

        let user = store.consume_verify_token("tok", now).await.unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.verify_token.is_none());
        assert!(store.consume_verify_token("tok", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_reset_token_does_not_match() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("alice", "a@x.com", "tok")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(user.id, "reset", now - Duration::seconds(1))
            .await
            .unwrap();

        let hit = store.consume_reset_token("reset", "new-hash", now).await.unwrap();
        assert!(hit.is_none());
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "hash");
        assert!(stored.reset_token.is_none());
        assert!(stored.reset_token_expiry.is_none());
    }

    #[tokio::test]
    async fn expired_verify_token_is_cleared_without_verifying() {
        let store = MemoryUserStore::new();
        let mut user = store.create(new_user("alice", "a@x.com", "tok")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        user.verify_token_expiry = Some(now - Duration::seconds(1));
        store.put(user.clone()).await;

        assert!(store.consume_verify_token("tok", now).await.unwrap().is_none());
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(!stored.is_verified);
        assert!(stored.verify_token.is_none());
        assert!(stored.verify_token_expiry.is_none());
    }

    #[tokio::test]
    async fn verified_user_takes_no_verify_token() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("alice", "a@x.com", "tok")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store.consume_verify_token("tok", now).await.unwrap().unwrap();

        let set = store
            .set_verify_token(user.id, "late", now + Duration::hours(1))
            .await
            .unwrap();
        assert!(!set);
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.verify_token.is_none());
    }

    #[tokio::test]
    async fn setting_tokens_on_missing_user_reports_no_update() {
        let store = MemoryUserStore::new();
        let expiry = OffsetDateTime::now_utc() + Duration::hours(1);
        assert!(!store.set_verify_token(Uuid::new_v4(), "tok", expiry).await.unwrap());
        assert!(!store.set_reset_token(Uuid::new_v4(), "tok", expiry).await.unwrap());
    }
}
