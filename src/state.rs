use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{AuthService, AuthSettings, JwtKeys};
use crate::config::AppConfig;
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::pool::PoolService;
use crate::users::{MemoryUserStore, PgUserStore, UserStore};

/// Process-wide state, built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub pool: PoolService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .acquire_timeout(config.external_call_timeout())
                    .connect(url)
                    .await
                    .context("connect to database")?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db))
            }
            None => {
                tracing::warn!("USE_MEMORY_STORE set; users are kept in memory and lost on exit");
                Arc::new(MemoryUserStore::new())
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.mail.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(
                smtp,
                &config.mail.from,
                config.external_call_timeout(),
            )?),
            None => {
                tracing::warn!("SMTP_HOST not set; verification and reset links are only logged");
                Arc::new(LogMailer)
            }
        };

        Ok(Self::from_parts(Arc::new(config), users, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let auth = AuthService::new(
            users.clone(),
            mailer,
            JwtKeys::from(&config.jwt),
            AuthSettings::from(config.as_ref()),
        );
        let pool = PoolService::new(users, config.external_call_timeout());
        Self { config, auth, pool }
    }

    /// State over an in-memory store and a recording mailer, with handles
    /// to both for assertions.
    #[cfg(test)]
    pub fn fake() -> (
        Self,
        Arc<MemoryUserStore>,
        Arc<crate::mail::testing::RecordingMailer>,
    ) {
        let store = Arc::new(MemoryUserStore::new());
        let mailer = Arc::new(crate::mail::testing::RecordingMailer::default());
        let state = Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            store.clone(),
            mailer.clone(),
        );
        (state, store, mailer)
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for PoolService {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.auth.keys().clone()
    }
}
