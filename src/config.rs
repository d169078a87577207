use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
}

/// Lifetimes of the single-use tokens sent by email.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPolicy {
    pub verify_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Public base URL the links in outgoing mail point at.
    pub domain: String,
    pub from: String,
    /// `None` selects the logging mailer.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` only when `USE_MEMORY_STORE=true`; users then live in process
    /// memory.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub tokens: TokenPolicy,
    pub mail: MailConfig,
    pub external_call_timeout_secs: u64,
    pub require_verified_login: bool,
}

/// `DATABASE_URL` is required unless the in-memory store is asked for
/// explicitly.
fn database_url(use_memory_store: bool, url: Option<String>) -> anyhow::Result<Option<String>> {
    if use_memory_store {
        return Ok(None);
    }
    url.filter(|v| !v.trim().is_empty())
        .map(Some)
        .context("DATABASE_URL must be set (or USE_MEMORY_STORE=true for local runs)")
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = database_url(
            env_or("USE_MEMORY_STORE", false),
            std::env::var("DATABASE_URL").ok(),
        )?;
        let jwt = JwtConfig {
            secret: std::env::var("TOKEN_SECRET").context("TOKEN_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "loanverse".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "loanverse-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24),
        };
        let cookie = CookieConfig {
            secure: env_or("COOKIE_SECURE", true),
        };
        let tokens = TokenPolicy {
            verify_ttl_minutes: env_or("VERIFY_TOKEN_TTL_MINUTES", 60),
            reset_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 60),
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host,
                port: env_or("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").context("SMTP_USERNAME must be set")?,
                password: std::env::var("SMTP_PASSWORD").context("SMTP_PASSWORD must be set")?,
            }),
            _ => None,
        };
        let mail = MailConfig {
            domain: std::env::var("DOMAIN")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Loanverse <no-reply@loanverse.local>".into()),
            smtp,
        };

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
            database_url,
            jwt,
            cookie,
            tokens,
            mail,
            external_call_timeout_secs: env_or("EXTERNAL_CALL_TIMEOUT_SECS", 10),
            require_verified_login: env_or("REQUIRE_VERIFIED_LOGIN", false),
        })
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }

    /// Settings used by unit and router tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            cookie: CookieConfig { secure: true },
            tokens: TokenPolicy {
                verify_ttl_minutes: 60,
                reset_ttl_minutes: 60,
            },
            mail: MailConfig {
                domain: "http://localhost:3000".into(),
                from: "Loanverse <no-reply@loanverse.local>".into(),
                smtp: None,
            },
            external_call_timeout_secs: 2,
            require_verified_login: false,
        }
    }
}
