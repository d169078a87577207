use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    cookie,
    dto::{LoginRequest, SignupRequest},
    jwt::JwtKeys,
    password::{
        hash_password_blocking, verify_against_dummy, verify_password_blocking,
        MIN_PASSWORD_LEN,
    },
    tokens::{self, OneTimeToken},
};
use crate::{
    config::{AppConfig, TokenPolicy},
    error::{bounded, AppError},
    mail::{templates, MailKind, Mailer},
    users::{NewUser, User, UserStore},
};

const MIN_USERNAME_LEN: usize = 3;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Settings the auth flows read on every request.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub tokens: TokenPolicy,
    pub link_domain: String,
    pub call_timeout: Duration,
    pub require_verified_login: bool,
    pub cookie_secure: bool,
}

impl From<&AppConfig> for AuthSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            tokens: cfg.tokens.clone(),
            link_domain: cfg.mail.domain.clone(),
            call_timeout: cfg.external_call_timeout(),
            require_verified_login: cfg.require_verified_login,
            cookie_secure: cfg.cookie.secure,
        }
    }
}

/// Signup, login, email verification and password reset over injected
/// collaborators.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
    settings: Arc<AuthSettings>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        keys: JwtKeys,
        settings: AuthSettings,
    ) -> Self {
        Self {
            users,
            mailer,
            keys,
            settings: Arc::new(settings),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn session_cookie(&self, token: &str) -> String {
        cookie::session_cookie(token, self.keys.ttl, self.settings.cookie_secure)
    }

    pub fn cleared_cookie(&self) -> String {
        cookie::cleared_cookie(self.settings.cookie_secure)
    }

    /// Creates an unverified account and mails its verification link.
    pub async fn signup(&self, req: SignupRequest) -> Result<User, AppError> {
        let username = req.username.trim().to_string();
        let email = normalize_email(&req.email);

        if username.chars().count() < MIN_USERNAME_LEN {
            warn!("username too short");
            return Err(AppError::validation(format!(
                "Username must be at least {MIN_USERNAME_LEN} characters"
            )));
        }
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AppError::validation("Invalid email"));
        }
        check_password(&req.password)?;

        let taken = bounded(
            self.settings.call_timeout,
            "find_by_username_or_email",
            self.users.find_by_username_or_email(&username, &email),
        )
        .await?;
        if taken.is_some() {
            warn!(%username, %email, "signup with existing username or email");
            return Err(AppError::Conflict("Username or email already exists".into()));
        }

        let password_hash = hash_password_blocking(req.password).await?;
        let verify = OneTimeToken::issue(
            self.settings.tokens.verify_ttl_minutes,
            OffsetDateTime::now_utc(),
        );
        let new = NewUser {
            username,
            email,
            password_hash,
            verify_token: verify.value.clone(),
            verify_token_expiry: verify.expires_at,
        };
        // A concurrent signup that passed the check above is caught here as a
        // unique violation and reported as Conflict too.
        let user = bounded(self.settings.call_timeout, "create", self.users.create(new)).await?;
        info!(user_id = %user.id, "user registered");

        self.dispatch(&user.email, MailKind::Verify, &verify.value).await?;
        Ok(user)
    }

    /// Consumes a verification token. Unknown and expired tokens are the same
    /// outcome.
    pub async fn verify_email(&self, token: &str) -> Result<User, AppError> {
        let token = token.trim();
        if !tokens::is_well_formed(token) {
            warn!("malformed verify token");
            return Err(AppError::InvalidOrExpiredToken);
        }
        let user = bounded(
            self.settings.call_timeout,
            "consume_verify_token",
            self.users
                .consume_verify_token(token, OffsetDateTime::now_utc()),
        )
        .await?
        .ok_or_else(|| {
            warn!("verify token did not match");
            AppError::InvalidOrExpiredToken
        })?;
        info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// Issues a fresh verify token for an unverified account, replacing any
    /// earlier one. This is the retry path after a failed delivery.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let user = self.require_by_email(&email).await?;
        if user.is_verified {
            return Err(AppError::validation("Email is already verified"));
        }
        let verify = OneTimeToken::issue(
            self.settings.tokens.verify_ttl_minutes,
            OffsetDateTime::now_utc(),
        );
        let issued = bounded(
            self.settings.call_timeout,
            "set_verify_token",
            self.users
                .set_verify_token(user.id, &verify.value, verify.expires_at),
        )
        .await?;
        if !issued {
            // Verified or removed since the lookup above.
            let current = self.current_user(user.id).await?;
            warn!(user_id = %current.id, "verify token not reissued");
            return Err(AppError::validation("Email is already verified"));
        }
        info!(user_id = %user.id, "verify token reissued");
        self.dispatch(&user.email, MailKind::Verify, &verify.value).await
    }

    /// Checks credentials and signs a session token. Unknown email and wrong
    /// password are indistinguishable to the caller.
    pub async fn login(&self, req: LoginRequest) -> Result<(User, String), AppError> {
        let email = normalize_email(&req.email);
        let found = bounded(
            self.settings.call_timeout,
            "find_by_email",
            self.users.find_by_email(&email),
        )
        .await?;
        let Some(user) = found else {
            // Pay the same hashing cost as a wrong password.
            verify_against_dummy(req.password).await;
            warn!(%email, "login unknown email");
            return Err(AppError::Unauthorized);
        };

        let ok = verify_password_blocking(req.password, user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Unauthorized);
        }
        if self.settings.require_verified_login && !user.is_verified {
            warn!(user_id = %user.id, "login before email verification");
            return Err(AppError::EmailNotVerified);
        }

        let token = self.keys.sign(user.id).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AppError::Internal(e)
        })?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, token))
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        bounded(
            self.settings.call_timeout,
            "find_by_id",
            self.users.find_by_id(user_id),
        )
        .await?
        .ok_or_else(|| {
            warn!(%user_id, "session for missing user");
            AppError::NotFound("User not found".into())
        })
    }

    /// Stores a new reset token, invalidating any earlier one, and mails it.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let user = self.require_by_email(&email).await?;
        let reset = OneTimeToken::issue(
            self.settings.tokens.reset_ttl_minutes,
            OffsetDateTime::now_utc(),
        );
        let issued = bounded(
            self.settings.call_timeout,
            "set_reset_token",
            self.users
                .set_reset_token(user.id, &reset.value, reset.expires_at),
        )
        .await?;
        if !issued {
            warn!(user_id = %user.id, "user removed before reset token was stored");
            return Err(AppError::NotFound("User not found".into()));
        }
        info!(user_id = %user.id, "reset token issued");
        self.dispatch(&user.email, MailKind::Reset, &reset.value).await
    }

    /// Sets a new password for the holder of a live reset token and burns the
    /// token.
    pub async fn reset_password(&self, token: &str, password: String) -> Result<(), AppError> {
        let token = token.trim();
        check_password(&password)?;
        if !tokens::is_well_formed(token) {
            warn!("malformed reset token");
            return Err(AppError::InvalidOrExpiredToken);
        }
        let password_hash = hash_password_blocking(password).await?;
        let user = bounded(
            self.settings.call_timeout,
            "consume_reset_token",
            self.users
                .consume_reset_token(token, &password_hash, OffsetDateTime::now_utc()),
        )
        .await?
        .ok_or_else(|| {
            warn!("reset token did not match");
            AppError::InvalidOrExpiredToken
        })?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    async fn require_by_email(&self, email: &str) -> Result<User, AppError> {
        bounded(
            self.settings.call_timeout,
            "find_by_email",
            self.users.find_by_email(email),
        )
        .await?
        .ok_or_else(|| {
            warn!(%email, "no user for email");
            AppError::NotFound("User not found".into())
        })
    }

    /// The token is already persisted when this runs; a failed send leaves it
    /// valid and tells the caller to retry.
    async fn dispatch(&self, to: &str, kind: MailKind, token: &str) -> Result<(), AppError> {
        let link = templates::link_for(&self.settings.link_domain, kind, token);
        let sent = match tokio::time::timeout(
            self.settings.call_timeout,
            self.mailer.send(to, kind, &link),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(anyhow::anyhow!("mailer timed out")),
        };
        sent.map_err(|e| {
            error!(error = %e, kind = ?kind, "mail dispatch failed");
            AppError::DeliveryFailed(match kind {
                MailKind::Verify => {
                    "Verification email could not be sent; request a new link".into()
                }
                MailKind::Reset => "Password reset email could not be sent; try again".into(),
            })
        })
    }
}
