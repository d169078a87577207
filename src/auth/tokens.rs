use rand::{distributions::Alphanumeric, Rng};
use time::{Duration, OffsetDateTime};

const TOKEN_LEN: usize = 48;

/// A random single-use token (email verification or password reset) and the
/// instant after which it no longer matches.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub value: String,
    pub expires_at: OffsetDateTime,
}

impl OneTimeToken {
    pub fn issue(ttl_minutes: i64, now: OffsetDateTime) -> Self {
        let value = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        Self {
            value,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }
}

/// Tokens arrive from links; anything outside the issued alphabet or length
/// cannot match and is refused before touching the store.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric())
}
