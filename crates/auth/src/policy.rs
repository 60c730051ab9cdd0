use crate::error::{Result, SessionError};
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = DEFAULT_SESSION_TTL_SECS;
pub const DEFAULT_REFRESH_WINDOW_SECS: i64 = 60 * 60;
/// Upper bound for every lifetime, keeping `now + ttl` far from overflow.
pub const MAX_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Lifetimes governing sessions and their refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    session_ttl: Duration,
    refresh_token_ttl: Duration,
    refresh_window: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            refresh_window: Duration::seconds(DEFAULT_REFRESH_WINDOW_SECS),
        }
    }
}

impl SessionPolicy {
    /// Build a policy. A refresh token TTL longer than the session TTL is
    /// clamped down to it. No value may exceed [`MAX_LIFETIME_SECS`].
    pub fn new(
        session_ttl: Duration,
        refresh_token_ttl: Duration,
        refresh_window: Duration,
    ) -> Result<Self> {
        if session_ttl <= Duration::zero() {
            return Err(SessionError::Configuration(
                "session TTL must be positive".to_string(),
            ));
        }
        if refresh_token_ttl <= Duration::zero() {
            return Err(SessionError::Configuration(
                "refresh token TTL must be positive".to_string(),
            ));
        }
        if refresh_window < Duration::zero() {
            return Err(SessionError::Configuration(
                "refresh window must not be negative".to_string(),
            ));
        }
        let max = Duration::seconds(MAX_LIFETIME_SECS);
        if session_ttl > max || refresh_token_ttl > max || refresh_window > max {
            return Err(SessionError::Configuration(format!(
                "session lifetimes must not exceed {} seconds",
                MAX_LIFETIME_SECS
            )));
        }

        let refresh_token_ttl = if refresh_token_ttl > session_ttl {
            tracing::warn!(
                refresh_token_ttl_secs = refresh_token_ttl.num_seconds(),
                session_ttl_secs = session_ttl.num_seconds(),
                "Refresh token TTL exceeds session TTL; clamping"
            );
            session_ttl
        } else {
            refresh_token_ttl
        };

        Ok(Self {
            session_ttl,
            refresh_token_ttl,
            refresh_window,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(
            env_secs("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
            env_secs("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TOKEN_TTL_SECS)?,
            env_secs("SESSION_REFRESH_WINDOW_SECS", DEFAULT_REFRESH_WINDOW_SECS)?,
        )
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    pub fn refresh_window(&self) -> Duration {
        self.refresh_window
    }

    /// Expiry for a token issued at `now` inside a session ending at `session_expires_at`.
    pub fn token_expiry(&self, now: DateTime<Utc>, session_expires_at: DateTime<Utc>) -> DateTime<Utc> {
        (now + self.refresh_token_ttl).min(session_expires_at)
    }

    /// Whether a session ending at `expires_at` should be refreshed early.
    pub fn within_refresh_window(&self, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
        expires_at - now <= self.refresh_window
    }
}

fn env_secs(key: &str, default: i64) -> Result<Duration> {
    match std::env::var(key) {
        Ok(value) => parse_secs(key, &value),
        Err(_) => Ok(Duration::seconds(default)),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: i64 = value.trim().parse().map_err(|_| {
        SessionError::Configuration(format!("{} must be an integer, got {:?}", key, value))
    })?;

    Duration::try_seconds(secs)
        .ok_or_else(|| SessionError::Configuration(format!("{} is out of range: {}", key, secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.session_ttl(), Duration::hours(24));
        assert_eq!(policy.refresh_window(), Duration::hours(1));
        assert!(policy.refresh_token_ttl() <= policy.session_ttl());
    }

    #[test]
    fn test_token_ttl_clamped_to_session_ttl() {
        let policy =
            SessionPolicy::new(Duration::hours(2), Duration::hours(10), Duration::minutes(5)).unwrap();
        assert_eq!(policy.refresh_token_ttl(), Duration::hours(2));
    }

    #[test]
    fn test_rejects_non_positive_lifetimes() {
        assert!(SessionPolicy::new(Duration::zero(), Duration::hours(1), Duration::zero()).is_err());
        assert!(SessionPolicy::new(Duration::hours(1), Duration::seconds(-1), Duration::zero()).is_err());
        assert!(
            SessionPolicy::new(Duration::hours(1), Duration::hours(1), Duration::seconds(-1)).is_err()
        );
    }

    #[test]
    fn test_rejects_lifetimes_beyond_a_year() {
        let year = Duration::seconds(MAX_LIFETIME_SECS);
        assert!(SessionPolicy::new(year, year, Duration::hours(1)).is_ok());

        let huge = Duration::seconds(9_000_000_000_000);
        let err = SessionPolicy::new(huge, Duration::hours(1), Duration::hours(1)).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
        assert!(SessionPolicy::new(Duration::hours(1), huge, Duration::hours(1)).is_err());
        assert!(SessionPolicy::new(Duration::hours(1), Duration::hours(1), huge).is_err());
    }

    #[test]
    fn test_parse_secs_rejects_garbage_and_overflow() {
        assert_eq!(parse_secs("SESSION_TTL_SECS", " 3600 ").unwrap(), Duration::hours(1));
        assert!(parse_secs("SESSION_TTL_SECS", "1h").is_err());
        assert!(parse_secs("SESSION_TTL_SECS", &i64::MAX.to_string()).is_err());
    }

    #[test]
    fn test_refresh_window_boundaries() {
        let policy = SessionPolicy::default();
        let now = Utc::now();

        assert!(policy.within_refresh_window(now, now + Duration::minutes(30)));
        assert!(policy.within_refresh_window(now, now + Duration::hours(1)));
        assert!(!policy.within_refresh_window(now, now + Duration::hours(1) + Duration::seconds(1)));
        assert!(!policy.within_refresh_window(now, now + Duration::hours(10)));
    }

    #[test]
    fn test_token_expiry_never_outlives_session() {
        let policy = SessionPolicy::default();
        let now = Utc::now();
        let session_end = now + Duration::minutes(20);
        assert_eq!(policy.token_expiry(now, session_end), session_end);
    }
}
