use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Why a session or refresh token stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Superseded by a successor token during rotation.
    Rotated,
    Logout,
    /// A consumed refresh token was presented again.
    ReplayDetected,
    /// "Log out everywhere".
    RevokeAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevocationReason>,
}

impl Session {
    /// A session is valid iff it was never revoked and `now` is strictly before its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewSession {
    pub fn into_session(self) -> Session {
        Session {
            id: self.id,
            user_id: self.user_id,
            user_agent: self.user_agent,
            ip_address: self.ip_address,
            created_at: self.created_at,
            expires_at: self.expires_at,
            revoked_at: None,
            revoked_reason: None,
        }
    }
}

/// Public view of a session, safe to hand to the account owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        NewSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_agent: None,
            ip_address: None,
            created_at: expires_at - Duration::hours(24),
            expires_at,
        }
        .into_session()
    }

    #[test]
    fn test_validity_is_exclusive_at_expiry() {
        let expires_at = Utc::now();
        let session = session_expiring_at(expires_at);

        assert!(session.is_valid_at(expires_at - Duration::milliseconds(1)));
        assert!(!session.is_valid_at(expires_at));
        assert!(!session.is_valid_at(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_revoked_session_is_never_valid() {
        let now = Utc::now();
        let mut session = session_expiring_at(now + Duration::hours(10));
        session.revoked_at = Some(now);
        session.revoked_reason = Some(RevocationReason::Logout);

        assert!(session.is_revoked());
        assert!(!session.is_valid_at(now));
    }
}
