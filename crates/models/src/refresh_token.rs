use crate::session::RevocationReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Position of a refresh token in its session's chain.
///
/// Transitions only go forward: `Active -> Rotated` or `Active -> RevokedTerminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Rotated,
    RevokedTerminal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub revoked_reason: Option<RevocationReason>,
}

impl RefreshToken {
    pub fn state(&self) -> TokenState {
        match (self.revoked_at, self.replaced_by) {
            (None, _) => TokenState::Active,
            (Some(_), Some(_)) => TokenState::Rotated,
            (Some(_), None) => TokenState::RevokedTerminal,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewRefreshToken {
    pub fn into_token(self) -> RefreshToken {
        RefreshToken {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            token_hash: self.token_hash,
            created_at: self.created_at,
            expires_at: self.expires_at,
            revoked_at: None,
            replaced_by: None,
            revoked_reason: None,
        }
    }
}
