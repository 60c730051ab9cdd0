use hearth_database::DatabaseError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Refresh token expired")]
    Expired,

    #[error("Refresh token replay detected; session {session_id} revoked")]
    ReplayDetected { session_id: Uuid },

    #[error("Refresh token does not belong to the requesting user")]
    IdentityMismatch,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Only an unreachable store is worth retrying; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::StoreUnavailable(_))
    }

    /// The caller has to sign in again to get a usable session.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            SessionError::NotFound(_)
                | SessionError::Expired
                | SessionError::ReplayDetected { .. }
                | SessionError::IdentityMismatch
        )
    }

    /// Suspected credential theft, to be surfaced to the user as such.
    pub fn is_security_event(&self) -> bool {
        matches!(self, SessionError::ReplayDetected { .. })
    }
}

impl From<DatabaseError> for SessionError {
    fn from(err: DatabaseError) -> Self {
        if err.is_unavailable() {
            return SessionError::StoreUnavailable(err.to_string());
        }
        match err {
            DatabaseError::NotFound(what) => SessionError::NotFound(what),
            other => SessionError::Internal(other.to_string()),
        }
    }
}
