//! The contract between the session core and whatever persists it.
//!
//! Every primitive here is a single atomic operation at the store. Callers never
//! compose a check-then-act out of several calls; anything that needs to read
//! and then write (rotation, bulk revocation) is one primitive.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_models::{NewRefreshToken, NewSession, RefreshToken, RevocationReason, Session};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the presented token looked like at the moment the store locked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorState {
    Active,
    AlreadyRevoked,
    Expired,
    NotFound,
    /// Live token, but owned by someone other than the caller claimed.
    OwnerMismatch,
}

/// Fields the caller chooses for a successor token. Ownership and
/// `created_at` are taken from the consumed row inside the store.
#[derive(Debug, Clone)]
pub struct TokenSuccessor {
    pub id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub applied: bool,
    pub prior_state: PriorState,
    /// Owning session of the presented token, when the token exists.
    pub session_id: Option<Uuid>,
    pub successor: Option<RefreshToken>,
}

impl ChainOutcome {
    pub fn applied(session_id: Uuid, successor: RefreshToken) -> Self {
        Self {
            applied: true,
            prior_state: PriorState::Active,
            session_id: Some(session_id),
            successor: Some(successor),
        }
    }

    pub fn rejected(prior_state: PriorState, session_id: Option<Uuid>) -> Self {
        Self {
            applied: false,
            prior_state,
            session_id,
            successor: None,
        }
    }
}

/// Decide whether a locked token may be consumed.
///
/// Revocation wins over every other condition so that a consumed token is
/// always reported as such, even when it has also expired.
pub fn classify_token(
    session: &Session,
    token: &RefreshToken,
    expected_user_id: Uuid,
    now: DateTime<Utc>,
) -> PriorState {
    if token.revoked_at.is_some() || session.is_revoked() {
        PriorState::AlreadyRevoked
    } else if token.user_id != expected_user_id {
        PriorState::OwnerMismatch
    } else if token.is_expired_at(now) || now >= session.expires_at {
        PriorState::Expired
    } else {
        PriorState::Active
    }
}

/// Successor expiry never outlives the owning session.
pub fn clamp_expiry(requested: DateTime<Utc>, session: &Session) -> DateTime<Utc> {
    requested.min(session.expires_at)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session and its first refresh token as one unit.
    async fn insert_session_and_token(
        &self,
        session: NewSession,
        token: NewRefreshToken,
    ) -> Result<(Session, RefreshToken)>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>>;

    async fn find_token_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Compare-and-revoke the presented token and chain `successor` to it.
    ///
    /// Succeeds only when the token is live, unexpired and owned by
    /// `expected_user_id`. Of several concurrent callers presenting the same
    /// token, at most one observes `applied == true`.
    async fn atomic_revoke_and_chain(
        &self,
        token_id: Uuid,
        expected_user_id: Uuid,
        successor: TokenSuccessor,
        now: DateTime<Utc>,
    ) -> Result<ChainOutcome>;

    /// Revoke a session and its current token. Returns whether anything changed.
    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Revoke every live session and token of a user. Returns the number of
    /// sessions that were revoked by this call.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn list_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<Vec<Session>>;

    async fn ping(&self) -> Result<()>;
}
