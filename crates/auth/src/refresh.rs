//! Refresh token rotation.
//!
//! Each token is single use. Redeeming it revokes it and chains a successor to
//! it in one store operation. A token that comes back after it was consumed is
//! a replay: the whole session it belongs to is revoked.

use crate::clock::Clock;
use crate::error::{Result, SessionError};
use crate::policy::SessionPolicy;
use crate::session::IssuedRefreshToken;
use crate::token;
use hearth_database::{PriorState, SessionStore, TokenSuccessor};
use hearth_models::RevocationReason;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Flattened outcome of a rotation attempt, as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct RotationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_token: Option<IssuedRefreshToken>,
    pub replay_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<IssuedRefreshToken>> for RotationResult {
    fn from(result: Result<IssuedRefreshToken>) -> Self {
        match result {
            Ok(token) => Self {
                success: true,
                new_token: Some(token),
                replay_detected: false,
                error: None,
            },
            Err(err) => Self {
                success: false,
                new_token: None,
                replay_detected: err.is_security_event(),
                error: Some(err.to_string()),
            },
        }
    }
}

pub struct RefreshTokenService {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl RefreshTokenService {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Redeem `presented_secret` for a successor token.
    ///
    /// Fails with `NotFound` for unknown secrets, `Expired` when the token's
    /// lifetime is over, `IdentityMismatch` when it belongs to someone else and
    /// `ReplayDetected` when it was already consumed. Only the last one revokes
    /// anything.
    pub async fn rotate_refresh_token(
        &self,
        presented_secret: &str,
        expected_user_id: Uuid,
    ) -> Result<IssuedRefreshToken> {
        let presented_hash = token::hash_token(presented_secret);
        let record = self
            .store
            .find_token_by_hash(&presented_hash)
            .await?
            .filter(|record| token::compare(presented_secret, &record.token_hash))
            .ok_or_else(|| SessionError::NotFound("refresh token".to_string()))?;

        let now = self.clock.now();
        let generated = token::generate();
        let successor = TokenSuccessor {
            id: Uuid::new_v4(),
            token_hash: generated.hash,
            expires_at: now + self.policy.refresh_token_ttl(),
        };

        let outcome = self
            .store
            .atomic_revoke_and_chain(record.id, expected_user_id, successor, now)
            .await?;

        match (outcome.prior_state, outcome.successor) {
            (PriorState::Active, Some(next)) if outcome.applied => {
                tracing::info!(
                    session_id = %next.session_id,
                    user_id = %next.user_id,
                    previous_token_id = %record.id,
                    token_id = %next.id,
                    "Refresh token rotated"
                );
                Ok(IssuedRefreshToken::new(&next, generated.secret))
            }
            (PriorState::AlreadyRevoked, _) => {
                let session_id = outcome.session_id.unwrap_or(record.session_id);
                self.handle_replay(session_id, record.id, record.user_id).await
            }
            (PriorState::OwnerMismatch, _) => {
                tracing::warn!(
                    token_id = %record.id,
                    expected_user_id = %expected_user_id,
                    "Refresh token presented for a different user"
                );
                Err(SessionError::IdentityMismatch)
            }
            (PriorState::Expired, _) => {
                tracing::debug!(token_id = %record.id, "Refresh token expired");
                Err(SessionError::Expired)
            }
            (PriorState::NotFound, _) => Err(SessionError::NotFound("refresh token".to_string())),
            (PriorState::Active, _) => Err(SessionError::Internal(
                "store accepted rotation without returning a successor".to_string(),
            )),
        }
    }

    /// A consumed token came back. Revoke the whole session before reporting.
    ///
    /// If the revocation cannot be confirmed the store error is returned
    /// instead, so the caller retries and the cascade runs again.
    async fn handle_replay(
        &self,
        session_id: Uuid,
        token_id: Uuid,
        user_id: Uuid,
    ) -> Result<IssuedRefreshToken> {
        tracing::warn!(
            security_event = "refresh_token_replay",
            session_id = %session_id,
            token_id = %token_id,
            user_id = %user_id,
            "Consumed refresh token presented again; revoking session"
        );

        if let Err(err) = self
            .store
            .revoke_session(session_id, RevocationReason::ReplayDetected, self.clock.now())
            .await
        {
            tracing::error!(
                security_event = "refresh_token_replay",
                session_id = %session_id,
                "Failed to revoke session after replay: {}",
                err
            );
            return Err(err.into());
        }

        Err(SessionError::ReplayDetected { session_id })
    }
}
