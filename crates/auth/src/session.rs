use crate::clock::Clock;
use crate::error::Result;
use crate::policy::SessionPolicy;
use crate::token::{self, RefreshSecret};
use chrono::{DateTime, Utc};
use hearth_database::SessionStore;
use hearth_models::{NewRefreshToken, NewSession, RefreshToken, RevocationReason, Session, SessionSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValidation {
    pub valid: bool,
    /// Set when the caller should rotate now: either the session is already
    /// unusable, or it ends within the policy's refresh window.
    pub requires_refresh: bool,
}

impl SessionValidation {
    fn invalid() -> Self {
        Self {
            valid: false,
            requires_refresh: true,
        }
    }
}

/// A refresh token as handed to the client. This is the only place the raw
/// secret ever appears.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedRefreshToken {
    pub token_id: Uuid,
    pub session_id: Uuid,
    pub secret: RefreshSecret,
    pub expires_at: DateTime<Utc>,
}

impl IssuedRefreshToken {
    pub(crate) fn new(record: &RefreshToken, secret: RefreshSecret) -> Self {
        Self {
            token_id: record.id,
            session_id: record.session_id,
            secret,
            expires_at: record.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub session: Session,
    pub refresh_token: IssuedRefreshToken,
}

/// Session lifecycle: create, validate, revoke.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Create a session together with its first refresh token.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<CreatedSession> {
        let now = self.clock.now();
        let expires_at = now + self.policy.session_ttl();
        let generated = token::generate();

        let new_session = NewSession {
            id: Uuid::new_v4(),
            user_id,
            user_agent,
            ip_address,
            created_at: now,
            expires_at,
        };
        let new_token = NewRefreshToken {
            id: Uuid::new_v4(),
            session_id: new_session.id,
            user_id,
            token_hash: generated.hash,
            created_at: now,
            expires_at: self.policy.token_expiry(now, expires_at),
        };

        let (session, record) = self
            .store
            .insert_session_and_token(new_session, new_token)
            .await?;

        tracing::info!(
            session_id = %session.id,
            user_id = %user_id,
            expires_at = %session.expires_at,
            "Session created"
        );

        Ok(CreatedSession {
            refresh_token: IssuedRefreshToken::new(&record, generated.secret),
            session,
        })
    }

    /// Report whether a session is usable and whether it should be refreshed.
    ///
    /// A missing session is reported as invalid rather than as an error.
    pub async fn validate_session(&self, session_id: Uuid) -> Result<SessionValidation> {
        let Some(session) = self.store.get_session(session_id).await? else {
            tracing::debug!(session_id = %session_id, "Session not found");
            return Ok(SessionValidation::invalid());
        };

        let now = self.clock.now();
        if !session.is_valid_at(now) {
            return Ok(SessionValidation::invalid());
        }

        Ok(SessionValidation {
            valid: true,
            requires_refresh: self.policy.within_refresh_window(now, session.expires_at),
        })
    }

    /// Revoke a session and its current refresh token. Revoking twice is fine.
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<()> {
        let changed = self
            .store
            .revoke_session(session_id, RevocationReason::Logout, self.clock.now())
            .await?;

        if changed {
            tracing::info!(session_id = %session_id, "Session revoked");
        }

        Ok(())
    }

    /// Revoke every live session of a user in one store operation.
    pub async fn revoke_all_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        let revoked = self
            .store
            .revoke_all_for_user(user_id, RevocationReason::RevokeAll, self.clock.now())
            .await?;

        tracing::info!(user_id = %user_id, revoked, "Revoked all user sessions");

        Ok(revoked)
    }

    pub async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSummary>> {
        let sessions = self
            .store
            .list_active_sessions(user_id, self.clock.now())
            .await?;

        Ok(sessions.into_iter().map(SessionSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SessionError;
    use chrono::Duration;
    use hearth_database::InMemorySessionStore;

    struct Harness {
        store: Arc<InMemorySessionStore>,
        clock: Arc<ManualClock>,
        service: SessionService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = SessionService::new(store.clone(), clock.clone(), SessionPolicy::default());
        Harness {
            store,
            clock,
            service,
        }
    }

    async fn create(h: &Harness, user_id: Uuid) -> CreatedSession {
        h.service
            .create_session(user_id, Some("Mozilla/5.0".to_string()), Some("203.0.113.7".to_string()))
            .await
            .expect("Failed to create session")
    }

    #[tokio::test]
    async fn test_create_session_sets_24h_expiry_and_token() {
        let h = harness();
        let user_id = Uuid::new_v4();
        let created = create(&h, user_id).await;

        assert_eq!(created.session.user_id, user_id);
        assert_eq!(created.session.expires_at - created.session.created_at, Duration::hours(24));
        assert_eq!(created.session.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(created.refresh_token.session_id, created.session.id);
        assert!(created.refresh_token.expires_at <= created.session.expires_at);

        let stored = h.store.token(created.refresh_token.token_id).unwrap();
        assert_ne!(stored.token_hash, created.refresh_token.secret.expose());
        assert!(token::compare(created.refresh_token.secret.expose(), &stored.token_hash));
    }

    #[tokio::test]
    async fn test_fresh_session_is_valid_without_refresh() {
        let h = harness();
        let created = create(&h, Uuid::new_v4()).await;

        let validation = h.service.validate_session(created.session.id).await.unwrap();
        assert_eq!(
            validation,
            SessionValidation {
                valid: true,
                requires_refresh: false
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_window_signal() {
        let h = harness();
        let created = create(&h, Uuid::new_v4()).await;
        let expires_at = created.session.expires_at;

        h.clock.set(expires_at - Duration::hours(10));
        let far = h.service.validate_session(created.session.id).await.unwrap();
        assert!(far.valid);
        assert!(!far.requires_refresh);

        h.clock.set(expires_at - Duration::minutes(30));
        let soon = h.service.validate_session(created.session.id).await.unwrap();
        assert!(soon.valid);
        assert!(soon.requires_refresh);
    }

    #[tokio::test]
    async fn test_validity_at_exact_expiry() {
        let h = harness();
        let created = create(&h, Uuid::new_v4()).await;
        let expires_at = created.session.expires_at;

        h.clock.set(expires_at - Duration::milliseconds(1));
        assert!(h.service.validate_session(created.session.id).await.unwrap().valid);

        h.clock.set(expires_at);
        let at_expiry = h.service.validate_session(created.session.id).await.unwrap();
        assert_eq!(at_expiry, SessionValidation::invalid());
    }

    #[tokio::test]
    async fn test_expired_session_requires_refresh() {
        let h = harness();
        let created = create(&h, Uuid::new_v4()).await;

        h.clock.advance(Duration::hours(25));
        let validation = h.service.validate_session(created.session.id).await.unwrap();
        assert!(!validation.valid);
        assert!(validation.requires_refresh);
    }

    #[tokio::test]
    async fn test_missing_session_is_invalid() {
        let h = harness();
        let validation = h.service.validate_session(Uuid::new_v4()).await.unwrap();
        assert_eq!(validation, SessionValidation::invalid());
    }

    #[tokio::test]
    async fn test_revoked_session_is_invalid_and_revoke_is_idempotent() {
        let h = harness();
        let created = create(&h, Uuid::new_v4()).await;

        h.service.revoke_session(created.session.id).await.unwrap();
        h.service.revoke_session(created.session.id).await.unwrap();

        let validation = h.service.validate_session(created.session.id).await.unwrap();
        assert!(!validation.valid);

        let token = h.store.token(created.refresh_token.token_id).unwrap();
        assert!(token.revoked_at.is_some());
        assert_eq!(token.revoked_reason, Some(RevocationReason::Logout));
    }

    #[tokio::test]
    async fn test_revoke_all_user_sessions_leaves_no_survivors() {
        let h = harness();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();

        let mut owned = Vec::new();
        for _ in 0..4 {
            owned.push(create(&h, user_id).await);
        }
        let other = create(&h, other_user).await;

        let revoked = h.service.revoke_all_user_sessions(user_id).await.unwrap();
        assert_eq!(revoked, 4);

        for created in &owned {
            let validation = h.service.validate_session(created.session.id).await.unwrap();
            assert!(!validation.valid);
            assert!(h.store.token(created.refresh_token.token_id).unwrap().revoked_at.is_some());
        }
        assert!(h.service.validate_session(other.session.id).await.unwrap().valid);
        assert!(h.service.list_active_sessions(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_active_sessions_newest_first() {
        let h = harness();
        let user_id = Uuid::new_v4();

        let first = create(&h, user_id).await;
        h.clock.advance(Duration::minutes(5));
        let second = create(&h, user_id).await;
        h.service.revoke_session(first.session.id).await.unwrap();
        h.clock.advance(Duration::minutes(5));
        let third = create(&h, user_id).await;

        let ids: Vec<Uuid> = h
            .service
            .list_active_sessions(user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![third.session.id, second.session.id]);
    }

    #[tokio::test]
    async fn test_store_outage_is_not_reported_as_invalid() {
        let h = harness();
        let created = create(&h, Uuid::new_v4()).await;

        h.store.set_offline(true);
        let err = h.service.validate_session(created.session.id).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        let err = h.service.create_session(Uuid::new_v4(), None, None).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
