use crate::error::{DatabaseError, Result};
use crate::store::{classify_token, clamp_expiry, ChainOutcome, PriorState, SessionStore, TokenSuccessor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_models::{NewRefreshToken, NewSession, RefreshToken, RevocationReason, Session};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    sessions: HashMap<Uuid, Session>,
    tokens: HashMap<Uuid, RefreshToken>,
    tokens_by_hash: HashMap<String, Uuid>,
}

impl State {
    fn active_token_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.tokens
            .values()
            .find(|t| t.session_id == session_id && t.revoked_at.is_none())
            .map(|t| t.id)
    }

    fn insert_token(&mut self, token: RefreshToken) -> Result<()> {
        if self.tokens_by_hash.contains_key(&token.token_hash) {
            return Err(DatabaseError::ConstraintViolation(
                "duplicate refresh token hash".to_string(),
            ));
        }
        if self.active_token_of(token.session_id).is_some() {
            return Err(DatabaseError::ConstraintViolation(format!(
                "session {} already has an active refresh token",
                token.session_id
            )));
        }
        self.tokens_by_hash.insert(token.token_hash.clone(), token.id);
        self.tokens.insert(token.id, token);
        Ok(())
    }

    fn revoke_session_tokens(
        &mut self,
        session_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> u64 {
        let mut changed = 0;
        for token in self.tokens.values_mut() {
            if token.session_id == session_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                token.revoked_reason = Some(reason);
                changed += 1;
            }
        }
        changed
    }
}

/// Process-local session store.
///
/// Each primitive runs entirely under one mutex acquisition, which gives it the
/// same all-or-nothing behaviour the Postgres store gets from a transaction.
/// The lock is never held across an await point.
#[derive(Default)]
pub struct InMemorySessionStore {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while offline every primitive fails with
    /// [`DatabaseError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Direct read of a token row, for inspecting chains.
    pub fn token(&self, token_id: Uuid) -> Option<RefreshToken> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.tokens.get(&token_id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("in-memory store is offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| DatabaseError::Internal("session store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert_session_and_token(
        &self,
        new_session: NewSession,
        new_token: NewRefreshToken,
    ) -> Result<(Session, RefreshToken)> {
        if new_token.session_id != new_session.id || new_token.user_id != new_session.user_id {
            return Err(DatabaseError::ConstraintViolation(
                "refresh token must belong to the session it is created with".to_string(),
            ));
        }

        let mut state = self.lock()?;
        if state.sessions.contains_key(&new_session.id) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "session {} already exists",
                new_session.id
            )));
        }

        let session = new_session.into_session();
        let mut token = new_token.into_token();
        token.expires_at = clamp_expiry(token.expires_at, &session);

        // Token first: if it is rejected nothing has been written yet.
        state.insert_token(token.clone())?;
        state.sessions.insert(session.id, session.clone());

        Ok((session, token))
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }

    async fn find_token_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let state = self.lock()?;
        Ok(state
            .tokens_by_hash
            .get(token_hash)
            .and_then(|id| state.tokens.get(id))
            .cloned())
    }

    async fn atomic_revoke_and_chain(
        &self,
        token_id: Uuid,
        expected_user_id: Uuid,
        successor: TokenSuccessor,
        now: DateTime<Utc>,
    ) -> Result<ChainOutcome> {
        let mut state = self.lock()?;

        let Some(token) = state.tokens.get(&token_id).cloned() else {
            return Ok(ChainOutcome::rejected(PriorState::NotFound, None));
        };
        let session = state
            .sessions
            .get(&token.session_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("Session", &token.session_id.to_string()))?;

        let prior_state = classify_token(&session, &token, expected_user_id, now);
        if prior_state != PriorState::Active {
            return Ok(ChainOutcome::rejected(prior_state, Some(session.id)));
        }
        if state.tokens_by_hash.contains_key(&successor.token_hash) {
            return Err(DatabaseError::ConstraintViolation(
                "duplicate refresh token hash".to_string(),
            ));
        }

        if let Some(consumed) = state.tokens.get_mut(&token_id) {
            consumed.revoked_at = Some(now);
            consumed.replaced_by = Some(successor.id);
            consumed.revoked_reason = Some(RevocationReason::Rotated);
        }

        let next = NewRefreshToken {
            id: successor.id,
            session_id: token.session_id,
            user_id: token.user_id,
            token_hash: successor.token_hash,
            created_at: now,
            expires_at: clamp_expiry(successor.expires_at, &session),
        }
        .into_token();
        state.insert_token(next.clone())?;

        Ok(ChainOutcome::applied(session.id, next))
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock()?;

        let mut changed = false;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            if session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                session.revoked_reason = Some(reason);
                changed = true;
            }
        }
        changed |= state.revoke_session_tokens(session_id, reason, now) > 0;

        Ok(changed)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.lock()?;

        let mut revoked = 0;
        for session in state.sessions.values_mut() {
            if session.user_id == user_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                session.revoked_reason = Some(reason);
                revoked += 1;
            }
        }
        for token in state.tokens.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                token.revoked_reason = Some(reason);
            }
        }

        Ok(revoked)
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let state = self.lock()?;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
