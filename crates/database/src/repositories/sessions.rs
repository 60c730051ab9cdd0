use crate::error::{DatabaseError, Result};
use crate::store::{classify_token, clamp_expiry, ChainOutcome, PriorState, SessionStore, TokenSuccessor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_models::{NewRefreshToken, NewSession, RefreshToken, RevocationReason, Session};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed session store.
///
/// Rotation and revocation both lock the session row before touching its
/// tokens, so the two serialize per session and a revocation always sees the
/// successor a concurrent rotation inserted.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
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

        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, user_agent, ip_address, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new_session.id)
        .bind(new_session.user_id)
        .bind(&new_session.user_agent)
        .bind(&new_session.ip_address)
        .bind(new_session.created_at)
        .bind(new_session.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, session_id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new_token.id)
        .bind(new_token.session_id)
        .bind(new_token.user_id)
        .bind(&new_token.token_hash)
        .bind(new_token.created_at)
        .bind(clamp_expiry(new_token.expires_at, &session))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((session, token))
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn find_token_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let token =
            sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(token)
    }

    async fn atomic_revoke_and_chain(
        &self,
        token_id: Uuid,
        expected_user_id: Uuid,
        successor: TokenSuccessor,
        now: DateTime<Utc>,
    ) -> Result<ChainOutcome> {
        let mut tx = self.pool.begin().await?;

        // session_id is immutable, so reading it before taking locks is safe.
        let session_id: Option<Uuid> =
            sqlx::query_scalar("SELECT session_id FROM refresh_tokens WHERE id = $1")
                .bind(token_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(session_id) = session_id else {
            return Ok(ChainOutcome::rejected(PriorState::NotFound, None));
        };

        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;

        let token =
            sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE id = $1 FOR UPDATE")
                .bind(token_id)
                .fetch_one(&mut *tx)
                .await?;

        let prior_state = classify_token(&session, &token, expected_user_id, now);
        if prior_state != PriorState::Active {
            tx.rollback().await?;
            return Ok(ChainOutcome::rejected(prior_state, Some(session_id)));
        }

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, replaced_by = $3, revoked_reason = $4
            WHERE id = $1
            "#,
        )
        .bind(token.id)
        .bind(now)
        .bind(successor.id)
        .bind(RevocationReason::Rotated)
        .execute(&mut *tx)
        .await?;

        let next = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, session_id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(successor.id)
        .bind(token.session_id)
        .bind(token.user_id)
        .bind(&successor.token_hash)
        .bind(now)
        .bind(clamp_expiry(successor.expires_at, &session))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChainOutcome::applied(session_id, next))
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let sessions = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = $2, revoked_reason = $3
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        let tokens = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_reason = $3
            WHERE session_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(sessions.rows_affected() + tokens.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let sessions = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = $2, revoked_reason = $3
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_reason = $3
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(sessions.rows_affected())
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
