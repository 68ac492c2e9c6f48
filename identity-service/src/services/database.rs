//! PostgreSQL store.
//!
//! Queries are shared between the pool and an open transaction by taking
//! any `sqlx::Executor` for Postgres.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{Executor, Transaction};
use uuid::Uuid;

use super::store::{IdentityStore, SessionStore, Store, StoreError, StoreTx};
use crate::models::{Identity, IdentityRow, Session};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn identity_from_row(row: IdentityRow) -> Result<Identity, StoreError> {
    let id = row.id;
    Identity::try_from(row).map_err(|e| {
        StoreError::Backend(anyhow::anyhow!("Stored identity {} is invalid: {}", id, e))
    })
}

fn require_row(rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

async fn insert_identity<'e, E>(executor: E, identity: &Identity) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO identities (id, email, username, password_hash, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(identity.id)
    .bind(identity.email.as_str())
    .bind(identity.username.as_str())
    .bind(identity.password_hash.as_str())
    .bind(identity.created_at)
    .bind(identity.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_session<'e, E>(executor: E, session: &Session) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO sessions (id, identity_id, token_hash, expires_at, revoked, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(session.id)
    .bind(session.identity_id)
    .bind(&session.token_hash)
    .bind(session.expires_at)
    .bind(session.revoked)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl IdentityStore for Database {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        insert_identity(&self.pool, identity).await
    }

    async fn get_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, IdentityRow>("SELECT * FROM identities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(identity_from_row)
            .transpose()
    }

    async fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, IdentityRow>("SELECT * FROM identities WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(identity_from_row)
            .transpose()
    }

    async fn delete_identity(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_row(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        insert_session(&self.pool, session).await
    }

    async fn get_session_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_sessions_by_owner(&self, identity_id: Uuid) -> Result<Vec<Session>, StoreError> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE identity_id = $1 ORDER BY created_at DESC",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        // `revoked OR $3` keeps a revoked row terminal.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET expires_at = $2, revoked = revoked OR $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.expires_at)
        .bind(session.revoked)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        require_row(result.rows_affected())
    }

    async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE, updated_at = $2 WHERE id = $1 AND revoked = FALSE",
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        require_row(result.rows_affected())
    }

    async fn revoke_sessions_by_owner(&self, identity_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE, updated_at = $2 WHERE identity_id = $1 AND revoked = FALSE",
        )
        .bind(identity_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        require_row(result.rows_affected())?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_row(result.rows_affected())
    }
}

#[async_trait]
impl Store for Database {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Database health check failed");
            StoreError::from(e)
        })?;
        Ok(())
    }
}

/// An open Postgres transaction. Dropped without commit, sqlx rolls it back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn create_identity(&mut self, identity: &Identity) -> Result<(), StoreError> {
        insert_identity(&mut *self.tx, identity).await
    }

    async fn create_session(&mut self, session: &Session) -> Result<(), StoreError> {
        insert_session(&mut *self.tx, session).await
    }

    async fn claim_session(&mut self, id: Uuid, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked = TRUE, updated_at = $3
            WHERE id = $1 AND revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
