use axum::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{CredentialStore, NewUser, Provider, UserRecord};

const USER_COLUMNS: &str = "id, email, name, password_hash, google_id, github_id, \
     password_changed_at, reset_token_hash, reset_token_expires_at, active, created_at";

/// Postgres-backed credential store. Every lookup filters on `active` so a
/// soft-deleted record behaves exactly like a missing one.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_provider_identity(
        &self,
        provider: Provider,
        subject: &str,
    ) -> anyhow::Result<Option<UserRecord>> {
        let query = match provider {
            Provider::Google => {
                format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1 AND active")
            }
            Provider::Github => {
                format!("SELECT {USER_COLUMNS} FROM users WHERE github_id = $1 AND active")
            }
        };
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token_hash = $1 AND active"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<UserRecord> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, google_id, github_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new_user.email)
        .bind(new_user.name)
        .bind(new_user.password_hash)
        .bind(new_user.google_id)
        .bind(new_user.github_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token_hash = $2, reset_token_expires_at = $3
            WHERE id = $1 AND active
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_reset_token(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token_hash = NULL, reset_token_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        expected_token_hash: &str,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        // The digest guard makes this write first-wins under concurrent
        // submissions of the same token.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3,
                password_changed_at = $4,
                reset_token_hash = NULL,
                reset_token_expires_at = NULL
            WHERE id = $1 AND reset_token_hash = $2 AND active
            "#,
        )
        .bind(user_id)
        .bind(expected_token_hash)
        .bind(new_password_hash)
        .bind(changed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
