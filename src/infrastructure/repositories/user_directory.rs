//! User Directory Implementation
//!
//! Reads the `users` mirror table. Soft-deleted rows (`deleted_at` set) are
//! invisible to lookups and queue the account for relation purging.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::UserDirectory;
use crate::shared::error::AppError;

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn usernames(&self, userids: &[String]) -> Result<HashMap<String, String>, AppError> {
        if userids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT userid, username FROM users
            WHERE userid = ANY($1) AND deleted_at IS NULL
            "#,
        )
        .bind(userids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn pending_purge(&self, limit: i64) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT userid FROM users
            WHERE deleted_at IS NOT NULL
            ORDER BY deleted_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn complete_purge(&self, userid: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM users WHERE userid = $1 AND deleted_at IS NOT NULL")
            .bind(userid)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
