//! Direct Chat Repository Implementation
//!
//! PostgreSQL implementation of the DmRepository trait. The pair columns
//! are written already sorted; a CHECK constraint rejects anything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::domain::{DirectChat, DmRepository, UserPair};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct DmRow {
    userid_1: String,
    userid_2: String,
    chatid: String,
    name: String,
    theme: Value,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<DmRow> for DirectChat {
    fn from(row: DmRow) -> Self {
        DirectChat {
            chat_id: row.chatid,
            pair: UserPair::new(row.userid_1, row.userid_2),
            name: row.name,
            theme: row.theme,
            last_updated: row.last_updated,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL direct chat repository implementation.
#[derive(Clone)]
pub struct PgDmRepository {
    pool: PgPool,
}

impl PgDmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DmRepository for PgDmRepository {
    async fn insert(&self, chat: &DirectChat) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO dms (userid_1, userid_2, chatid, name, theme, last_updated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(chat.pair.first())
        .bind(chat.pair.second())
        .bind(&chat.chat_id)
        .bind(&chat.name)
        .bind(&chat.theme)
        .bind(chat.last_updated)
        .bind(chat.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_pair(&self, pair: &UserPair) -> Result<Option<DirectChat>, AppError> {
        let row = sqlx::query_as::<_, DmRow>(
            r#"
            SELECT userid_1, userid_2, chatid, name, theme, last_updated, created_at
            FROM dms
            WHERE userid_1 = $1 AND userid_2 = $2
            "#,
        )
        .bind(pair.first())
        .bind(pair.second())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, chat_id: &str) -> Result<Option<DirectChat>, AppError> {
        let row = sqlx::query_as::<_, DmRow>(
            r#"
            SELECT userid_1, userid_2, chatid, name, theme, last_updated, created_at
            FROM dms
            WHERE chatid = $1
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_props(
        &self,
        chat_id: &str,
        name: &str,
        theme: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE dms
            SET name = $2, theme = $3, last_updated = $4
            WHERE chatid = $1
            "#,
        )
        .bind(chat_id)
        .bind(name)
        .bind(theme)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch(&self, chat_id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE dms SET last_updated = $2 WHERE chatid = $1")
            .bind(chat_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<DirectChat>, AppError> {
        let rows = sqlx::query_as::<_, DmRow>(
            r#"
            SELECT userid_1, userid_2, chatid, name, theme, last_updated, created_at
            FROM dms
            WHERE (userid_1 = $1 OR userid_2 = $1)
              AND ($2::timestamptz IS NULL OR last_updated < $2)
            ORDER BY last_updated DESC
            LIMIT $3
            "#,
        )
        .bind(userid)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, chat_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM dms WHERE chatid = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
