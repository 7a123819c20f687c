//! Group Chat Repository Implementation
//!
//! PostgreSQL implementation of the GdmRepository trait.
//!
//! Membership mutations run in a transaction that first takes a row lock on
//! the chat (`SELECT ... FOR UPDATE`). The member count is read under that
//! lock, so two concurrent adds or removes serialize and the bounds check
//! always sees the committed result of the other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{GdmRepository, GroupChat, MembershipChange};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct GdmRow {
    chatid: String,
    name: String,
    theme: Value,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<GdmRow> for GroupChat {
    fn from(row: GdmRow) -> Self {
        GroupChat {
            chat_id: row.chatid,
            name: row.name,
            theme: row.theme,
            last_updated: row.last_updated,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL group chat repository implementation.
#[derive(Clone)]
pub struct PgGdmRepository {
    pool: PgPool,
}

impl PgGdmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the chat row and return the current member count.
    async fn lock_and_count(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: &str,
    ) -> Result<usize, AppError> {
        let locked = sqlx::query_scalar::<_, String>(
            "SELECT chatid FROM gdms WHERE chatid = $1 FOR UPDATE",
        )
        .bind(chat_id)
        .fetch_optional(&mut **tx)
        .await?;

        if locked.is_none() {
            return Err(AppError::NotFound(format!("Group chat {} not found", chat_id)));
        }

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM gdm_members WHERE chatid = $1",
        )
        .bind(chat_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(count as usize)
    }

    /// Derive the missing assoc rows from the current membership.
    async fn fill_assoc(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO gdm_assoc (chatid, userid_1, userid_2)
            SELECT a.chatid, a.userid, b.userid
            FROM gdm_members a
            JOIN gdm_members b ON b.chatid = a.chatid AND b.userid <> a.userid
            WHERE a.chatid = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(chat_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn touch_in(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE gdms SET last_updated = $2 WHERE chatid = $1")
            .bind(chat_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        sqlx::query("UPDATE gdm_members SET last_updated = $2 WHERE chatid = $1")
            .bind(chat_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl GdmRepository for PgGdmRepository {
    async fn create(&self, chat: &GroupChat, members: &[String]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO gdms (chatid, name, theme, last_updated, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&chat.chat_id)
        .bind(&chat.name)
        .bind(&chat.theme)
        .bind(chat.last_updated)
        .bind(chat.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO gdm_members (chatid, userid, last_updated)
            SELECT $1, u, $3 FROM UNNEST($2::varchar[]) AS u
            "#,
        )
        .bind(&chat.chat_id)
        .bind(members)
        .bind(chat.last_updated)
        .execute(&mut *tx)
        .await?;

        Self::fill_assoc(&mut tx, &chat.chat_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, chat_id: &str) -> Result<Option<GroupChat>, AppError> {
        let row = sqlx::query_as::<_, GdmRow>(
            r#"
            SELECT chatid, name, theme, last_updated, created_at
            FROM gdms
            WHERE chatid = $1
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn is_member(&self, chat_id: &str, userid: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM gdm_members WHERE chatid = $1 AND userid = $2)",
        )
        .bind(chat_id)
        .bind(userid)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn members(&self, chat_id: &str) -> Result<Vec<String>, AppError> {
        let members = sqlx::query_scalar::<_, String>(
            "SELECT userid FROM gdm_members WHERE chatid = $1 ORDER BY userid ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn add_members(
        &self,
        chat_id: &str,
        userids: &[String],
        max: usize,
        now: DateTime<Utc>,
    ) -> Result<MembershipChange, AppError> {
        let mut tx = self.pool.begin().await?;
        let count = Self::lock_and_count(&mut tx, chat_id).await?;

        if count + userids.len() > max {
            return Ok(MembershipChange::OverCapacity { count });
        }

        // A duplicate member violates the primary key and surfaces as Conflict.
        sqlx::query(
            r#"
            INSERT INTO gdm_members (chatid, userid, last_updated)
            SELECT $1, u, $3 FROM UNNEST($2::varchar[]) AS u
            "#,
        )
        .bind(chat_id)
        .bind(userids)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::fill_assoc(&mut tx, chat_id).await?;
        Self::touch_in(&mut tx, chat_id, now).await?;

        tx.commit().await?;
        Ok(MembershipChange::Applied {
            count: count + userids.len(),
        })
    }

    async fn remove_members(
        &self,
        chat_id: &str,
        userids: &[String],
        min: usize,
        now: DateTime<Utc>,
    ) -> Result<MembershipChange, AppError> {
        let mut tx = self.pool.begin().await?;
        let count = Self::lock_and_count(&mut tx, chat_id).await?;

        let present = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM gdm_members WHERE chatid = $1 AND userid = ANY($2)",
        )
        .bind(chat_id)
        .bind(userids)
        .fetch_one(&mut *tx)
        .await?;

        if present as usize != userids.len() {
            return Err(AppError::NotFound(format!(
                "Not all users are members of group chat {}",
                chat_id
            )));
        }

        if count < min + userids.len() {
            return Ok(MembershipChange::BelowFloor { count });
        }

        sqlx::query("DELETE FROM gdm_members WHERE chatid = $1 AND userid = ANY($2)")
            .bind(chat_id)
            .bind(userids)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            DELETE FROM gdm_assoc
            WHERE chatid = $1 AND (userid_1 = ANY($2) OR userid_2 = ANY($2))
            "#,
        )
        .bind(chat_id)
        .bind(userids)
        .execute(&mut *tx)
        .await?;

        Self::touch_in(&mut tx, chat_id, now).await?;

        tx.commit().await?;
        Ok(MembershipChange::Applied {
            count: count - userids.len(),
        })
    }

    async fn update_props(
        &self,
        chat_id: &str,
        name: &str,
        theme: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE gdms SET name = $2, theme = $3 WHERE chatid = $1")
            .bind(chat_id)
            .bind(name)
            .bind(theme)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::touch_in(&mut tx, chat_id, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn touch(&self, chat_id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            WITH chat AS (
                UPDATE gdms SET last_updated = $2 WHERE chatid = $1 RETURNING chatid
            )
            UPDATE gdm_members SET last_updated = $2
            WHERE chatid IN (SELECT chatid FROM chat)
            "#,
        )
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
    ) -> Result<Vec<GroupChat>, AppError> {
        let rows = sqlx::query_as::<_, GdmRow>(
            r#"
            SELECT g.chatid, g.name, g.theme, g.last_updated, g.created_at
            FROM gdm_members m
            JOIN gdms g ON g.chatid = m.chatid
            WHERE m.userid = $1
              AND ($2::timestamptz IS NULL OR m.last_updated < $2)
            ORDER BY m.last_updated DESC
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

    async fn chats_of(&self, userid: &str, limit: i64) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT chatid FROM gdm_members WHERE userid = $1 LIMIT $2",
        )
        .bind(userid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn shared(
        &self,
        userid: &str,
        other: &str,
        limit: i64,
    ) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT chatid FROM gdm_assoc
            WHERE userid_1 = $1 AND userid_2 = $2
            ORDER BY chatid ASC
            LIMIT $3
            "#,
        )
        .bind(userid)
        .bind(other)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn delete(&self, chat_id: &str) -> Result<bool, AppError> {
        // Members and assoc rows go with the chat (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM gdms WHERE chatid = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
