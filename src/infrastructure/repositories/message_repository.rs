//! Message Repository Implementation
//!
//! PostgreSQL implementation of the append-only message log with
//! cursor-based pagination on the snowflake message ID.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Message, MessageKind, MessageRepository};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
///
/// Messages of direct and group chats share the `msgs` table; chat IDs are
/// random and never collide across the two families.
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    chatid: String,
    msgid: i64,
    userid: String,
    time: DateTime<Utc>,
    kind: String,
    value: String,
}

impl MessageRow {
    /// Converts database row to domain Message entity.
    fn into_message(self) -> Message {
        Message {
            chat_id: self.chatid,
            msg_id: self.msgid,
            userid: self.userid,
            time: self.time,
            kind: MessageKind::from_str(&self.kind),
            value: self.value,
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: &Message) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO msgs (chatid, msgid, userid, time, kind, value)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&message.chat_id)
        .bind(message.msg_id)
        .bind(&message.userid)
        .bind(message.time)
        .bind(message.kind.as_str())
        .bind(&message.value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, chat_id: &str, msg_id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT chatid, msgid, userid, time, kind, value
            FROM msgs
            WHERE chatid = $1 AND msgid = $2
            "#,
        )
        .bind(chat_id)
        .bind(msg_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MessageRow::into_message))
    }

    async fn list(
        &self,
        chat_id: &str,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let rows = if let Some(before_id) = before {
            sqlx::query_as::<_, MessageRow>(
                r#"
                SELECT chatid, msgid, userid, time, kind, value
                FROM msgs
                WHERE chatid = $1 AND msgid < $2
                ORDER BY msgid DESC
                LIMIT $3
                "#,
            )
            .bind(chat_id)
            .bind(before_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, MessageRow>(
                r#"
                SELECT chatid, msgid, userid, time, kind, value
                FROM msgs
                WHERE chatid = $1
                ORDER BY msgid DESC
                LIMIT $2
                "#,
            )
            .bind(chat_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn delete(&self, chat_id: &str, msg_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM msgs WHERE chatid = $1 AND msgid = $2")
            .bind(chat_id)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, chat_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM msgs WHERE chatid = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
