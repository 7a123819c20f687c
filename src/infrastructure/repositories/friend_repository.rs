//! Friend Repository Implementation
//!
//! PostgreSQL implementation of the FriendRepository trait.
//! Both directions of a friendship are written and removed by a single
//! statement so the mirrored pair can never be observed half-written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{FriendEdge, FriendRepository};
use crate::shared::error::AppError;

/// Database row representation matching the friends table schema.
#[derive(Debug, sqlx::FromRow)]
struct FriendRow {
    userid: String,
    friend_id: String,
    friend_username: String,
    created_at: DateTime<Utc>,
}

impl From<FriendRow> for FriendEdge {
    fn from(row: FriendRow) -> Self {
        FriendEdge {
            userid: row.userid,
            friend_id: row.friend_id,
            friend_username: row.friend_username,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL friend repository implementation.
#[derive(Clone)]
pub struct PgFriendRepository {
    pool: PgPool,
}

impl PgFriendRepository {
    /// Create a new PgFriendRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape LIKE metacharacters so user input only ever matches literally.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl FriendRepository for PgFriendRepository {
    async fn exists(&self, userid: &str, friend_id: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM friends WHERE userid = $1 AND friend_id = $2)
            "#,
        )
        .bind(userid)
        .bind(friend_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert_mirrored(&self, edges: [FriendEdge; 2]) -> Result<(), AppError> {
        let [a, b] = edges;

        sqlx::query(
            r#"
            INSERT INTO friends (userid, friend_id, friend_username, created_at)
            VALUES ($1, $2, $3, $4), ($5, $6, $7, $8)
            "#,
        )
        .bind(&a.userid)
        .bind(&a.friend_id)
        .bind(&a.friend_username)
        .bind(a.created_at)
        .bind(&b.userid)
        .bind(&b.friend_id)
        .bind(&b.friend_username)
        .bind(b.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_mirrored(&self, userid1: &str, userid2: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM friends
            WHERE (userid = $1 AND friend_id = $2) OR (userid = $2 AND friend_id = $1)
            "#,
        )
        .bind(userid1)
        .bind(userid2)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, AppError> {
        let rows = sqlx::query_as::<_, FriendRow>(
            r#"
            SELECT userid, friend_id, friend_username, created_at
            FROM friends
            WHERE userid = $1 AND ($2::varchar IS NULL OR friend_id > $2)
            ORDER BY friend_id ASC
            LIMIT $3
            "#,
        )
        .bind(userid)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn search(
        &self,
        userid: &str,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, AppError> {
        let rows = sqlx::query_as::<_, FriendRow>(
            r#"
            SELECT userid, friend_id, friend_username, created_at
            FROM friends
            WHERE userid = $1 AND friend_username LIKE $2 ESCAPE '\'
            ORDER BY friend_username ASC, friend_id ASC
            LIMIT $3
            "#,
        )
        .bind(userid)
        .bind(like_prefix(prefix))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn filter_friends(
        &self,
        userid: &str,
        candidates: &[String],
    ) -> Result<Vec<String>, AppError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT friend_id FROM friends
            WHERE userid = $1 AND friend_id = ANY($2)
            "#,
        )
        .bind(userid)
        .bind(candidates)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
