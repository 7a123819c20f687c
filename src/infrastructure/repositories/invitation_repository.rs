//! Invitation Repository Implementation
//!
//! PostgreSQL implementation of the InvitationRepository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{FriendInvitation, InvitationRepository};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    userid: String,
    invited_by: String,
    created_at: DateTime<Utc>,
}

impl From<InvitationRow> for FriendInvitation {
    fn from(row: InvitationRow) -> Self {
        FriendInvitation {
            userid: row.userid,
            invited_by: row.invited_by,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL friend invitation repository implementation.
#[derive(Clone)]
pub struct PgInvitationRepository {
    pool: PgPool,
}

impl PgInvitationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvitationRepository for PgInvitationRepository {
    async fn find(
        &self,
        userid: &str,
        invited_by: &str,
    ) -> Result<Option<FriendInvitation>, AppError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT userid, invited_by, created_at
            FROM friend_invitations
            WHERE userid = $1 AND invited_by = $2
            "#,
        )
        .bind(userid)
        .bind(invited_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, invitation: &FriendInvitation) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO friend_invitations (userid, invited_by, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&invitation.userid)
        .bind(&invitation.invited_by)
        .bind(invitation.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, userid: &str, invited_by: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM friend_invitations
            WHERE userid = $1 AND invited_by = $2
            "#,
        )
        .bind(userid)
        .bind(invited_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_received(
        &self,
        userid: &str,
        since: DateTime<Utc>,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT userid, invited_by, created_at
            FROM friend_invitations
            WHERE userid = $1 AND created_at > $2
              AND ($3::varchar IS NULL OR invited_by > $3)
            ORDER BY invited_by ASC
            LIMIT $4
            "#,
        )
        .bind(userid)
        .bind(since)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_sent(
        &self,
        invited_by: &str,
        since: DateTime<Utc>,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT userid, invited_by, created_at
            FROM friend_invitations
            WHERE invited_by = $1 AND created_at > $2
              AND ($3::varchar IS NULL OR userid > $3)
            ORDER BY userid ASC
            LIMIT $4
            "#,
        )
        .bind(invited_by)
        .bind(since)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_expired(
        &self,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT userid, invited_by, created_at
            FROM friend_invitations
            WHERE created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_involving(
        &self,
        userid: &str,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT userid, invited_by, created_at
            FROM friend_invitations
            WHERE userid = $1 OR invited_by = $1
            LIMIT $2
            "#,
        )
        .bind(userid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
