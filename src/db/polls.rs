use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::Database;
use crate::types::*;

impl<'r> FromRow<'r, SqliteRow> for PollOption {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let related: String = row.try_get("related_opinions")?;
        Ok(PollOption {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            option_text: row.try_get("option_text")?,
            explanation: row.try_get("explanation")?,
            related_opinions: serde_json::from_str(&related)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Outcome of the collecting -> voting transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenVotingOutcome {
    Opened,
    /// The guarded update matched nothing: room missing, not collecting, or without entries
    Rejected,
}

impl Database {
    /// Flip a collecting room with entries to voting and insert its options,
    /// all in one transaction. The guarded UPDATE runs first so concurrent
    /// callers serialize on the write lock and only one of them matches.
    pub async fn open_voting(
        &self,
        room_id: &str,
        options: &[PollOption],
        now: DateTime<Utc>,
    ) -> Result<OpenVotingOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE rooms SET status = 'voting', updated_at = ?
            WHERE id = ? AND status = 'collecting'
              AND EXISTS (SELECT 1 FROM entries WHERE room_id = rooms.id)
            "#,
        )
        .bind(now)
        .bind(room_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(OpenVotingOutcome::Rejected);
        }

        for option in options {
            let related = serde_json::to_string(&option.related_opinions)
                .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

            sqlx::query(
                r#"
                INSERT INTO poll_options
                    (id, room_id, option_text, explanation, related_opinions, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&option.id)
            .bind(room_id)
            .bind(&option.option_text)
            .bind(&option.explanation)
            .bind(related)
            .bind(option.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(OpenVotingOutcome::Opened)
    }

    /// Options of a room in insertion order
    pub async fn list_poll_options(&self, room_id: &str) -> Result<Vec<PollOption>, sqlx::Error> {
        sqlx::query_as::<_, PollOption>(
            "SELECT * FROM poll_options WHERE room_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
    }

    /// The room that owns a poll option
    pub async fn room_for_option(&self, option_id: &str) -> Result<Option<Room>, sqlx::Error> {
        sqlx::query_as::<_, Room>(
            r#"
            SELECT r.* FROM rooms r
            JOIN poll_options p ON p.room_id = r.id
            WHERE p.id = ?
            "#,
        )
        .bind(option_id)
        .fetch_optional(&self.pool)
        .await
    }
}
