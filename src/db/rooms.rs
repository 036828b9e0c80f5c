use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::Database;
use crate::types::*;

impl<'r> FromRow<'r, SqliteRow> for Room {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Room {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            status: status
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            admin_token: row.try_get("admin_token")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Database {
    pub async fn insert_room(&self, room: &Room) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO rooms (id, title, status, admin_token, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(&room.title)
        .bind(room.status.as_str())
        .bind(&room.admin_token)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>, sqlx::Error> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Most recently created rooms first
    pub async fn list_rooms(&self, limit: u32) -> Result<Vec<Room>, sqlx::Error> {
        sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn room_stats(&self, room_id: &str) -> Result<Option<RoomStats>, sqlx::Error> {
        let Some(room) = self.get_room(room_id).await? else {
            return Ok(None);
        };

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM entries WHERE room_id = ?1) AS entry_count,
                (SELECT COUNT(*) FROM poll_options WHERE room_id = ?1) AS poll_count,
                (SELECT COUNT(*) FROM votes v
                    JOIN poll_options p ON p.id = v.poll_option_id
                    WHERE p.room_id = ?1) AS vote_count
            "#,
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(RoomStats {
            room,
            entry_count: row.try_get::<i64, _>("entry_count")? as u64,
            poll_count: row.try_get::<i64, _>("poll_count")? as u64,
            vote_count: row.try_get::<i64, _>("vote_count")? as u64,
        }))
    }

    /// Move a room from `from` to `to` only if it is currently in `from`.
    /// Returns whether the row changed.
    pub async fn advance_status(
        &self,
        room_id: &str,
        from: RoomStatus,
        to: RoomStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE rooms SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(now)
                .bind(room_id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a room; entries, options and votes go with it
    pub async fn delete_room(&self, room_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
