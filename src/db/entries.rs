use super::Database;
use crate::types::*;

impl Database {
    /// Insert an entry only while its room is collecting.
    /// Returns false when the room is missing or in another phase.
    pub async fn insert_entry_if_collecting(&self, entry: &Entry) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO entries (id, room_id, content, created_at)
            SELECT ?, r.id, ?, ?
            FROM rooms r
            WHERE r.id = ? AND r.status = 'collecting'
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.content)
        .bind(entry.created_at)
        .bind(&entry.room_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Entries of a room in submission order
    pub async fn list_entries(&self, room_id: &str) -> Result<Vec<Entry>, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, room_id, content, created_at
            FROM entries
            WHERE room_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
    }
}
