use serde::Serialize;
use sqlx::Row;

use super::Database;
use crate::types::*;

/// A vote that carries a nickname or comment, for the results page
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VoteComment {
    pub poll_option_id: PollOptionId,
    pub nickname: Option<String>,
    pub comment: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Database {
    /// Insert a vote only while the option's room is voting.
    ///
    /// Returns `Ok(false)` when the option is missing or its room is in
    /// another phase. A second vote for the same (option, voter) fails with
    /// the store's unique-violation error; see [`super::is_unique_violation`].
    pub async fn insert_vote_if_voting(&self, vote: &Vote) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO votes (id, poll_option_id, voter_hash, nickname, comment, created_at)
            SELECT ?, p.id, ?, ?, ?, ?
            FROM poll_options p
            JOIN rooms r ON r.id = p.room_id
            WHERE p.id = ? AND r.status = 'voting'
            "#,
        )
        .bind(&vote.id)
        .bind(&vote.voter_hash)
        .bind(&vote.nickname)
        .bind(&vote.comment)
        .bind(vote.created_at)
        .bind(&vote.poll_option_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Each option of the room with its vote count, in insertion order
    pub async fn option_vote_counts(
        &self,
        room_id: &str,
    ) -> Result<Vec<(PollOption, u64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT p.*, COUNT(v.id) AS vote_count
            FROM poll_options p
            LEFT JOIN votes v ON v.poll_option_id = p.id
            WHERE p.room_id = ?
            GROUP BY p.id
            ORDER BY p.created_at ASC, p.rowid ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let option = <PollOption as sqlx::FromRow<_>>::from_row(row)?;
                let count: i64 = row.try_get("vote_count")?;
                Ok((option, count as u64))
            })
            .collect()
    }

    /// Options in the room this voter has already voted for
    pub async fn voted_option_ids(
        &self,
        room_id: &str,
        voter_hash: &str,
    ) -> Result<Vec<PollOptionId>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT v.poll_option_id
            FROM votes v
            JOIN poll_options p ON p.id = v.poll_option_id
            WHERE p.room_id = ? AND v.voter_hash = ?
            "#,
        )
        .bind(room_id)
        .bind(voter_hash)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Votes in the room that left a nickname or comment, oldest first
    pub async fn vote_comments(&self, room_id: &str) -> Result<Vec<VoteComment>, sqlx::Error> {
        sqlx::query_as::<_, VoteComment>(
            r#"
            SELECT v.poll_option_id, v.nickname, v.comment, v.created_at
            FROM votes v
            JOIN poll_options p ON p.id = v.poll_option_id
            WHERE p.room_id = ? AND (v.nickname IS NOT NULL OR v.comment IS NOT NULL)
            ORDER BY v.created_at ASC, v.rowid ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::is_unique_violation;
    use crate::db::test_support::sample_room;
    use chrono::Utc;

    fn vote(option_id: &str, voter: &str, comment: Option<&str>) -> Vote {
        Vote {
            id: ulid::Ulid::new().to_string(),
            poll_option_id: option_id.to_string(),
            voter_hash: voter.to_string(),
            nickname: None,
            comment: comment.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    /// A voting room with two options; returns (room, option ids)
    async fn voting_room(db: &Database) -> (Room, Vec<String>) {
        let room = sample_room("Lunch spot?");
        db.insert_room(&room).await.unwrap();
        db.insert_entry_if_collecting(&Entry {
            id: ulid::Ulid::new().to_string(),
            room_id: room.id.clone(),
            content: "ramen".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let options: Vec<PollOption> = ["ramen", "sushi"]
            .iter()
            .map(|text| PollOption {
                id: ulid::Ulid::new().to_string(),
                room_id: room.id.clone(),
                option_text: text.to_string(),
                explanation: None,
                related_opinions: vec![],
                created_at: Utc::now(),
            })
            .collect();
        db.open_voting(&room.id, &options, Utc::now()).await.unwrap();

        let ids = options.into_iter().map(|o| o.id).collect();
        (room, ids)
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_second_vote() {
        let db = Database::in_memory().await.unwrap();
        let (_, ids) = voting_room(&db).await;

        assert!(db
            .insert_vote_if_voting(&vote(&ids[0], "alice", None))
            .await
            .unwrap());

        let err = db
            .insert_vote_if_voting(&vote(&ids[0], "alice", None))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));

        // Same voter, different option is fine
        assert!(db
            .insert_vote_if_voting(&vote(&ids[1], "alice", None))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_counts_and_voted_ids() {
        let db = Database::in_memory().await.unwrap();
        let (room, ids) = voting_room(&db).await;

        for voter in ["alice", "bob"] {
            db.insert_vote_if_voting(&vote(&ids[1], voter, None))
                .await
                .unwrap();
        }
        db.insert_vote_if_voting(&vote(&ids[0], "carol", Some("tasty")))
            .await
            .unwrap();

        let counts: Vec<(String, u64)> = db
            .option_vote_counts(&room.id)
            .await
            .unwrap()
            .into_iter()
            .map(|(o, c)| (o.option_text, c))
            .collect();
        assert_eq!(
            counts,
            vec![("ramen".to_string(), 1), ("sushi".to_string(), 2)]
        );

        assert_eq!(
            db.voted_option_ids(&room.id, "alice").await.unwrap(),
            vec![ids[1].clone()]
        );
        assert!(db
            .voted_option_ids(&room.id, "dave")
            .await
            .unwrap()
            .is_empty());

        let comments = db.vote_comments(&room.id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment.as_deref(), Some("tasty"));
    }

    #[tokio::test]
    async fn test_no_votes_after_close() {
        let db = Database::in_memory().await.unwrap();
        let (room, ids) = voting_room(&db).await;
        db.advance_status(&room.id, RoomStatus::Voting, RoomStatus::Closed, Utc::now())
            .await
            .unwrap();

        assert!(!db
            .insert_vote_if_voting(&vote(&ids[0], "alice", None))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_room_cascades() {
        let db = Database::in_memory().await.unwrap();
        let (room, ids) = voting_room(&db).await;
        db.insert_vote_if_voting(&vote(&ids[0], "alice", None))
            .await
            .unwrap();

        assert!(db.delete_room(&room.id).await.unwrap());

        let (votes,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM votes")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(votes, 0);
        assert!(db.list_poll_options(&room.id).await.unwrap().is_empty());
        assert!(db.list_entries(&room.id).await.unwrap().is_empty());
    }
}
