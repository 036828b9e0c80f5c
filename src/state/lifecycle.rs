use super::{required_text, AppState};
use crate::aggregator;
use crate::auth::{constant_time_eq, generate_admin_token};
use crate::db::OpenVotingOutcome;
use crate::error::{TohyoError, TohyoResult};
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Create a new room in the collecting phase with a fresh admin token
    pub async fn create_room(&self, title: &str) -> TohyoResult<Room> {
        let title = required_text("Title", title, self.limits.max_title_chars)?;
        let now = Utc::now();

        let room = Room {
            id: ulid::Ulid::new().to_string(),
            title,
            status: RoomStatus::Collecting,
            admin_token: generate_admin_token(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_room(&room).await?;

        tracing::info!("Created room {} ({})", room.id, room.title);
        Ok(room)
    }

    /// Add an opinion to a collecting room
    pub async fn submit_entry(&self, room_id: &str, content: &str) -> TohyoResult<Entry> {
        let content = required_text("Opinion", content, self.limits.max_entry_chars)?;

        let entry = Entry {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.to_string(),
            content,
            created_at: Utc::now(),
        };

        if !self.db.insert_entry_if_collecting(&entry).await? {
            return Err(self.rejection(room_id, RoomStatus::Collecting).await);
        }

        tracing::debug!("Entry {} added to room {}", entry.id, room_id);
        Ok(entry)
    }

    /// Check the admin token for a room. Returns the room on success.
    pub async fn authorize_admin(&self, room_id: &str, token: Option<&str>) -> TohyoResult<Room> {
        let room = self.require_room(room_id).await?;
        match token {
            Some(token) if constant_time_eq(room.admin_token.as_bytes(), token.as_bytes()) => {
                Ok(room)
            }
            _ => {
                tracing::warn!("Rejected admin credential for room {}", room_id);
                Err(TohyoError::Unauthorized)
            }
        }
    }

    /// Close collection: summarize the room's opinions into five options and open voting.
    ///
    /// Room, phase and entries are checked before the AI is called. If the AI
    /// fails, the room stays collecting and nothing is written.
    pub async fn generate_poll(&self, room_id: &str) -> TohyoResult<Vec<PollOption>> {
        let room = self.require_room(room_id).await?;
        ensure_transition(&room, RoomStatus::Collecting, RoomStatus::Voting)?;

        let entries = self.db.list_entries(room_id).await?;
        if entries.is_empty() {
            return Err(no_opinions());
        }

        let provider = self.llm.as_ref().ok_or_else(|| {
            TohyoError::Upstream("No AI provider is configured".to_string())
        })?;

        tracing::info!(
            "Generating poll for room {} from {} opinions via {}",
            room_id,
            entries.len(),
            provider.name()
        );

        let contents: Vec<String> = entries.into_iter().map(|e| e.content).collect();
        let generated =
            aggregator::summarize(provider.as_ref(), &contents, &room.title, &self.summarize)
                .await?;

        self.advance_to_voting(room_id, generated).await
    }

    /// Persist the five options and flip the room to voting, atomically
    pub async fn advance_to_voting(
        &self,
        room_id: &str,
        generated: [GeneratedOption; POLL_OPTION_COUNT],
    ) -> TohyoResult<Vec<PollOption>> {
        let now = Utc::now();
        let options: Vec<PollOption> = generated
            .into_iter()
            .map(|g| PollOption {
                id: ulid::Ulid::new().to_string(),
                room_id: room_id.to_string(),
                option_text: g.option_text,
                explanation: Some(g.explanation).filter(|e| !e.trim().is_empty()),
                related_opinions: g.related_opinions.into_iter().collect(),
                created_at: now,
            })
            .collect();

        match self.db.open_voting(room_id, &options, now).await? {
            OpenVotingOutcome::Opened => {
                tracing::info!("Room {} is now voting", room_id);
                Ok(options)
            }
            OpenVotingOutcome::Rejected => Err(self.rejection(room_id, RoomStatus::Collecting).await),
        }
    }

    /// End voting and reveal results
    pub async fn close_voting(&self, room_id: &str) -> TohyoResult<Room> {
        let room = self.require_room(room_id).await?;
        ensure_transition(&room, RoomStatus::Voting, RoomStatus::Closed)?;

        let now = Utc::now();
        if !self
            .db
            .advance_status(room_id, RoomStatus::Voting, RoomStatus::Closed, now)
            .await?
        {
            return Err(self.rejection(room_id, RoomStatus::Voting).await);
        }

        tracing::info!("Room {} closed", room_id);
        Ok(Room {
            status: RoomStatus::Closed,
            updated_at: now,
            ..room
        })
    }

    /// Remove a room and everything in it
    pub async fn delete_room(&self, room_id: &str) -> TohyoResult<()> {
        if !self.db.delete_room(room_id).await? {
            return Err(TohyoError::NotFound(format!("Room {}", room_id)));
        }
        tracing::info!("Deleted room {}", room_id);
        Ok(())
    }

    /// Explain why a status-guarded write matched no row
    pub(super) async fn rejection(&self, room_id: &str, expected: RoomStatus) -> TohyoError {
        match self.require_room(room_id).await {
            Err(e) => e,
            Ok(room) if room.status != expected => TohyoError::InvalidState {
                expected,
                actual: room.status,
            },
            // Still collecting, so the entries guard is what failed
            Ok(_) => no_opinions(),
        }
    }
}

fn ensure_transition(room: &Room, from: RoomStatus, to: RoomStatus) -> TohyoResult<()> {
    if room.status.can_advance_to(to) {
        Ok(())
    } else {
        Err(TohyoError::InvalidState {
            expected: from,
            actual: room.status,
        })
    }
}

fn no_opinions() -> TohyoError {
    TohyoError::Validation("No opinions have been submitted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{room_with_entries, state_with, CannedProvider};
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn generated() -> [GeneratedOption; POLL_OPTION_COUNT] {
        std::array::from_fn(|i| GeneratedOption {
            option_text: format!("Option {}", i + 1),
            explanation: String::new(),
            related_opinions: BTreeSet::from([0]),
        })
    }

    fn assert_invalid_state(err: TohyoError, expected: RoomStatus, actual: RoomStatus) {
        match err {
            TohyoError::InvalidState {
                expected: e,
                actual: a,
            } => {
                assert_eq!(e, expected);
                assert_eq!(a, actual);
            }
            other => panic!("expected InvalidState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_room() {
        let state = state_with(None).await;
        let room = state.create_room("  Lunch spot?  ").await.unwrap();

        assert_eq!(room.title, "Lunch spot?");
        assert_eq!(room.status, RoomStatus::Collecting);
        assert_eq!(room.admin_token.len(), 48);
        assert!(state.db.get_room(&room.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_room_validation() {
        let state = state_with(None).await;
        assert!(matches!(
            state.create_room("   ").await,
            Err(TohyoError::Validation(_))
        ));
        let long = "x".repeat(state.limits.max_title_chars + 1);
        assert!(matches!(
            state.create_room(&long).await,
            Err(TohyoError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_entry_errors() {
        let state = state_with(None).await;
        assert!(matches!(
            state.submit_entry("missing", "ramen").await,
            Err(TohyoError::NotFound(_))
        ));

        let room = room_with_entries(&state, &["ramen"]).await;
        assert!(matches!(
            state.submit_entry(&room.id, "  ").await,
            Err(TohyoError::Validation(_))
        ));

        state.advance_to_voting(&room.id, generated()).await.unwrap();
        let err = state.submit_entry(&room.id, "late").await.unwrap_err();
        assert_invalid_state(err, RoomStatus::Collecting, RoomStatus::Voting);
    }

    #[tokio::test]
    async fn test_advance_without_entries() {
        let state = state_with(None).await;
        let room = room_with_entries(&state, &[]).await;

        let err = state
            .advance_to_voting(&room.id, generated())
            .await
            .unwrap_err();
        assert!(matches!(err, TohyoError::Validation(_)));

        let room = state.require_room(&room.id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Collecting);
        assert!(state.db.list_poll_options(&room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transitions_only_move_forward() {
        let state = state_with(None).await;
        let room = room_with_entries(&state, &["ramen"]).await;

        // collecting -> closed is not an edge
        let err = state.close_voting(&room.id).await.unwrap_err();
        assert_invalid_state(err, RoomStatus::Voting, RoomStatus::Collecting);

        let options = state.advance_to_voting(&room.id, generated()).await.unwrap();
        assert_eq!(options.len(), POLL_OPTION_COUNT);
        assert_eq!(options[0].explanation, None);

        // voting -> collecting/voting
        let err = state
            .advance_to_voting(&room.id, generated())
            .await
            .unwrap_err();
        assert_invalid_state(err, RoomStatus::Collecting, RoomStatus::Voting);

        let closed = state.close_voting(&room.id).await.unwrap();
        assert_eq!(closed.status, RoomStatus::Closed);

        // closed -> anything
        let err = state.close_voting(&room.id).await.unwrap_err();
        assert_invalid_state(err, RoomStatus::Voting, RoomStatus::Closed);
        let err = state
            .advance_to_voting(&room.id, generated())
            .await
            .unwrap_err();
        assert_invalid_state(err, RoomStatus::Collecting, RoomStatus::Closed);
        let err = state.generate_poll(&room.id).await.unwrap_err();
        assert_invalid_state(err, RoomStatus::Collecting, RoomStatus::Closed);

        assert_eq!(state.db.list_poll_options(&room.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_advance_only_one_wins() {
        let state = state_with(None).await;
        let room = room_with_entries(&state, &["ramen", "sushi"]).await;

        let (a, b) = tokio::join!(
            state.advance_to_voting(&room.id, generated()),
            state.advance_to_voting(&room.id, generated()),
        );

        let (ok, err) = match (a, b) {
            (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
            other => panic!("expected exactly one winner, got {:?}", other),
        };
        assert_eq!(ok.len(), POLL_OPTION_COUNT);
        assert_invalid_state(err, RoomStatus::Collecting, RoomStatus::Voting);
        assert_eq!(state.db.list_poll_options(&room.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_generate_poll() {
        let provider = Arc::new(CannedProvider::with_options(5));
        let state = state_with(Some(provider.clone())).await;
        let room = room_with_entries(&state, &["ramen", "sushi", "curry"]).await;

        let options = state.generate_poll(&room.id).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let texts: Vec<&str> = options.iter().map(|o| o.option_text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Option 1", "Option 2", "Option 3", "Option 4", "Option 5"]
        );
        assert_eq!(options[1].explanation.as_deref(), Some("Reason 2"));
        assert_eq!(
            state.require_room(&room.id).await.unwrap().status,
            RoomStatus::Voting
        );
    }

    #[tokio::test]
    async fn test_generate_poll_malformed_response_leaves_room_collecting() {
        let provider = Arc::new(CannedProvider::with_options(4));
        let state = state_with(Some(provider.clone())).await;
        let room = room_with_entries(&state, &["ramen"]).await;

        let err = state.generate_poll(&room.id).await.unwrap_err();
        assert!(matches!(err, TohyoError::Upstream(_)));

        assert_eq!(
            state.require_room(&room.id).await.unwrap().status,
            RoomStatus::Collecting
        );
        assert!(state.db.list_poll_options(&room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_poll_checks_before_calling_ai() {
        let provider = Arc::new(CannedProvider::with_options(5));
        let state = state_with(Some(provider.clone())).await;
        let room = room_with_entries(&state, &[]).await;

        assert!(matches!(
            state.generate_poll(&room.id).await,
            Err(TohyoError::Validation(_))
        ));
        assert!(matches!(
            state.generate_poll("missing").await,
            Err(TohyoError::NotFound(_))
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_poll_without_provider() {
        let state = state_with(None).await;
        let room = room_with_entries(&state, &["ramen"]).await;

        assert!(matches!(
            state.generate_poll(&room.id).await,
            Err(TohyoError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_admin() {
        let state = state_with(None).await;
        let room = state.create_room("Lunch spot?").await.unwrap();

        assert!(state
            .authorize_admin(&room.id, Some(room.admin_token.as_str()))
            .await
            .is_ok());
        assert!(matches!(
            state.authorize_admin(&room.id, Some("nope")).await,
            Err(TohyoError::Unauthorized)
        ));
        assert!(matches!(
            state.authorize_admin(&room.id, None).await,
            Err(TohyoError::Unauthorized)
        ));
        assert!(matches!(
            state.authorize_admin("missing", Some("x")).await,
            Err(TohyoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_room() {
        let state = state_with(None).await;
        let room = room_with_entries(&state, &["ramen"]).await;

        state.delete_room(&room.id).await.unwrap();
        assert!(matches!(
            state.require_room(&room.id).await,
            Err(TohyoError::NotFound(_))
        ));
        assert!(matches!(
            state.delete_room(&room.id).await,
            Err(TohyoError::NotFound(_))
        ));
    }
}
