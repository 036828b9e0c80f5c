//! Read models for clients. One view per phase, so what a client can show
//! follows from the room's status alone.

use super::{AppState, Tally, TallyOrder, TallyRow};
use crate::auth::constant_time_eq;
use crate::db::VoteComment;
use crate::error::{TohyoError, TohyoResult};
use crate::types::*;
use crate::voter::VoterHash;
use serde::Serialize;
use std::collections::BTreeSet;

/// Upper bound for room listings
pub const MAX_ROOM_LIST: u32 = 100;

/// Room plus a display label for its status
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: Room,
    pub status_label: &'static str,
}

impl From<Room> for RoomSummary {
    fn from(room: Room) -> Self {
        let status_label = room.status.label();
        Self { room, status_label }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum RoomPhaseView {
    Collecting {
        entries: Vec<Entry>,
    },
    Voting {
        /// Options in insertion order with live counts
        options: Tally,
        voted_option_ids: BTreeSet<PollOptionId>,
        entries: Vec<Entry>,
    },
    Closed {
        ranking: Tally,
        winner: Option<TallyRow>,
        voted_option_ids: BTreeSet<PollOptionId>,
        comments: Vec<VoteComment>,
        entries: Vec<Entry>,
    },
}

/// Everything a client needs to render a room
#[derive(Debug, Clone, Serialize)]
pub struct RoomPage {
    pub room: RoomSummary,
    pub is_admin: bool,
    #[serde(flatten)]
    pub phase: RoomPhaseView,
}

impl AppState {
    /// Build the page for `room_id` as seen by `voter`.
    /// A wrong admin token is not an error here; it just doesn't unlock admin controls.
    pub async fn room_page(
        &self,
        room_id: &str,
        voter: &VoterHash,
        admin_token: Option<&str>,
    ) -> TohyoResult<RoomPage> {
        let room = self.require_room(room_id).await?;
        let is_admin = admin_token
            .is_some_and(|t| constant_time_eq(room.admin_token.as_bytes(), t.as_bytes()));

        let phase = match room.status {
            RoomStatus::Collecting => RoomPhaseView::Collecting {
                entries: self.db.list_entries(room_id).await?,
            },
            RoomStatus::Voting => {
                let (options, voted_option_ids, entries) = futures::try_join!(
                    self.tally(room_id, TallyOrder::Insertion),
                    self.voted_option_ids(room_id, voter),
                    async { Ok::<_, TohyoError>(self.db.list_entries(room_id).await?) },
                )?;
                RoomPhaseView::Voting {
                    options,
                    voted_option_ids,
                    entries,
                }
            }
            RoomStatus::Closed => {
                let (ranking, voted_option_ids, comments, entries) = futures::try_join!(
                    self.tally(room_id, TallyOrder::Ranking),
                    self.voted_option_ids(room_id, voter),
                    async { Ok::<_, TohyoError>(self.db.vote_comments(room_id).await?) },
                    async { Ok::<_, TohyoError>(self.db.list_entries(room_id).await?) },
                )?;
                RoomPhaseView::Closed {
                    winner: ranking.winner().cloned(),
                    ranking,
                    voted_option_ids,
                    comments,
                    entries,
                }
            }
        };

        Ok(RoomPage {
            room: room.into(),
            is_admin,
            phase,
        })
    }

    /// Most recent rooms first
    pub async fn list_rooms(&self, limit: u32) -> TohyoResult<Vec<RoomSummary>> {
        let rooms = self.db.list_rooms(limit.clamp(1, MAX_ROOM_LIST)).await?;
        Ok(rooms.into_iter().map(RoomSummary::from).collect())
    }

    pub async fn room_stats(&self, room_id: &str) -> TohyoResult<RoomStats> {
        self.db
            .room_stats(room_id)
            .await?
            .ok_or_else(|| TohyoError::NotFound(format!("Room {}", room_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{room_with_entries, state_with, CannedProvider};
    use std::sync::Arc;

    fn voter(name: &str) -> VoterHash {
        VoterHash::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_page_follows_phase() {
        let state = state_with(Some(Arc::new(CannedProvider::with_options(5)))).await;
        let room = room_with_entries(&state, &["ramen", "sushi"]).await;
        let alice = voter("alice");

        let page = state.room_page(&room.id, &alice, None).await.unwrap();
        assert!(!page.is_admin);
        match &page.phase {
            RoomPhaseView::Collecting { entries } => assert_eq!(entries.len(), 2),
            other => panic!("unexpected phase {:?}", other),
        }

        let options = state.generate_poll(&room.id).await.unwrap();
        state
            .cast_vote(&options[3].id, &alice, Some("Al"), Some("near the office"))
            .await
            .unwrap();

        let page = state
            .room_page(&room.id, &alice, Some(room.admin_token.as_str()))
            .await
            .unwrap();
        assert!(page.is_admin);
        match &page.phase {
            RoomPhaseView::Voting {
                options: tally,
                voted_option_ids,
                ..
            } => {
                assert_eq!(tally.rows[0].option.id, options[0].id);
                assert!(voted_option_ids.contains(&options[3].id));
            }
            other => panic!("unexpected phase {:?}", other),
        }

        state.close_voting(&room.id).await.unwrap();
        let page = state.room_page(&room.id, &voter("bob"), None).await.unwrap();
        match &page.phase {
            RoomPhaseView::Closed {
                ranking,
                winner,
                voted_option_ids,
                comments,
                ..
            } => {
                assert_eq!(ranking.rows[0].option.id, options[3].id);
                assert_eq!(winner.as_ref().unwrap().option.id, options[3].id);
                assert!(voted_option_ids.is_empty());
                assert_eq!(comments[0].comment.as_deref(), Some("near the office"));
            }
            other => panic!("unexpected phase {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_page_json_shape() {
        let state = state_with(None).await;
        let room = room_with_entries(&state, &["ramen"]).await;

        let page = state
            .room_page(&room.id, &voter("alice"), Some(room.admin_token.as_str()))
            .await
            .unwrap();
        let json = serde_json::to_value(&page).unwrap();

        assert_eq!(json["phase"], "collecting");
        assert_eq!(json["room"]["status"], "collecting");
        assert_eq!(json["room"]["status_label"], "Collecting opinions");
        assert_eq!(json["entries"][0]["content"], "ramen");
        assert_eq!(json["is_admin"], true);
        assert!(!json.to_string().contains(&room.admin_token));
    }

    #[tokio::test]
    async fn test_list_rooms_and_stats() {
        let state = state_with(None).await;
        let first = room_with_entries(&state, &["a", "b"]).await;
        let second = state.create_room("Team name").await.unwrap();

        let rooms = state.list_rooms(10).await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room.id, second.id);

        let stats = state.room_stats(&first.id).await.unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.poll_count, 0);
        assert_eq!(stats.vote_count, 0);

        assert!(matches!(
            state.room_stats("missing").await,
            Err(TohyoError::NotFound(_))
        ));
    }
}
