use super::{optional_text, AppState};
use crate::db::is_unique_violation;
use crate::error::{TohyoError, TohyoResult};
use crate::types::*;
use crate::voter::VoterHash;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Row order of a [`Tally`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TallyOrder {
    /// Options as generated (shown while voting)
    #[default]
    Insertion,
    /// Most votes first, ties keep insertion order (shown once closed)
    Ranking,
}

#[derive(Debug, Clone, Serialize)]
pub struct TallyRow {
    #[serde(flatten)]
    pub option: PollOption,
    pub vote_count: u64,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tally {
    pub rows: Vec<TallyRow>,
    pub total_votes: u64,
}

/// Share of `count` in `total` as a whole percent, half rounding up; 0 when nobody voted
pub fn percentage(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((200 * count + total) / (2 * total)) as u32
}

impl Tally {
    /// Build from per-option counts given in insertion order
    pub fn from_counts(counts: Vec<(PollOption, u64)>, order: TallyOrder) -> Self {
        let total_votes: u64 = counts.iter().map(|(_, c)| c).sum();
        let mut rows: Vec<TallyRow> = counts
            .into_iter()
            .map(|(option, vote_count)| TallyRow {
                option,
                vote_count,
                percentage: percentage(vote_count, total_votes),
            })
            .collect();

        if order == TallyOrder::Ranking {
            // sort_by is stable
            rows.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        }

        Self { rows, total_votes }
    }

    /// The option with the most votes, earliest-inserted on ties.
    /// With no votes at all every option ties at zero and the first one wins.
    pub fn winner(&self) -> Option<&TallyRow> {
        // Equal counts appear in insertion order in either ordering
        self.rows
            .iter()
            .reduce(|best, row| if row.vote_count > best.vote_count { row } else { best })
    }
}

impl AppState {
    /// Record one vote for an option.
    ///
    /// The phase check happens inside the INSERT and duplicates are caught by
    /// the store's unique constraint, so concurrent voters cannot slip through.
    pub async fn cast_vote(
        &self,
        poll_option_id: &str,
        voter: &VoterHash,
        nickname: Option<&str>,
        comment: Option<&str>,
    ) -> TohyoResult<Vote> {
        let vote = Vote {
            id: ulid::Ulid::new().to_string(),
            poll_option_id: poll_option_id.to_string(),
            voter_hash: voter.as_str().to_string(),
            nickname: optional_text("Nickname", nickname, self.limits.max_nickname_chars)?,
            comment: optional_text("Comment", comment, self.limits.max_comment_chars)?,
            created_at: Utc::now(),
        };

        match self.db.insert_vote_if_voting(&vote).await {
            Ok(true) => {
                tracing::debug!("Vote {} for option {}", vote.id, poll_option_id);
                Ok(vote)
            }
            Ok(false) => match self.db.room_for_option(poll_option_id).await? {
                None => Err(TohyoError::NotFound(format!(
                    "Poll option {}",
                    poll_option_id
                ))),
                Some(room) => Err(TohyoError::InvalidState {
                    expected: RoomStatus::Voting,
                    actual: room.status,
                }),
            },
            Err(e) if is_unique_violation(&e) => Err(TohyoError::DuplicateVote),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn tally(&self, room_id: &str, order: TallyOrder) -> TohyoResult<Tally> {
        self.require_room(room_id).await?;
        let counts = self.db.option_vote_counts(room_id).await?;
        Ok(Tally::from_counts(counts, order))
    }

    /// Options in the room this voter already picked; empty while collecting
    pub async fn voted_option_ids(
        &self,
        room_id: &str,
        voter: &VoterHash,
    ) -> TohyoResult<BTreeSet<PollOptionId>> {
        let room = self.require_room(room_id).await?;
        if room.status == RoomStatus::Collecting {
            return Ok(BTreeSet::new());
        }

        let ids = self.db.voted_option_ids(room_id, voter.as_str()).await?;
        Ok(ids.into_iter().collect())
    }
}
