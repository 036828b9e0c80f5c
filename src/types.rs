use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque ID types for readability
pub type RoomId = String;
pub type EntryId = String;
pub type PollOptionId = String;
pub type VoteId = String;

/// Every generated poll has exactly this many options
pub const POLL_OPTION_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Collecting,
    Voting,
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Collecting => "collecting",
            RoomStatus::Voting => "voting",
            RoomStatus::Closed => "closed",
        }
    }

    /// Human-readable label for listings
    pub fn label(&self) -> &'static str {
        match self {
            RoomStatus::Collecting => "Collecting opinions",
            RoomStatus::Voting => "Voting",
            RoomStatus::Closed => "Closed",
        }
    }

    /// Whether `self -> to` is an edge of the room state machine.
    /// Only forward single steps exist; there are no self-loops.
    pub fn can_advance_to(&self, to: RoomStatus) -> bool {
        use RoomStatus::*;

        matches!((self, to), (Collecting, Voting) | (Voting, Closed))
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collecting" => Ok(RoomStatus::Collecting),
            "voting" => Ok(RoomStatus::Voting),
            "closed" => Ok(RoomStatus::Closed),
            other => Err(format!("unknown room status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub title: String,
    pub status: RoomStatus,
    /// Capability token gating phase-advance operations. Never serialized.
    #[serde(skip_serializing)]
    pub admin_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Entry {
    pub id: EntryId,
    pub room_id: RoomId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PollOption {
    pub id: PollOptionId,
    pub room_id: RoomId,
    pub option_text: String,
    pub explanation: Option<String>,
    /// Zero-based positions of the entries this option was derived from
    pub related_opinions: Vec<usize>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Vote {
    pub id: VoteId,
    pub poll_option_id: PollOptionId,
    pub voter_hash: String,
    pub nickname: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Room with aggregate counts, for listings and the admin panel
#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    #[serde(flatten)]
    pub room: Room,
    pub entry_count: u64,
    pub poll_count: u64,
    pub vote_count: u64,
}

/// One AI-generated candidate, validated but not yet persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOption {
    pub option_text: String,
    pub explanation: String,
    pub related_opinions: std::collections::BTreeSet<usize>,
}

/// Input limits applied to free-text fields (in characters)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomLimits {
    pub max_title_chars: usize,
    pub max_entry_chars: usize,
    pub max_nickname_chars: usize,
    pub max_comment_chars: usize,
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            max_title_chars: 200,
            max_entry_chars: 1000,
            max_nickname_chars: 50,
            max_comment_chars: 500,
        }
    }
}
