mod ledger;
mod lifecycle;
mod view;

pub use ledger::{Tally, TallyOrder, TallyRow};
pub use view::{RoomPage, RoomPhaseView, RoomSummary, MAX_ROOM_LIST};

use crate::aggregator::SummarizeOptions;
use crate::db::Database;
use crate::error::{TohyoError, TohyoResult};
use crate::llm::LlmProvider;
use crate::types::*;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// AI backend for poll generation (None = generation unavailable)
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub summarize: SummarizeOptions,
    pub limits: RoomLimits,
}

impl AppState {
    pub fn new(db: Database, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            db,
            llm,
            summarize: SummarizeOptions::default(),
            limits: RoomLimits::default(),
        }
    }

    pub fn with_summarize_options(mut self, summarize: SummarizeOptions) -> Self {
        self.summarize = summarize;
        self
    }

    /// Load a room or fail with NotFound
    pub async fn require_room(&self, room_id: &str) -> TohyoResult<Room> {
        self.db
            .get_room(room_id)
            .await?
            .ok_or_else(|| TohyoError::NotFound(format!("Room {}", room_id)))
    }
}

/// Trim `raw` and reject it when empty or longer than `max` characters
pub(crate) fn required_text(field: &str, raw: &str, max: usize) -> TohyoResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TohyoError::Validation(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max {
        return Err(TohyoError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

/// Like [`required_text`], but blank input means "not given"
pub(crate) fn optional_text(
    field: &str,
    raw: Option<&str>,
    max: usize,
) -> TohyoResult<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => required_text(field, text, max).map(Some),
    }
}
