//! HTTP API endpoints.
//!
//! Handlers are thin: they extract input, call into [`AppState`] and let
//! [`TohyoError`](crate::error::TohyoError) render failures.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{self, AdminToken, AuthConfig};
use crate::error::TohyoResult;
use crate::state::{AppState, RoomPage, RoomSummary, Tally, TallyOrder, TallyRow};
use crate::types::*;
use crate::voter::Voter;

const DEFAULT_ROOM_LIST: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub title: String,
}

/// The only response that ever carries the admin token
#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room: RoomSummary,
    pub admin_token: String,
    pub admin_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRoomsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitEntryRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CastVoteRequest {
    pub nickname: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub order: TallyOrder,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    #[serde(flatten)]
    pub tally: Tally,
    pub winner: Option<TallyRow>,
}

/// GET /api/health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/rooms?limit=N
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRoomsQuery>,
) -> TohyoResult<Json<Vec<RoomSummary>>> {
    let rooms = state
        .list_rooms(query.limit.unwrap_or(DEFAULT_ROOM_LIST))
        .await?;
    Ok(Json(rooms))
}

/// POST /api/rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoomRequest>,
) -> TohyoResult<(StatusCode, Json<CreateRoomResponse>)> {
    let room = state.create_room(&req.title).await?;
    let admin_token = room.admin_token.clone();
    let admin_url = auth::admin_url(&room.id, &admin_token);

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room: room.into(),
            admin_token,
            admin_url,
        }),
    ))
}

/// GET /api/rooms/{id}
///
/// The view depends on the room's phase, the caller's voter hash and
/// whether a valid admin token came along.
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Voter(voter): Voter,
    admin: AdminToken,
) -> TohyoResult<Json<RoomPage>> {
    let voter = voter?;
    let page = state.room_page(&room_id, &voter, admin.as_deref()).await?;
    Ok(Json(page))
}

/// GET /api/rooms/{id}/stats
pub async fn room_stats(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> TohyoResult<Json<RoomStats>> {
    Ok(Json(state.room_stats(&room_id).await?))
}

/// POST /api/rooms/{id}/entries
pub async fn submit_entry(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<SubmitEntryRequest>,
) -> TohyoResult<(StatusCode, Json<Entry>)> {
    let entry = state.submit_entry(&room_id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// POST /api/rooms/{id}/generate (admin)
///
/// Ends opinion collection: the AI condenses the opinions into five options
/// and the room opens for voting.
pub async fn generate_poll(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    admin: AdminToken,
) -> TohyoResult<Json<Vec<PollOption>>> {
    state.authorize_admin(&room_id, admin.as_deref()).await?;
    Ok(Json(state.generate_poll(&room_id).await?))
}

/// POST /api/rooms/{id}/close (admin)
pub async fn close_voting(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    admin: AdminToken,
) -> TohyoResult<Json<RoomSummary>> {
    state.authorize_admin(&room_id, admin.as_deref()).await?;
    let room = state.close_voting(&room_id).await?;
    Ok(Json(room.into()))
}

/// GET /api/rooms/{id}/results?order=insertion|ranking
pub async fn results(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<ResultsQuery>,
) -> TohyoResult<Json<ResultsResponse>> {
    let tally = state.tally(&room_id, query.order).await?;
    let winner = tally.winner().cloned();
    Ok(Json(ResultsResponse { tally, winner }))
}

/// POST /api/options/{id}/votes
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Path(option_id): Path<PollOptionId>,
    Voter(voter): Voter,
    Json(req): Json<CastVoteRequest>,
) -> TohyoResult<(StatusCode, Json<Vote>)> {
    let voter = voter?;
    let vote = state
        .cast_vote(
            &option_id,
            &voter,
            req.nickname.as_deref(),
            req.comment.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

/// DELETE /api/rooms/{id} (operator)
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> TohyoResult<StatusCode> {
    state.delete_room(&room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build the application router
pub fn router(state: Arc<AppState>, auth_config: Arc<AuthConfig>) -> Router {
    let operator_only =
        middleware::from_fn_with_state(auth_config, auth::operator_auth_middleware);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/rooms", get(list_rooms).post(create_room))
        .route(
            "/api/rooms/{id}",
            get(get_room).merge(delete(delete_room).route_layer(operator_only)),
        )
        .route("/api/rooms/{id}/stats", get(room_stats))
        .route("/api/rooms/{id}/entries", post(submit_entry))
        .route("/api/rooms/{id}/generate", post(generate_poll))
        .route("/api/rooms/{id}/close", post(close_voting))
        .route("/api/rooms/{id}/results", get(results))
        .route("/api/options/{id}/votes", post(cast_vote))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
