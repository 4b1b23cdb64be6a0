use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        king::KingDecisionDto,
        phase::{PhaseSnapshot, PhaseTimeline},
        public::PublicClan,
        vote::VoteResultDto,
    },
    error::AppError,
    services::{king_decision_service, public_service},
    state::SharedState,
};

/// Read-only endpoints for the projector and the room.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/public/phase", get(get_phase))
        .route("/public/phases", get(get_phases))
        .route("/public/clans", get(get_clans))
        .route("/public/votes/{id}/result", get(get_vote_result))
        .route("/public/king-decision", get(get_king_decision))
}

#[utoipa::path(
    get,
    path = "/public/phase",
    tag = "public",
    responses((status = 200, description = "Current phase with its clock", body = PhaseSnapshot))
)]
/// Return the run phase, the live clock and the degraded flag.
pub async fn get_phase(State(state): State<SharedState>) -> Json<PhaseSnapshot> {
    Json(public_service::get_phase(&state).await)
}

#[utoipa::path(
    get,
    path = "/public/phases",
    tag = "public",
    responses(
        (status = 200, description = "Phase timeline", body = PhaseTimeline),
        (status = 409, description = "No simulation is running")
    )
)]
/// Return every phase of the loaded run in play order.
pub async fn get_phases(State(state): State<SharedState>) -> Result<Json<PhaseTimeline>, AppError> {
    Ok(Json(public_service::get_phases(&state).await?))
}

#[utoipa::path(
    get,
    path = "/public/clans",
    tag = "public",
    responses((status = 200, description = "Clans with their roles", body = [PublicClan]))
)]
pub async fn get_clans(State(state): State<SharedState>) -> Result<Json<Vec<PublicClan>>, AppError> {
    Ok(Json(public_service::get_clans(&state).await?))
}

#[utoipa::path(
    get,
    path = "/public/votes/{id}/result",
    tag = "public",
    params(("id" = String, Path, description = "Vote session")),
    responses(
        (status = 200, description = "Announced result", body = VoteResultDto),
        (status = 409, description = "Result not announced yet")
    )
)]
pub async fn get_vote_result(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(public_service::get_vote_result(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/public/king-decision",
    tag = "public",
    responses(
        (status = 200, description = "Revealed decisions of the King", body = KingDecisionDto),
        (status = 409, description = "Decisions not revealed yet")
    )
)]
pub async fn get_king_decision(
    State(state): State<SharedState>,
) -> Result<Json<KingDecisionDto>, AppError> {
    Ok(Json(king_decision_service::revealed(&state).await?))
}
