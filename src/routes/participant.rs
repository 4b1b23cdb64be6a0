use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        king::{KingDecisionDto, KingDecisionStatus, SubmitKingDecisionRequest},
        participant::ParticipantBriefing,
        vote::{BallotReceipt, CastBallotRequest, ParticipantVote, VoteResultDto},
    },
    error::AppError,
    services::{king_decision_service, participant_service},
    state::SharedState,
};

const ACCESS_CODE_HEADER: &str = "x-access-code";

/// Role resolved from the request's access code.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantRole(pub Uuid);

/// Endpoints reached by participants with their role's access code.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/participant/me", get(me))
        .route("/participant/votes", get(list_votes))
        .route("/participant/votes/{id}", post(cast_ballot))
        .route("/participant/votes/{id}/result", get(vote_result))
        .route(
            "/participant/king-decision",
            get(king_decision).post(submit_king_decision),
        )
        .route_layer(middleware::from_fn_with_state(state, require_access_code))
}

/// Role briefing, clan, run status and the phase clock.
#[utoipa::path(
    get,
    path = "/participant/me",
    tag = "participant",
    params(("X-Access-Code" = String, Header, description = "Access code of the participant's role")),
    responses(
        (status = 200, description = "Briefing", body = ParticipantBriefing),
        (status = 401, description = "Unknown access code")
    )
)]
pub async fn me(
    State(state): State<SharedState>,
    Extension(ParticipantRole(role_id)): Extension<ParticipantRole>,
) -> Result<Json<ParticipantBriefing>, AppError> {
    Ok(Json(participant_service::briefing(&state, role_id).await?))
}

/// Open votes the participant is eligible for.
#[utoipa::path(
    get,
    path = "/participant/votes",
    tag = "participant",
    params(("X-Access-Code" = String, Header, description = "Access code of the participant's role")),
    responses((status = 200, description = "Open votes", body = [ParticipantVote]))
)]
pub async fn list_votes(
    State(state): State<SharedState>,
    Extension(ParticipantRole(role_id)): Extension<ParticipantRole>,
) -> Result<Json<Vec<ParticipantVote>>, AppError> {
    Ok(Json(participant_service::open_votes(&state, role_id).await?))
}

#[utoipa::path(
    post,
    path = "/participant/votes/{id}",
    tag = "participant",
    params(("X-Access-Code" = String, Header, description = "Access code of the participant's role"),
    ("id" = String, Path, description = "Vote session")),
    request_body = CastBallotRequest,
    responses(
        (status = 200, description = "Ballot recorded", body = BallotReceipt),
        (status = 400, description = "Ballot does not fit the session"),
        (status = 409, description = "Already voted or vote closed")
    )
)]
pub async fn cast_ballot(
    State(state): State<SharedState>,
    Extension(ParticipantRole(role_id)): Extension<ParticipantRole>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CastBallotRequest>,
) -> Result<Json<BallotReceipt>, AppError> {
    Ok(Json(
        participant_service::cast(&state, role_id, id, payload.choice).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/participant/votes/{id}/result",
    tag = "participant",
    params(("X-Access-Code" = String, Header, description = "Access code of the participant's role"),
    ("id" = String, Path, description = "Vote session")),
    responses(
        (status = 200, description = "Announced result", body = VoteResultDto),
        (status = 409, description = "Result not announced yet")
    )
)]
pub async fn vote_result(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(participant_service::result(&state, id).await?))
}

/// The King, and their decisions when the caller is the King or they are revealed.
#[utoipa::path(
    get,
    path = "/participant/king-decision",
    tag = "participant",
    params(("X-Access-Code" = String, Header, description = "Access code of the participant's role")),
    responses((status = 200, description = "King and visible decisions", body = KingDecisionStatus))
)]
pub async fn king_decision(
    State(state): State<SharedState>,
    Extension(ParticipantRole(role_id)): Extension<ParticipantRole>,
) -> Result<Json<KingDecisionStatus>, AppError> {
    Ok(Json(king_decision_service::for_participant(&state, role_id).await?))
}

#[utoipa::path(
    post,
    path = "/participant/king-decision",
    tag = "participant",
    params(("X-Access-Code" = String, Header, description = "Access code of the participant's role")),
    request_body = SubmitKingDecisionRequest,
    responses(
        (status = 200, description = "Decisions stored", body = KingDecisionDto),
        (status = 400, description = "Inconsistent decisions"),
        (status = 401, description = "Caller is not the King"),
        (status = 409, description = "No King yet or decisions already revealed")
    )
)]
pub async fn submit_king_decision(
    State(state): State<SharedState>,
    Extension(ParticipantRole(role_id)): Extension<ParticipantRole>,
    Valid(Json(payload)): Valid<Json<SubmitKingDecisionRequest>>,
) -> Result<Json<KingDecisionDto>, AppError> {
    Ok(Json(king_decision_service::submit(&state, role_id, payload).await?))
}

async fn require_access_code(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let code = req
        .headers()
        .get(ACCESS_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| AppError::Unauthorized("missing access code header `X-Access-Code`".into()))?;

    let role_id = participant_service::authenticate(&state, &code).await?;
    req.extensions_mut().insert(ParticipantRole(role_id));
    Ok(next.run(req).await)
}
