use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        diagnostics::DiagnosticsReport,
        events::{EventLogDto, EventsQuery},
        phase::{ExtendPhaseRequest, PhaseClockDto, PhaseSnapshot, PhaseSummary},
        simulation::{
            AssignRoleRequest, CreateSimulationRequest, RoleDetail, SimulationDetail,
            SimulationListItem,
        },
        king::{KingDecisionDto, KingDecisionStatus},
        vote::{
            BallotReceipt, ConfirmRunoffRequest, CreateVoteRequest, OverrideWinnerRequest,
            VoteOnBehalfRequest, VoteResultDto, VoteSessionSummary, VoteTemplateDto,
        },
    },
    error::AppError,
    services::{
        diagnostics, event_log, king_decision_service, phase_service, simulation_service,
        sse_service, vote_service,
    },
    state::SharedState,
};

const FACILITATOR_TOKEN_HEADER: &str = "x-facilitator-token";

/// Facilitator endpoints driving the run; all require the console token.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/facilitator/simulations",
            get(list_simulations).post(create_simulation),
        )
        .route(
            "/facilitator/simulations/{id}",
            get(get_simulation).delete(delete_simulation),
        )
        .route("/facilitator/simulations/{id}/load", post(load_simulation))
        .route("/facilitator/simulation/close", post(close_simulation))
        .route("/facilitator/simulation/complete", post(complete_simulation))
        .route("/facilitator/phases/{id}/start", post(start_phase))
        .route("/facilitator/phases/{id}/skip", post(skip_phase))
        .route("/facilitator/phase/pause", post(pause_phase))
        .route("/facilitator/phase/resume", post(resume_phase))
        .route("/facilitator/phase/end", post(end_phase))
        .route("/facilitator/phase/extend", post(extend_phase))
        .route("/facilitator/phase/clock", get(phase_clock))
        .route("/facilitator/vote-templates", get(list_vote_templates))
        .route("/facilitator/votes", get(list_votes).post(create_vote))
        .route("/facilitator/votes/{id}/close", post(close_vote))
        .route("/facilitator/votes/{id}/recalculate", post(recalculate_vote))
        .route("/facilitator/votes/{id}/announce", post(announce_vote))
        .route("/facilitator/votes/{id}/ballots", post(vote_on_behalf))
        .route("/facilitator/votes/{id}/override", post(override_winner))
        .route("/facilitator/votes/{id}/runoff", post(confirm_runoff))
        .route("/facilitator/king-decision", get(review_king_decision))
        .route("/facilitator/king-decision/reveal", post(reveal_king_decision))
        .route("/facilitator/roles/{id}/assign", post(assign_role))
        .route("/facilitator/events", get(list_events))
        .route("/facilitator/diagnostics", get(run_diagnostics))
        .route_layer(middleware::from_fn_with_state(state, require_facilitator_token))
}

/// List stored simulation runs.
#[utoipa::path(
    get,
    path = "/facilitator/simulations",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Stored runs", body = [SimulationListItem]))
)]
pub async fn list_simulations(
    State(state): State<SharedState>,
) -> Result<Json<Vec<SimulationListItem>>, AppError> {
    Ok(Json(simulation_service::list_simulations(&state).await?))
}

/// Create a run from clans, roles and an optional phase list.
#[utoipa::path(
    post,
    path = "/facilitator/simulations",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    request_body = CreateSimulationRequest,
    responses(
        (status = 200, description = "Run created", body = SimulationDetail),
        (status = 400, description = "Invalid setup")
    )
)]
pub async fn create_simulation(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSimulationRequest>>,
) -> Result<Json<SimulationDetail>, AppError> {
    Ok(Json(
        simulation_service::create_simulation(&state, payload).await?,
    ))
}

/// Fetch a run by its identifier.
#[utoipa::path(
    get,
    path = "/facilitator/simulations/{id}",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Identifier of the run")),
    responses((status = 200, description = "Run", body = SimulationDetail))
)]
pub async fn get_simulation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SimulationDetail>, AppError> {
    Ok(Json(simulation_service::get_simulation(&state, id).await?))
}

/// Delete a stored run and its audit trail.
#[utoipa::path(
    delete,
    path = "/facilitator/simulations/{id}",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Identifier of the run")),
    responses(
        (status = 204, description = "Run deleted"),
        (status = 409, description = "Run is loaded")
    )
)]
pub async fn delete_simulation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    simulation_service::delete_simulation(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Make a stored run the live one.
#[utoipa::path(
    post,
    path = "/facilitator/simulations/{id}/load",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Identifier of the run")),
    responses((status = 200, description = "Run loaded", body = SimulationDetail))
)]
pub async fn load_simulation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SimulationDetail>, AppError> {
    Ok(Json(simulation_service::load_simulation(&state, id).await?))
}

/// Unload the live run.
#[utoipa::path(
    post,
    path = "/facilitator/simulation/close",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 204, description = "Run closed"))
)]
pub async fn close_simulation(State(state): State<SharedState>) -> Result<StatusCode, AppError> {
    simulation_service::close_simulation(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// End any running phase and mark the run completed.
#[utoipa::path(
    post,
    path = "/facilitator/simulation/complete",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Run completed", body = PhaseSnapshot))
)]
pub async fn complete_simulation(
    State(state): State<SharedState>,
) -> Result<Json<PhaseSnapshot>, AppError> {
    Ok(Json(simulation_service::complete_simulation(&state).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/phases/{id}/start",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Phase to start; must be the next pending one")),
    responses(
        (status = 200, description = "Phase started", body = PhaseSummary),
        (status = 409, description = "Phase is out of order or another phase is running")
    )
)]
pub async fn start_phase(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhaseSummary>, AppError> {
    Ok(Json(phase_service::start_phase(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/phases/{id}/skip",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Phase to skip")),
    responses((status = 200, description = "Phase skipped", body = PhaseSummary))
)]
pub async fn skip_phase(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhaseSummary>, AppError> {
    Ok(Json(phase_service::skip_phase(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/phase/pause",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Phase paused", body = PhaseSummary))
)]
pub async fn pause_phase(State(state): State<SharedState>) -> Result<Json<PhaseSummary>, AppError> {
    Ok(Json(phase_service::pause_phase(&state).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/phase/resume",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Phase resumed", body = PhaseSummary))
)]
pub async fn resume_phase(
    State(state): State<SharedState>,
) -> Result<Json<PhaseSummary>, AppError> {
    Ok(Json(phase_service::resume_phase(&state).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/phase/end",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Phase ended", body = PhaseSummary))
)]
pub async fn end_phase(State(state): State<SharedState>) -> Result<Json<PhaseSummary>, AppError> {
    Ok(Json(phase_service::end_phase(&state).await?))
}

/// Add minutes to the running phase.
#[utoipa::path(
    post,
    path = "/facilitator/phase/extend",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    request_body = ExtendPhaseRequest,
    responses((status = 200, description = "Phase extended", body = PhaseSummary))
)]
pub async fn extend_phase(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ExtendPhaseRequest>>,
) -> Result<Json<PhaseSummary>, AppError> {
    Ok(Json(
        phase_service::extend_phase(&state, payload.minutes).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/facilitator/phase/clock",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Clock of the current phase", body = PhaseClockDto))
)]
pub async fn phase_clock(State(state): State<SharedState>) -> Result<Json<PhaseClockDto>, AppError> {
    Ok(Json(phase_service::current_clock(&state).await?))
}

#[utoipa::path(
    get,
    path = "/facilitator/vote-templates",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Vote presets", body = [VoteTemplateDto]))
)]
pub async fn list_vote_templates() -> Json<Vec<VoteTemplateDto>> {
    Json(vote_service::list_templates())
}

#[utoipa::path(
    get,
    path = "/facilitator/votes",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Vote sessions of the loaded run", body = [VoteSessionSummary]))
)]
pub async fn list_votes(
    State(state): State<SharedState>,
) -> Result<Json<Vec<VoteSessionSummary>>, AppError> {
    Ok(Json(vote_service::list_votes(&state).await?))
}

/// Open a vote session from a template.
#[utoipa::path(
    post,
    path = "/facilitator/votes",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    request_body = CreateVoteRequest,
    responses(
        (status = 200, description = "Vote opened", body = VoteSessionSummary),
        (status = 400, description = "Unknown template or locked field")
    )
)]
pub async fn create_vote(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateVoteRequest>>,
) -> Result<Json<VoteSessionSummary>, AppError> {
    Ok(Json(vote_service::create_vote(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/votes/{id}/close",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Vote session")),
    responses(
        (status = 200, description = "Vote closed and tallied", body = VoteResultDto),
        (status = 409, description = "Vote is not open")
    )
)]
pub async fn close_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(vote_service::close_vote(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/votes/{id}/recalculate",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Vote session")),
    responses((status = 200, description = "Tally recomputed", body = VoteResultDto))
)]
pub async fn recalculate_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(vote_service::recalculate_vote(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/votes/{id}/announce",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Vote session")),
    responses((status = 200, description = "Result revealed", body = VoteResultDto))
)]
pub async fn announce_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(vote_service::announce_vote(&state, id).await?))
}

/// Cast a ballot for a participant who cannot vote themselves.
#[utoipa::path(
    post,
    path = "/facilitator/votes/{id}/ballots",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Vote session")),
    request_body = VoteOnBehalfRequest,
    responses(
        (status = 200, description = "Ballot recorded", body = BallotReceipt),
        (status = 409, description = "Role already voted")
    )
)]
pub async fn vote_on_behalf(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<VoteOnBehalfRequest>>,
) -> Result<Json<BallotReceipt>, AppError> {
    Ok(Json(vote_service::cast_on_behalf(&state, id, payload).await?))
}

/// Replace the computed winner of a closed or announced vote.
#[utoipa::path(
    post,
    path = "/facilitator/votes/{id}/override",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Vote session")),
    request_body = OverrideWinnerRequest,
    responses((status = 200, description = "Winner replaced", body = VoteResultDto))
)]
pub async fn override_winner(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<OverrideWinnerRequest>>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(vote_service::override_winner(&state, id, payload).await?))
}

/// Fix the candidates carried into the final election round.
#[utoipa::path(
    post,
    path = "/facilitator/votes/{id}/runoff",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Vote session")),
    request_body = ConfirmRunoffRequest,
    responses(
        (status = 200, description = "Runoff confirmed", body = VoteResultDto),
        (status = 400, description = "A candidate received no votes in this session"),
        (status = 409, description = "Vote not closed yet")
    )
)]
pub async fn confirm_runoff(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ConfirmRunoffRequest>>,
) -> Result<Json<VoteResultDto>, AppError> {
    Ok(Json(vote_service::confirm_runoff(&state, id, payload).await?))
}

/// The crowned King and their decisions, revealed or not.
#[utoipa::path(
    get,
    path = "/facilitator/king-decision",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "King and decisions", body = KingDecisionStatus))
)]
pub async fn review_king_decision(
    State(state): State<SharedState>,
) -> Result<Json<KingDecisionStatus>, AppError> {
    Ok(Json(king_decision_service::review(&state).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/king-decision/reveal",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses(
        (status = 200, description = "Decisions revealed", body = KingDecisionDto),
        (status = 409, description = "Nothing submitted or already revealed")
    )
)]
pub async fn reveal_king_decision(
    State(state): State<SharedState>,
) -> Result<Json<KingDecisionDto>, AppError> {
    Ok(Json(king_decision_service::reveal(&state).await?))
}

#[utoipa::path(
    post,
    path = "/facilitator/roles/{id}/assign",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    ("id" = String, Path, description = "Role to assign")),
    request_body = AssignRoleRequest,
    responses((status = 200, description = "Role assigned", body = RoleDetail))
)]
pub async fn assign_role(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AssignRoleRequest>>,
) -> Result<Json<RoleDetail>, AppError> {
    Ok(Json(
        simulation_service::assign_role(&state, id, payload.participant).await?,
    ))
}

/// Audit trail of a run, oldest first.
#[utoipa::path(
    get,
    path = "/facilitator/events",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream"),
    EventsQuery),
    responses((status = 200, description = "Audit entries", body = [EventLogDto]))
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventLogDto>>, AppError> {
    Ok(Json(event_log::list_events(&state, query.run_id).await?))
}

/// Integrity scan of every stored run.
#[utoipa::path(
    get,
    path = "/facilitator/diagnostics",
    tag = "facilitator",
    params(("X-Facilitator-Token" = String, Header, description = "Token issued by the /sse/facilitator stream")),
    responses((status = 200, description = "Diagnostics report", body = DiagnosticsReport))
)]
pub async fn run_diagnostics(
    State(state): State<SharedState>,
) -> Result<Json<DiagnosticsReport>, AppError> {
    Ok(Json(diagnostics::run(&state).await?))
}

async fn require_facilitator_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(FACILITATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing facilitator token header `X-Facilitator-Token`".into())
        })?;

    sse_service::check_facilitator_token(&state, &provided).await?;
    Ok(next.run(req).await)
}
