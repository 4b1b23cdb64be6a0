use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the King SIM backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::facilitator_stream,
        crate::routes::public::get_phase,
        crate::routes::public::get_phases,
        crate::routes::public::get_clans,
        crate::routes::public::get_vote_result,
        crate::routes::public::get_king_decision,
        crate::routes::facilitator::list_simulations,
        crate::routes::facilitator::create_simulation,
        crate::routes::facilitator::get_simulation,
        crate::routes::facilitator::delete_simulation,
        crate::routes::facilitator::load_simulation,
        crate::routes::facilitator::close_simulation,
        crate::routes::facilitator::complete_simulation,
        crate::routes::facilitator::start_phase,
        crate::routes::facilitator::skip_phase,
        crate::routes::facilitator::pause_phase,
        crate::routes::facilitator::resume_phase,
        crate::routes::facilitator::end_phase,
        crate::routes::facilitator::extend_phase,
        crate::routes::facilitator::phase_clock,
        crate::routes::facilitator::list_vote_templates,
        crate::routes::facilitator::list_votes,
        crate::routes::facilitator::create_vote,
        crate::routes::facilitator::close_vote,
        crate::routes::facilitator::recalculate_vote,
        crate::routes::facilitator::announce_vote,
        crate::routes::facilitator::vote_on_behalf,
        crate::routes::facilitator::override_winner,
        crate::routes::facilitator::confirm_runoff,
        crate::routes::facilitator::review_king_decision,
        crate::routes::facilitator::reveal_king_decision,
        crate::routes::facilitator::assign_role,
        crate::routes::facilitator::list_events,
        crate::routes::facilitator::run_diagnostics,
        crate::routes::participant::me,
        crate::routes::participant::list_votes,
        crate::routes::participant::cast_ballot,
        crate::routes::participant::vote_result,
        crate::routes::participant::king_decision,
        crate::routes::participant::submit_king_decision,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::FacilitatorHandshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::PhaseTimerEvent,
            crate::dto::sse::PhaseOvertimeEvent,
            crate::dto::sse::VoteOpenedEvent,
            crate::dto::sse::VoteProgressEvent,
            crate::dto::sse::VoteTallyEvent,
            crate::dto::sse::VoteAllCastEvent,
            crate::dto::sse::VoteClosedEvent,
            crate::dto::sse::VoteAnnouncedEvent,
            crate::dto::sse::VoteOverriddenEvent,
            crate::dto::sse::RoleAssignedEvent,
            crate::dto::sse::RunLifecycleEvent,
            crate::dto::sse::KingDecisionSubmittedEvent,
            crate::dto::sse::KingDecisionRevealedEvent,
            crate::dao::models::VoteChoice,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "public", description = "Read-only views for the room"),
        (name = "facilitator", description = "Run control; requires the facilitator token"),
        (name = "participant", description = "Participant views; requires an access code"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_family() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/healthcheck",
            "/sse/facilitator",
            "/public/phase",
            "/facilitator/votes/{id}/override",
            "/facilitator/votes/{id}/runoff",
            "/participant/me",
            "/participant/king-decision",
            "/public/king-decision",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
