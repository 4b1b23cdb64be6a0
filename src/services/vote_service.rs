//! Vote sessions: opening from templates, ballots, tally, announcement and
//! facilitator corrections. Every mutation runs under the transition gate so
//! a session is tallied once even when two closes race.

use std::time::SystemTime;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{
        RevealTiming, RoleStatus, TransparencyLevel, VoteChoice, VoteFormat, VoteResultEntity,
        VoteScope, VoteSessionEntity, VoteStatus, VoteType,
    },
    dto::{
        sse::VoteProgressEvent,
        vote::{
            BallotReceipt, ConfirmRunoffRequest, CreateVoteRequest, OverrideWinnerRequest,
            VoteOnBehalfRequest, VoteResultDto, VoteSessionSummary, VoteTemplateDto,
        },
    },
    error::ServiceError,
    services::{
        event_log::{self, EventKind},
        sse_events,
        vote_templates::{
            self, FIELD_ANIMATION, FIELD_CANDIDATES, FIELD_DESCRIPTION, FIELD_REVEAL, FIELD_SCOPE,
            FIELD_SCOPE_CLAN, FIELD_TITLE, FIELD_TRANSPARENCY, VoteTemplate,
        },
    },
    state::{
        SharedState,
        clock::planned_minutes,
        simulation::{SimulationError, SimulationSession},
        tally::tally,
    },
};

/// Presets available when opening a vote.
pub fn list_templates() -> Vec<VoteTemplateDto> {
    vote_templates::all().iter().map(VoteTemplateDto::from).collect()
}

/// Every session of the loaded run, facilitator view.
pub async fn list_votes(state: &SharedState) -> Result<Vec<VoteSessionSummary>, ServiceError> {
    state
        .with_simulation(|sim| {
            Ok(sim
                .vote_sessions
                .values()
                .map(|session| VoteSessionSummary::build(sim, session))
                .collect())
        })
        .await
}

/// Open a vote session from a template and the facilitator's overrides.
pub async fn create_vote(
    state: &SharedState,
    request: CreateVoteRequest,
) -> Result<VoteSessionSummary, ServiceError> {
    let template = vote_templates::find(&request.template_id).ok_or_else(|| {
        ServiceError::InvalidInput(format!("unknown vote template `{}`", request.template_id))
    })?;
    ensure_customizable(template, &request)?;

    let (summary, run_id) = state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    let session = build_session(state, sim, template, request)?;
                    let session_id = sim.open_vote(session)?.id;
                    let summary = VoteSessionSummary::build(sim, sim.vote_session(session_id)?);
                    Ok((summary, sim.id))
                })
                .await
        })
        .await?;

    info!(
        session_id = %summary.id,
        template = %summary.template_id,
        eligible_voters = summary.eligible_voters,
        "vote opened"
    );
    event_log::record(
        state,
        run_id,
        EventKind::VoteOpened,
        json!({
            "session_id": summary.id,
            "template_id": summary.template_id,
            "scope_clan_id": summary.scope_clan_id,
            "threshold": summary.threshold,
        }),
    )
    .await;
    sse_events::broadcast_vote_opened(state, summary.clone());
    Ok(summary)
}

/// Ballot cast by the participant holding `voter_role_id`.
pub async fn cast_ballot(
    state: &SharedState,
    session_id: Uuid,
    voter_role_id: Uuid,
    choice: VoteChoice,
) -> Result<BallotReceipt, ServiceError> {
    let outcome = record_ballot(state, session_id, voter_role_id, choice, None).await?;
    Ok(outcome.receipt)
}

/// Ballot cast by the facilitator for a participant who cannot vote themselves.
pub async fn cast_on_behalf(
    state: &SharedState,
    session_id: Uuid,
    request: VoteOnBehalfRequest,
) -> Result<BallotReceipt, ServiceError> {
    let reason = request.reason.trim().to_string();
    let outcome = record_ballot(
        state,
        session_id,
        request.voter_role_id,
        request.choice,
        Some(reason.clone()),
    )
    .await?;

    event_log::record(
        state,
        outcome.run_id,
        EventKind::VoteCastOnBehalf,
        json!({
            "session_id": session_id,
            "voter_role_id": request.voter_role_id,
            "reason": reason,
        }),
    )
    .await;
    Ok(outcome.receipt)
}

/// Stop accepting ballots and compute the tally.
pub async fn close_vote(state: &SharedState, session_id: Uuid) -> Result<VoteResultDto, ServiceError> {
    let (result, run_id) = result_mutation(state, session_id, move |sim, now| {
        sim.close_vote(session_id, now)?;
        Ok(())
    })
    .await?;

    info!(%session_id, "vote closed");
    event_log::record(state, run_id, EventKind::VoteClosed, result_payload(&result)).await;
    sse_events::broadcast_vote_closed(state, result.clone());
    Ok(result)
}

/// Tally a closed session again.
pub async fn recalculate_vote(
    state: &SharedState,
    session_id: Uuid,
) -> Result<VoteResultDto, ServiceError> {
    let (result, run_id) = result_mutation(state, session_id, move |sim, now| {
        sim.recalculate_vote(session_id, now)?;
        Ok(())
    })
    .await?;

    info!(%session_id, "vote recalculated");
    event_log::record(state, run_id, EventKind::VoteRecalculated, result_payload(&result)).await;
    Ok(result)
}

/// Reveal a closed session's result to the room.
pub async fn announce_vote(
    state: &SharedState,
    session_id: Uuid,
) -> Result<VoteResultDto, ServiceError> {
    let (result, run_id) = result_mutation(state, session_id, move |sim, now| {
        sim.announce_vote(session_id, now)?;
        Ok(())
    })
    .await?;

    info!(%session_id, "vote announced");
    event_log::record(state, run_id, EventKind::VoteAnnounced, result_payload(&result)).await;
    sse_events::broadcast_vote_announced(state, result.clone());
    Ok(result)
}

/// Replace the computed winner, for instance to settle a tie.
pub async fn override_winner(
    state: &SharedState,
    session_id: Uuid,
    request: OverrideWinnerRequest,
) -> Result<VoteResultDto, ServiceError> {
    let reason = request.reason.trim().to_string();
    let winner_role_id = request.winner_role_id;
    let logged_reason = reason.clone();
    let (result, run_id) = result_mutation(state, session_id, move |sim, now| {
        sim.override_winner(session_id, winner_role_id, reason, now)?;
        Ok(())
    })
    .await?;

    info!(%session_id, winner = ?winner_role_id, "vote winner overridden");
    event_log::record(
        state,
        run_id,
        EventKind::WinnerOverridden,
        json!({
            "session_id": session_id,
            "winner_role_id": winner_role_id,
            "reason": logged_reason,
        }),
    )
    .await;
    sse_events::broadcast_vote_overridden(
        state,
        session_id,
        result.status,
        result.effective_winner.clone(),
        logged_reason,
    );
    Ok(result)
}

/// Fix who moves on to the final election round.
pub async fn confirm_runoff(
    state: &SharedState,
    session_id: Uuid,
    request: ConfirmRunoffRequest,
) -> Result<VoteResultDto, ServiceError> {
    let candidates = request.candidates;
    let (result, run_id) = result_mutation(state, session_id, move |sim, now| {
        sim.confirm_runoff(session_id, candidates, now)?;
        Ok(())
    })
    .await?;

    info!(
        %session_id,
        candidates = result.confirmed_runoff_candidates.len(),
        "runoff candidates confirmed"
    );
    event_log::record(
        state,
        run_id,
        EventKind::RunoffConfirmed,
        json!({
            "session_id": session_id,
            "candidates": result.confirmed_runoff_candidates,
        }),
    )
    .await;
    Ok(result)
}

/// Result of an announced session; earlier stages stay hidden from the room.
pub async fn announced_result(
    state: &SharedState,
    session_id: Uuid,
) -> Result<VoteResultDto, ServiceError> {
    state
        .with_simulation(|sim| {
            let session = sim.vote_session(session_id)?;
            if session.status != VoteStatus::Announced {
                return Err(ServiceError::InvalidState(format!(
                    "result of vote session {session_id} has not been announced"
                )));
            }
            let result = sim
                .results
                .get(&session_id)
                .ok_or(SimulationError::NoResult(session_id))?;
            Ok(VoteResultDto::build(session, result))
        })
        .await
}

struct BallotOutcome {
    run_id: Uuid,
    receipt: BallotReceipt,
    transparency: TransparencyLevel,
    reveal_timing: RevealTiming,
    progress: VoteProgressEvent,
    live_tally: Option<VoteResultDto>,
}

async fn record_ballot(
    state: &SharedState,
    session_id: Uuid,
    voter_role_id: Uuid,
    choice: VoteChoice,
    on_behalf: Option<String>,
) -> Result<BallotOutcome, ServiceError> {
    let outcome = state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    let now = SystemTime::now();
                    let receipt =
                        BallotReceipt::from(sim.cast_vote(session_id, voter_role_id, choice, on_behalf, now)?);
                    let session = sim.vote_session(session_id)?;
                    let ballots = sim.ballots(session_id);
                    let progress = VoteProgressEvent {
                        session_id,
                        votes_cast: ballots.len() as u32,
                        eligible_voters: sim.eligible_voters(session).count() as u32,
                    };
                    let live_tally = (session.reveal_timing == RevealTiming::Immediate).then(|| {
                        let interim = VoteResultEntity {
                            session_id,
                            results: tally(session, &ballots, &sim.roles),
                            calculated_at: now,
                            announced_at: None,
                            winner_override: None,
                            confirmed_runoff_candidates: Vec::new(),
                        };
                        VoteResultDto::build(session, &interim)
                    });
                    Ok(BallotOutcome {
                        run_id: sim.id,
                        receipt,
                        transparency: session.transparency_level,
                        reveal_timing: session.reveal_timing,
                        progress,
                        live_tally,
                    })
                })
                .await
        })
        .await?;

    debug!(
        %session_id,
        votes_cast = outcome.progress.votes_cast,
        eligible = outcome.progress.eligible_voters,
        on_behalf = outcome.receipt.on_behalf,
        "ballot recorded"
    );
    sse_events::broadcast_vote_progress(state, outcome.transparency, &outcome.progress);
    if let Some(result) = outcome.live_tally.clone() {
        sse_events::broadcast_vote_tally(state, outcome.transparency, result);
    }
    if outcome.reveal_timing == RevealTiming::AfterAllVotes
        && outcome.progress.votes_cast >= outcome.progress.eligible_voters
    {
        info!(%session_id, "every eligible voter has voted");
        sse_events::broadcast_vote_all_cast(state, session_id, outcome.progress.votes_cast);
    }
    Ok(outcome)
}

async fn result_mutation<F>(
    state: &SharedState,
    session_id: Uuid,
    apply: F,
) -> Result<(VoteResultDto, Uuid), ServiceError>
where
    F: FnOnce(&mut SimulationSession, SystemTime) -> Result<(), ServiceError>,
{
    state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    apply(sim, SystemTime::now())?;
                    let session = sim.vote_session(session_id)?;
                    let result = sim
                        .results
                        .get(&session_id)
                        .ok_or(SimulationError::NoResult(session_id))?;
                    Ok((VoteResultDto::build(session, result), sim.id))
                })
                .await
        })
        .await
}

fn result_payload(result: &VoteResultDto) -> serde_json::Value {
    json!({
        "session_id": result.session_id,
        "status": result.status,
        "winner_role_id": result.effective_winner.as_ref().map(|w| w.role_id),
    })
}

fn ensure_customizable(
    template: &VoteTemplate,
    request: &CreateVoteRequest,
) -> Result<(), ServiceError> {
    let provided = [
        (FIELD_SCOPE, request.scope.is_some()),
        (FIELD_SCOPE_CLAN, request.scope_clan_id.is_some()),
        (FIELD_CANDIDATES, request.eligible_candidates.is_some()),
        (FIELD_TITLE, request.proposal_title.is_some()),
        (FIELD_DESCRIPTION, request.proposal_description.is_some()),
        (FIELD_TRANSPARENCY, request.transparency_level.is_some()),
        (FIELD_REVEAL, request.reveal_timing.is_some()),
        (FIELD_ANIMATION, request.animation_speed.is_some()),
    ];
    let locked: Vec<&str> = provided
        .iter()
        .filter(|(field, given)| *given && !template.allows(field))
        .map(|(field, _)| *field)
        .collect();
    if locked.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::InvalidInput(format!(
            "template `{}` does not allow overriding {}",
            template.id,
            locked.join(", ")
        )))
    }
}

fn build_session(
    state: &SharedState,
    sim: &SimulationSession,
    template: &VoteTemplate,
    request: CreateVoteRequest,
) -> Result<VoteSessionEntity, ServiceError> {
    if sim.is_finished() {
        return Err(SimulationError::RunFinished.into());
    }

    let phase_id = request
        .phase_id
        .or_else(|| sim.running_phase().map(|phase| phase.id));
    let phase_minutes = match phase_id {
        Some(id) => Some(planned_minutes(sim.phase(id)?)),
        None => None,
    };

    let scope = request.scope.unwrap_or(template.scope);
    let scope_clan_id = match scope {
        VoteScope::All => None,
        VoteScope::ClanOnly => request.scope_clan_id,
    };

    let eligible_candidates = match template.vote_format {
        VoteFormat::YesNo => Vec::new(),
        VoteFormat::ChoosePerson => match (request.eligible_candidates, template.vote_type, scope_clan_id) {
            (Some(candidates), _, _) => candidates,
            (None, VoteType::ClanNomination, Some(clan_id)) => sim
                .roles
                .values()
                .filter(|role| role.clan_id == clan_id && role.status == RoleStatus::Active)
                .map(|role| role.id)
                .collect(),
            (None, VoteType::ElectionRound, _) if template.election_round == Some(2) => sim
                .last_confirmed_runoff()
                .map(<[Uuid]>::to_vec)
                .unwrap_or_default(),
            (None, _, _) => Vec::new(),
        },
    };

    let mut session = VoteSessionEntity {
        id: Uuid::new_v4(),
        phase_id,
        template_id: template.id.to_string(),
        vote_type: template.vote_type,
        vote_format: template.vote_format,
        scope,
        scope_clan_id,
        eligible_candidates,
        proposal_title: request
            .proposal_title
            .or_else(|| template.proposal_title.map(str::to_string)),
        proposal_description: request
            .proposal_description
            .or_else(|| template.proposal_description.map(str::to_string)),
        transparency_level: request.transparency_level.unwrap_or(template.transparency_level),
        reveal_timing: request.reveal_timing.unwrap_or(template.reveal_timing),
        animation_speed: request.animation_speed.unwrap_or(template.animation_speed),
        allow_skip_animation: request
            .allow_skip_animation
            .unwrap_or(template.allow_skip_animation),
        threshold: request.threshold,
        time_limit_minutes: request
            .time_limit_minutes
            .unwrap_or_else(|| state.config().vote_time_limit().limit_for(phase_minutes)),
        status: VoteStatus::Open,
        created_at: SystemTime::now(),
        closed_at: None,
        announced_at: None,
    };

    if session.threshold.is_none() {
        if let Some(round) = template.election_round {
            let configured = match round {
                1 => sim.vote_1_threshold,
                _ => sim.vote_2_threshold,
            };
            session.threshold = configured.or_else(|| {
                let voters = sim.eligible_voters(&session).count() as u32;
                Some(state.config().election().threshold_for(voters))
            });
        }
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::{ResultsData, YesNoChoice}, sim_store::memory::MemorySimStore},
        state::{
            AppState, simulation::tests::sample_simulation, state_machine::RunEvent,
        },
    };

    async fn loaded_state() -> (SharedState, Vec<Uuid>, Vec<Uuid>) {
        let state = AppState::new(AppConfig::default());
        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        let sim = sample_simulation();
        let roles = sim.roles.keys().copied().collect();
        let clans = sim.clans.keys().copied().collect();
        state
            .run_transition(RunEvent::Load(sim.run_phase()), || async { Ok(()) })
            .await
            .unwrap();
        state.replace_simulation(Some(sim)).await;
        (state, roles, clans)
    }

    fn request(template_id: &str) -> CreateVoteRequest {
        CreateVoteRequest {
            template_id: template_id.into(),
            phase_id: None,
            scope: None,
            scope_clan_id: None,
            eligible_candidates: None,
            proposal_title: None,
            proposal_description: None,
            transparency_level: None,
            reveal_timing: None,
            animation_speed: None,
            allow_skip_animation: None,
            threshold: None,
            time_limit_minutes: None,
        }
    }

    #[tokio::test]
    async fn election_round_defaults_to_two_thirds() {
        let (state, roles, _) = loaded_state().await;
        let mut req = request("election_round_1");
        req.eligible_candidates = Some(roles[..2].to_vec());

        let summary = create_vote(&state, req).await.unwrap();
        // 4 eligible voters, ceil(4 * 2 / 3) = 3
        assert_eq!(summary.threshold, Some(3));
        assert_eq!(summary.time_limit_minutes, 10);
        assert_eq!(summary.proposal_title.as_deref(), Some("Vote for King - Round 1"));
    }

    #[tokio::test]
    async fn clan_nomination_defaults_candidates_to_clan_members() {
        let (state, _, clans) = loaded_state().await;
        let mut req = request("clan_nomination");
        req.scope_clan_id = Some(clans[0]);

        let summary = create_vote(&state, req).await.unwrap();
        assert_eq!(summary.eligible_candidates.len(), 2);
        assert!(
            summary
                .eligible_candidates
                .iter()
                .all(|c| c.clan_id == Some(clans[0]))
        );
        assert_eq!(summary.eligible_voters, 2);
    }

    #[tokio::test]
    async fn locked_template_fields_cannot_be_overridden() {
        let (state, _, _) = loaded_state().await;
        let mut req = request("election_round_1");
        req.scope = Some(VoteScope::ClanOnly);
        assert!(matches!(
            create_vote(&state, req).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            create_vote(&state, request("no_such_template")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn yes_no_lifecycle_until_announcement() {
        let (state, roles, _) = loaded_state().await;
        let summary = create_vote(&state, request("custom_proposal")).await.unwrap();
        let yes = VoteChoice::YesNo { choice: YesNoChoice::Yes };
        let no = VoteChoice::YesNo { choice: YesNoChoice::No };

        cast_ballot(&state, summary.id, roles[0], yes).await.unwrap();
        cast_ballot(&state, summary.id, roles[1], yes).await.unwrap();
        cast_ballot(&state, summary.id, roles[2], no).await.unwrap();
        assert!(matches!(
            cast_ballot(&state, summary.id, roles[2], yes).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            announced_result(&state, summary.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        let closed = close_vote(&state, summary.id).await.unwrap();
        let ResultsData::YesNo(counts) = &closed.results else {
            panic!("expected yes/no results");
        };
        assert_eq!((counts.yes, counts.no), (2, 1));
        assert!(counts.passed);
        assert!(matches!(
            close_vote(&state, summary.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        announce_vote(&state, summary.id).await.unwrap();
        let public = announced_result(&state, summary.id).await.unwrap();
        assert_eq!(public.status, VoteStatus::Announced);
    }

    #[tokio::test]
    async fn on_behalf_and_override_are_audited() {
        let (state, roles, _) = loaded_state().await;
        let mut req = request("custom_election");
        req.eligible_candidates = Some(roles[..2].to_vec());
        let summary = create_vote(&state, req).await.unwrap();

        cast_on_behalf(
            &state,
            summary.id,
            VoteOnBehalfRequest {
                voter_role_id: roles[3],
                choice: VoteChoice::Person { role_id: roles[0] },
                reason: "phone battery died".into(),
            },
        )
        .await
        .unwrap();
        cast_ballot(&state, summary.id, roles[2], VoteChoice::Person { role_id: roles[1] })
            .await
            .unwrap();

        let closed = close_vote(&state, summary.id).await.unwrap();
        assert!(closed.effective_winner.is_none());

        let overridden = override_winner(
            &state,
            summary.id,
            OverrideWinnerRequest {
                winner_role_id: Some(roles[1]),
                reason: "coin toss".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            overridden.effective_winner.map(|w| w.role_id),
            Some(roles[1])
        );

        let events = event_log::list_events(&state, None).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(kinds.contains(&"vote_cast_on_behalf"));
        assert!(kinds.contains(&"winner_overridden"));
    }

    #[tokio::test]
    async fn confirmed_runoff_seeds_the_final_round() {
        let (state, roles, _) = loaded_state().await;
        let mut req = request("election_round_1");
        req.eligible_candidates = Some(roles[..3].to_vec());
        let first = create_vote(&state, req).await.unwrap();
        for (voter, candidate) in [(0, 1), (1, 0), (2, 0), (3, 1)] {
            cast_ballot(
                &state,
                first.id,
                roles[voter],
                VoteChoice::Person { role_id: roles[candidate] },
            )
            .await
            .unwrap();
        }
        close_vote(&state, first.id).await.unwrap();

        let rejected = confirm_runoff(
            &state,
            first.id,
            ConfirmRunoffRequest { candidates: vec![roles[0], roles[2]] },
        )
        .await;
        assert!(matches!(rejected, Err(ServiceError::InvalidInput(_))));

        let confirmed = confirm_runoff(
            &state,
            first.id,
            ConfirmRunoffRequest { candidates: vec![roles[1], roles[0]] },
        )
        .await
        .unwrap();
        assert_eq!(confirmed.confirmed_runoff_candidates, vec![roles[1], roles[0]]);

        let second = create_vote(&state, request("election_round_2")).await.unwrap();
        let candidates: Vec<_> = second.eligible_candidates.iter().map(|c| c.role_id).collect();
        assert_eq!(candidates, vec![roles[1], roles[0]]);

        let events = event_log::list_events(&state, None).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "runoff_confirmed"));
    }
}
