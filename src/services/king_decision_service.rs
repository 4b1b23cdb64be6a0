//! Decisions of the crowned King: drafted by the King, reviewed by the
//! facilitator, then revealed to the room.

use std::time::SystemTime;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::king::{KingDecisionDto, KingDecisionStatus, SubmitKingDecisionRequest},
    error::ServiceError,
    services::{
        event_log::{self, EventKind},
        sse_events,
    },
    state::{SharedState, king::KingDecisionDraft},
};

/// Store the King's decisions; only the winner of the announced final round may.
pub async fn submit(
    state: &SharedState,
    role_id: Uuid,
    request: SubmitKingDecisionRequest,
) -> Result<KingDecisionDto, ServiceError> {
    let draft = KingDecisionDraft::from(request);
    let (decision, run_id) = state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    let decision = sim
                        .submit_king_decision(role_id, draft, SystemTime::now())?
                        .clone();
                    Ok((KingDecisionDto::build(sim, &decision), sim.id))
                })
                .await
        })
        .await?;

    info!(king = %decision.king.name, "king decisions submitted");
    event_log::record(
        state,
        run_id,
        EventKind::KingDecisionSubmitted,
        json!({ "decision_id": decision.id, "king_role_id": decision.king.role_id }),
    )
    .await;
    sse_events::broadcast_king_decision_submitted(state, decision.clone());
    Ok(decision)
}

/// Facilitator review, including decisions the room has not seen yet.
pub async fn review(state: &SharedState) -> Result<KingDecisionStatus, ServiceError> {
    state
        .with_simulation(|sim| Ok(KingDecisionStatus::build(sim, true)))
        .await
}

/// What `role_id` may see: the King sees their own draft, others wait for the reveal.
pub async fn for_participant(
    state: &SharedState,
    role_id: Uuid,
) -> Result<KingDecisionStatus, ServiceError> {
    state
        .with_simulation(|sim| {
            let is_king = sim.current_king() == Some(role_id);
            Ok(KingDecisionStatus::build(sim, is_king))
        })
        .await
}

/// Show the decisions to everyone.
pub async fn reveal(state: &SharedState) -> Result<KingDecisionDto, ServiceError> {
    let (decision, run_id) = state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    let decision = sim.reveal_king_decision(SystemTime::now())?.clone();
                    Ok((KingDecisionDto::build(sim, &decision), sim.id))
                })
                .await
        })
        .await?;

    info!(king = %decision.king.name, "king decisions revealed");
    event_log::record(
        state,
        run_id,
        EventKind::KingDecisionRevealed,
        json!({ "decision_id": decision.id }),
    )
    .await;
    sse_events::broadcast_king_decision_revealed(state, decision.clone());
    Ok(decision)
}

/// Revealed decisions for the room.
pub async fn revealed(state: &SharedState) -> Result<KingDecisionDto, ServiceError> {
    state
        .with_simulation(|sim| {
            KingDecisionStatus::build(sim, false)
                .decision
                .ok_or_else(|| {
                    ServiceError::InvalidState("the King's decisions are not revealed yet".into())
                })
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{BudgetArea, BudgetPriorities, VoteChoice},
            sim_store::memory::MemorySimStore,
        },
        dto::vote::CreateVoteRequest,
        services::vote_service,
        state::{
            AppState, king::FINAL_ROUND_TEMPLATE, simulation::tests::sample_simulation,
            state_machine::RunEvent,
        },
    };

    async fn crowned_state() -> (SharedState, Vec<Uuid>) {
        let state = AppState::new(AppConfig::default());
        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        let sim = sample_simulation();
        let roles: Vec<Uuid> = sim.roles.keys().copied().collect();
        state
            .run_transition(RunEvent::Load(sim.run_phase()), || async { Ok(()) })
            .await
            .unwrap();
        state.replace_simulation(Some(sim)).await;

        let vote = vote_service::create_vote(
            &state,
            CreateVoteRequest {
                template_id: FINAL_ROUND_TEMPLATE.into(),
                phase_id: None,
                scope: None,
                scope_clan_id: None,
                eligible_candidates: Some(roles[..2].to_vec()),
                proposal_title: None,
                proposal_description: None,
                transparency_level: None,
                reveal_timing: None,
                animation_speed: None,
                allow_skip_animation: None,
                threshold: None,
                time_limit_minutes: None,
            },
        )
        .await
        .unwrap();
        for voter in &roles {
            vote_service::cast_ballot(&state, vote.id, *voter, VoteChoice::Person { role_id: roles[1] })
                .await
                .unwrap();
        }
        vote_service::close_vote(&state, vote.id).await.unwrap();
        vote_service::announce_vote(&state, vote.id).await.unwrap();
        (state, roles)
    }

    fn request() -> SubmitKingDecisionRequest {
        SubmitKingDecisionRequest {
            taxes: Default::default(),
            budget_priorities: BudgetPriorities {
                priority_1: BudgetArea::Research,
                priority_2: BudgetArea::Trade,
                priority_3: BudgetArea::Culture,
            },
            appointments: Default::default(),
            international_affairs: Default::default(),
            other_decisions: Some("Build a new harbour".into()),
            final_speech_transcript: None,
        }
    }

    #[tokio::test]
    async fn decisions_stay_hidden_until_revealed() {
        let (state, roles) = crowned_state().await;
        assert!(matches!(
            submit(&state, roles[0], request()).await,
            Err(ServiceError::Unauthorized(_))
        ));

        let submitted = submit(&state, roles[1], request()).await.unwrap();
        assert_eq!(submitted.king.role_id, roles[1]);

        let onlooker = for_participant(&state, roles[0]).await.unwrap();
        assert_eq!(onlooker.king.map(|k| k.role_id), Some(roles[1]));
        assert!(onlooker.decision.is_none());
        assert!(for_participant(&state, roles[1]).await.unwrap().decision.is_some());
        assert!(review(&state).await.unwrap().decision.is_some());
        assert!(matches!(
            revealed(&state).await,
            Err(ServiceError::InvalidState(_))
        ));

        let shown = reveal(&state).await.unwrap();
        assert!(shown.revealed_at.is_some());
        assert_eq!(
            revealed(&state).await.unwrap().other_decisions.as_deref(),
            Some("Build a new harbour")
        );
        assert!(matches!(
            submit(&state, roles[1], request()).await,
            Err(ServiceError::InvalidState(_))
        ));

        let kinds: Vec<String> = event_log::list_events(&state, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert!(kinds.iter().any(|k| k == "king_decision_submitted"));
        assert!(kinds.iter().any(|k| k == "king_decision_revealed"));
    }
}
