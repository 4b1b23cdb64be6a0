//! Append-only audit trail of facilitator actions.

use std::time::SystemTime;

use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::EventLogEntity, dto::events::EventLogDto, error::ServiceError,
    state::SharedState,
};

/// Audit entry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SimulationCreated,
    PhaseStarted,
    PhasePaused,
    PhaseResumed,
    PhaseEnded,
    PhaseSkipped,
    PhaseExtended,
    RunCompleted,
    RoleAssigned,
    VoteOpened,
    VoteClosed,
    VoteRecalculated,
    VoteAnnounced,
    VoteCastOnBehalf,
    WinnerOverridden,
    RunoffConfirmed,
    KingDecisionSubmitted,
    KingDecisionRevealed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SimulationCreated => "simulation_created",
            EventKind::PhaseStarted => "phase_started",
            EventKind::PhasePaused => "phase_paused",
            EventKind::PhaseResumed => "phase_resumed",
            EventKind::PhaseEnded => "phase_ended",
            EventKind::PhaseSkipped => "phase_skipped",
            EventKind::PhaseExtended => "phase_extended",
            EventKind::RunCompleted => "run_completed",
            EventKind::RoleAssigned => "role_assigned",
            EventKind::VoteOpened => "vote_opened",
            EventKind::VoteClosed => "vote_closed",
            EventKind::VoteRecalculated => "vote_recalculated",
            EventKind::VoteAnnounced => "vote_announced",
            EventKind::VoteCastOnBehalf => "vote_cast_on_behalf",
            EventKind::WinnerOverridden => "winner_overridden",
            EventKind::RunoffConfirmed => "runoff_confirmed",
            EventKind::KingDecisionSubmitted => "king_decision_submitted",
            EventKind::KingDecisionRevealed => "king_decision_revealed",
        }
    }
}

/// Append an audit entry for `run_id`.
///
/// The mutation it describes is already committed, so a failed write is only logged.
pub async fn record(state: &SharedState, run_id: Uuid, kind: EventKind, payload: Value) {
    let Some(store) = state.sim_store().await else {
        warn!(event_type = kind.as_str(), "audit entry dropped (degraded mode)");
        return;
    };

    let entry = EventLogEntity {
        id: Uuid::new_v4(),
        run_id,
        event_type: kind.as_str().to_string(),
        payload,
        created_at: SystemTime::now(),
    };
    match store.append_event(entry).await {
        Ok(()) => debug!(%run_id, event_type = kind.as_str(), "audit entry recorded"),
        Err(err) => warn!(
            %run_id,
            event_type = kind.as_str(),
            error = %err,
            "failed to record audit entry"
        ),
    }
}

/// Shorthand payload for phase transitions.
pub fn phase_payload(phase_id: Uuid, phase_name: &str) -> Value {
    json!({ "phase_id": phase_id, "phase_name": phase_name })
}

/// Audit entries of `run_id`, or of the loaded run when omitted.
pub async fn list_events(
    state: &SharedState,
    run_id: Option<Uuid>,
) -> Result<Vec<EventLogDto>, ServiceError> {
    let run_id = match run_id {
        Some(id) => id,
        None => state.with_simulation(|sim| Ok(sim.id)).await?,
    };
    let store = state.require_sim_store().await?;
    let events = store.list_events(run_id).await?;
    Ok(events.into_iter().map(EventLogDto::from).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::sim_store::memory::MemorySimStore, state::AppState};

    #[tokio::test]
    async fn records_are_listed_oldest_first() {
        let state = AppState::new(AppConfig::default());
        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        let run_id = Uuid::new_v4();

        record(&state, run_id, EventKind::PhaseStarted, json!({"n": 1})).await;
        record(&state, run_id, EventKind::PhaseEnded, json!({"n": 2})).await;

        let events = list_events(&state, Some(run_id)).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, ["phase_started", "phase_ended"]);
    }

    #[tokio::test]
    async fn listing_without_run_needs_a_loaded_simulation() {
        let state = AppState::new(AppConfig::default());
        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        assert!(matches!(
            list_events(&state, None).await,
            Err(ServiceError::InvalidState(_))
        ));
    }
}
