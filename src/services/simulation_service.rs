//! Scenario setup and run lifecycle: create, list, load, close, complete and
//! role assignment.

use std::{collections::HashSet, time::SystemTime};

use indexmap::IndexMap;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        ClanEntity, PhaseEntity, PhaseStatus, RoleEntity, RoleStatus, SimulationEntity,
        SimulationStatus,
    },
    dto::{
        phase::PhaseSnapshot,
        simulation::{CreateSimulationRequest, RoleDetail, SimulationDetail, SimulationListItem},
        vote::VoteResultDto,
    },
    error::ServiceError,
    services::{
        event_log::{self, EventKind, phase_payload},
        phase_service, sse_events,
    },
    state::{
        SharedState,
        simulation::{SimulationSession, generate_access_code},
        state_machine::RunEvent,
        transitions::run_transition_with_broadcast,
    },
};

/// Runs persisted in storage, oldest first.
pub async fn list_simulations(
    state: &SharedState,
) -> Result<Vec<SimulationListItem>, ServiceError> {
    let store = state.require_sim_store().await?;
    let simulations = store.list_simulations().await?;
    Ok(simulations.iter().map(SimulationListItem::from).collect())
}

/// Full view of a run; the loaded copy wins over storage.
pub async fn get_simulation(
    state: &SharedState,
    id: Uuid,
) -> Result<SimulationDetail, ServiceError> {
    let live = state
        .read_simulation(|maybe| {
            maybe
                .filter(|sim| sim.id == id)
                .map(SimulationDetail::from)
        })
        .await;
    if let Some(detail) = live {
        return Ok(detail);
    }

    let store = state.require_sim_store().await?;
    let Some(entity) = store.find_simulation(id).await? else {
        return Err(ServiceError::NotFound(format!("simulation `{id}` not found")));
    };
    let session = SimulationSession::from(entity);
    Ok(SimulationDetail::from(&session))
}

/// Build and persist a new run. It is not loaded.
pub async fn create_simulation(
    state: &SharedState,
    request: CreateSimulationRequest,
) -> Result<SimulationDetail, ServiceError> {
    let session = build_session(state, request, SystemTime::now())?;
    let store = state.require_sim_store().await?;
    store.save_simulation(SimulationEntity::from(&session)).await?;

    info!(
        simulation_id = %session.id,
        clans = session.clans.len(),
        roles = session.roles.len(),
        phases = session.phases.len(),
        "simulation created"
    );
    event_log::record(
        state,
        session.id,
        EventKind::SimulationCreated,
        json!({ "name": session.name, "version": session.version }),
    )
    .await;
    Ok(SimulationDetail::from(&session))
}

/// Remove a stored run; the loaded run must be closed first.
pub async fn delete_simulation(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let loaded = state.read_simulation(|sim| sim.map(|s| s.id)).await;
    if loaded == Some(id) {
        return Err(ServiceError::InvalidState(
            "cannot delete the loaded simulation; close it first".into(),
        ));
    }

    let store = state.require_sim_store().await?;
    if store.delete_simulation(id).await? {
        info!(simulation_id = %id, "simulation deleted");
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("simulation `{id}` not found")))
    }
}

/// Make a stored run the live one.
pub async fn load_simulation(
    state: &SharedState,
    id: Uuid,
) -> Result<SimulationDetail, ServiceError> {
    let store = state.require_sim_store().await?;
    let Some(entity) = store.find_simulation(id).await? else {
        return Err(ServiceError::NotFound(format!("simulation `{id}` not found")));
    };
    let session = SimulationSession::from(entity);
    ensure_loadable(&session)?;

    let target = session.run_phase();
    let detail = run_transition_with_broadcast(state, RunEvent::Load(target), move || async move {
        let detail = SimulationDetail::from(&session);
        state.replace_simulation(Some(session)).await;
        Ok(detail)
    })
    .await?;

    info!(simulation_id = %detail.id, status = ?detail.status, "simulation loaded");
    sse_events::broadcast_run_loaded(state, detail.id, &detail.name);
    Ok(detail)
}

/// Unload the live run. Its stored copy is kept.
pub async fn close_simulation(state: &SharedState) -> Result<(), ServiceError> {
    let closed = run_transition_with_broadcast(state, RunEvent::Close, move || async move {
        state
            .replace_simulation(None)
            .await
            .ok_or_else(|| ServiceError::InvalidState("no simulation is loaded".into()))
    })
    .await?;

    info!(simulation_id = %closed.id, "simulation closed");
    sse_events::broadcast_run_closed(state, closed.id, &closed.name);
    Ok(())
}

/// Finish the run, ending whatever phase is still running and closing open votes.
pub async fn complete_simulation(state: &SharedState) -> Result<PhaseSnapshot, ServiceError> {
    let (run_id, ended, closed) =
        run_transition_with_broadcast(state, RunEvent::CompleteRun, move || async move {
            state
                .commit_simulation(|sim| {
                    let completed = sim.complete(SystemTime::now())?;
                    let ended = completed
                        .ended_phase
                        .and_then(|id| sim.phases.get(&id))
                        .map(|phase| (phase.id, phase.name.clone()));
                    let closed = completed
                        .closed_votes
                        .iter()
                        .filter_map(|id| {
                            let session = sim.vote_sessions.get(id)?;
                            let result = sim.results.get(id)?;
                            Some(VoteResultDto::build(session, result))
                        })
                        .collect::<Vec<_>>();
                    Ok((sim.id, ended, closed))
                })
                .await
        })
        .await?;

    if let Some((phase_id, name)) = ended {
        event_log::record(state, run_id, EventKind::PhaseEnded, phase_payload(phase_id, &name))
            .await;
    }
    for result in closed {
        info!(session_id = %result.session_id, "vote closed with the run");
        event_log::record(
            state,
            run_id,
            EventKind::VoteClosed,
            json!({ "session_id": result.session_id, "status": result.status, "with_run": true }),
        )
        .await;
        sse_events::broadcast_vote_closed(state, result);
    }
    event_log::record(state, run_id, EventKind::RunCompleted, json!({})).await;
    info!(simulation_id = %run_id, "simulation completed");
    Ok(phase_service::current_snapshot(state).await)
}

/// Hand a role to a participant; the previous access code stops working.
pub async fn assign_role(
    state: &SharedState,
    role_id: Uuid,
    participant: Option<String>,
) -> Result<RoleDetail, ServiceError> {
    let participant = participant
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let (detail, run_id) = state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    let role = sim.assign_role(role_id, participant, SystemTime::now())?;
                    let detail = RoleDetail::from(role);
                    Ok((detail, sim.id))
                })
                .await
        })
        .await?;

    info!(%role_id, participant = ?detail.assigned_participant, "role assigned");
    event_log::record(
        state,
        run_id,
        EventKind::RoleAssigned,
        json!({ "role_id": role_id, "participant": detail.assigned_participant }),
    )
    .await;
    sse_events::broadcast_role_assigned(state, detail.clone());
    Ok(detail)
}

fn ensure_loadable(session: &SimulationSession) -> Result<(), ServiceError> {
    let running = session
        .phases
        .values()
        .filter(|phase| matches!(phase.status, PhaseStatus::Active | PhaseStatus::Paused))
        .count();
    if running > 1 {
        warn!(simulation_id = %session.id, running, "refusing to load inconsistent run");
        return Err(ServiceError::InvalidState(format!(
            "simulation `{}` has {running} running phases",
            session.id
        )));
    }
    Ok(())
}

fn build_session(
    state: &SharedState,
    request: CreateSimulationRequest,
    now: SystemTime,
) -> Result<SimulationSession, ServiceError> {
    let CreateSimulationRequest {
        name,
        version,
        clans: clan_inputs,
        phases: phase_inputs,
        vote_1_threshold,
        vote_2_threshold,
        learning_objectives,
        notes,
    } = request;

    let process = state.config().process();
    let mut seen_clans = HashSet::new();
    let mut issued_codes = HashSet::new();
    let mut clans = IndexMap::new();
    let mut roles = IndexMap::new();

    for (index, clan_input) in clan_inputs.into_iter().enumerate() {
        let clan_name = clan_input.name.trim().to_string();
        if !seen_clans.insert(clan_name.to_lowercase()) {
            return Err(ServiceError::InvalidInput(format!(
                "duplicate clan name `{clan_name}`"
            )));
        }

        let clan = ClanEntity {
            id: Uuid::new_v4(),
            name: clan_name,
            sequence_number: index as u32 + 1,
            about: clan_input.about,
            key_priorities: clan_input.key_priorities,
            color_hex: clan_input.color_hex,
            emblem_url: clan_input.emblem_url,
        };

        for role_input in clan_input.roles {
            let access_code = loop {
                let code = generate_access_code();
                if issued_codes.insert(code.clone()) {
                    break code;
                }
            };
            let role = RoleEntity {
                id: Uuid::new_v4(),
                clan_id: clan.id,
                name: role_input.name.trim().to_string(),
                position: role_input.position,
                background: role_input.background,
                participant_type: role_input.participant_type,
                assigned_participant: role_input.assigned_participant,
                access_code,
                avatar_url: role_input.avatar_url,
                status: RoleStatus::Active,
            };
            roles.insert(role.id, role);
        }
        clans.insert(clan.id, clan);
    }

    let phase_specs: Vec<(String, Option<String>, u32)> = if phase_inputs.is_empty() {
        process
            .phases
            .iter()
            .map(|template| {
                (
                    template.name.clone(),
                    template.description.clone(),
                    template.default_duration_minutes,
                )
            })
            .collect()
    } else {
        phase_inputs
            .into_iter()
            .map(|input| (input.name, input.description, input.default_duration_minutes))
            .collect()
    };

    let phases: IndexMap<Uuid, PhaseEntity> = phase_specs
        .into_iter()
        .enumerate()
        .map(|(index, (name, description, minutes))| {
            let phase = PhaseEntity {
                id: Uuid::new_v4(),
                sequence_number: index as u32,
                name,
                description,
                default_duration_minutes: minutes,
                actual_duration_minutes: None,
                started_at: None,
                ended_at: None,
                paused_at: None,
                paused_ms: 0,
                status: PhaseStatus::Pending,
            };
            (phase.id, phase)
        })
        .collect();

    if phases.is_empty() {
        return Err(ServiceError::InvalidInput(
            "a simulation needs at least one phase".into(),
        ));
    }

    let status = if roles.is_empty() {
        SimulationStatus::Setup
    } else {
        SimulationStatus::Ready
    };

    Ok(SimulationSession {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        version: version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| process.name.clone()),
        status,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
        current_phase_id: None,
        vote_1_threshold,
        vote_2_threshold,
        learning_objectives,
        notes,
        clans,
        roles,
        phases,
        vote_sessions: IndexMap::new(),
        votes: Vec::new(),
        results: IndexMap::new(),
        king_decision: None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::ParticipantType, sim_store::memory::MemorySimStore},
        dto::simulation::{ClanInput, RoleInput},
        state::{AppState, state_machine::RunPhase},
    };

    fn request(clans: &[&str]) -> CreateSimulationRequest {
        CreateSimulationRequest {
            name: "Kourion".into(),
            version: None,
            clans: clans
                .iter()
                .map(|name| ClanInput {
                    name: (*name).into(),
                    about: None,
                    key_priorities: None,
                    color_hex: None,
                    emblem_url: None,
                    roles: vec![
                        RoleInput {
                            name: format!("{name} elder"),
                            position: None,
                            background: None,
                            participant_type: ParticipantType::Human,
                            assigned_participant: None,
                            avatar_url: None,
                        },
                        RoleInput {
                            name: format!("{name} scout"),
                            position: None,
                            background: None,
                            participant_type: ParticipantType::Ai,
                            assigned_participant: None,
                            avatar_url: None,
                        },
                    ],
                })
                .collect(),
            phases: Vec::new(),
            vote_1_threshold: None,
            vote_2_threshold: None,
            learning_objectives: Vec::new(),
            notes: None,
        }
    }

    async fn state_with_store() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        state
    }

    #[tokio::test]
    async fn create_seeds_the_default_process() {
        let state = state_with_store().await;
        let detail = create_simulation(&state, request(&["Artificers", "Mercenaries"]))
            .await
            .unwrap();

        assert_eq!(detail.version, "KING");
        assert_eq!(detail.phases.len(), 16);
        assert_eq!(detail.status, SimulationStatus::Ready);
        let codes: HashSet<_> = detail.roles.iter().map(|r| r.access_code.clone()).collect();
        assert_eq!(codes.len(), 4);
        assert_eq!(list_simulations(&state).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_clan_names_are_rejected() {
        let state = state_with_store().await;
        let err = create_simulation(&state, request(&["Bankers", "bankers"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn load_close_cycle() {
        let state = state_with_store().await;
        let detail = create_simulation(&state, request(&["Priests"])).await.unwrap();

        load_simulation(&state, detail.id).await.unwrap();
        assert_eq!(state.run_phase().await, RunPhase::Setup);
        assert!(matches!(
            load_simulation(&state, detail.id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            delete_simulation(&state, detail.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        close_simulation(&state).await.unwrap();
        assert_eq!(state.run_phase().await, RunPhase::Idle);
        delete_simulation(&state, detail.id).await.unwrap();
        assert!(matches!(
            get_simulation(&state, detail.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn complete_ends_the_running_phase() {
        let state = state_with_store().await;
        let detail = create_simulation(&state, request(&["Landlords"])).await.unwrap();
        load_simulation(&state, detail.id).await.unwrap();
        phase_service::start_phase(&state, detail.phases[0].id)
            .await
            .unwrap();

        let snapshot = complete_simulation(&state).await.unwrap();
        assert_eq!(state.run_phase().await, RunPhase::Completed);
        assert_eq!(snapshot.run_status, Some(SimulationStatus::Completed));

        let stored = get_simulation(&state, detail.id).await.unwrap();
        assert_eq!(stored.phases[0].status, PhaseStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn reassignment_rotates_the_access_code() {
        let state = state_with_store().await;
        let detail = create_simulation(&state, request(&["Craftsmen"])).await.unwrap();
        load_simulation(&state, detail.id).await.unwrap();
        let role = &detail.roles[0];

        let assigned = assign_role(&state, role.id, Some("  Maya ".into()))
            .await
            .unwrap();
        assert_eq!(assigned.assigned_participant.as_deref(), Some("Maya"));
        assert_ne!(assigned.access_code, role.access_code);
    }
}
