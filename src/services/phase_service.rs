//! Phase lifecycle: start, pause, resume, end, skip and extend, plus the
//! snapshots and clocks shown to the room.

use std::time::SystemTime;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::PhaseEntity,
    dto::phase::{PhaseClockDto, PhaseSnapshot, PhaseSummary, PhaseTimeline, VisibleRunPhase},
    error::ServiceError,
    services::{
        event_log::{self, EventKind, phase_payload},
        sse_events,
    },
    state::{
        SharedState,
        clock::{PhaseClock, planned_minutes},
        simulation::{SimulationResult, SimulationSession},
        state_machine::{RunEvent, RunPhase},
        transitions::run_transition_with_broadcast,
    },
};

/// Snapshot of the run for `phase`, with the clock read now.
pub async fn build_snapshot(state: &SharedState, phase: &RunPhase) -> PhaseSnapshot {
    let thresholds = state.config().timer_thresholds();
    let degraded = state.is_degraded();
    let now = SystemTime::now();

    state
        .read_simulation(|maybe| {
            let Some(sim) = maybe else {
                return PhaseSnapshot {
                    phase: phase.into(),
                    simulation_id: None,
                    simulation_name: None,
                    run_status: None,
                    degraded,
                    current_phase: None,
                    clock: None,
                    next_phase: None,
                };
            };

            let current = sim.current_phase();
            let clock = sim
                .running_phase()
                .and_then(|running| PhaseClock::read(running, now, &thresholds))
                .map(PhaseClockDto::from);
            let next_phase = match VisibleRunPhase::from(phase) {
                VisibleRunPhase::Setup | VisibleRunPhase::Between => {
                    sim.next_pending_phase().map(PhaseSummary::from)
                }
                _ => None,
            };

            PhaseSnapshot {
                phase: phase.into(),
                simulation_id: Some(sim.id),
                simulation_name: Some(sim.name.clone()),
                run_status: Some(sim.status),
                degraded,
                current_phase: current.map(PhaseSummary::from),
                clock,
                next_phase,
            }
        })
        .await
}

/// Snapshot of the run as it stands.
pub async fn current_snapshot(state: &SharedState) -> PhaseSnapshot {
    let phase = state.run_phase().await;
    build_snapshot(state, &phase).await
}

/// Phases of the loaded run in play order.
pub async fn timeline(state: &SharedState) -> Result<PhaseTimeline, ServiceError> {
    state
        .with_simulation(|sim| {
            let phases: Vec<PhaseSummary> = sim.phases.values().map(PhaseSummary::from).collect();
            Ok(PhaseTimeline {
                simulation_id: sim.id,
                total_planned_minutes: sim.phases.values().map(planned_minutes).sum(),
                phases,
            })
        })
        .await
}

/// Live clock of the running phase, or of the last one started.
pub async fn current_clock(state: &SharedState) -> Result<PhaseClockDto, ServiceError> {
    let thresholds = state.config().timer_thresholds();
    state
        .with_simulation(|sim| {
            sim.running_phase()
                .or_else(|| sim.current_phase())
                .and_then(|phase| PhaseClock::read(phase, SystemTime::now(), &thresholds))
                .map(PhaseClockDto::from)
                .ok_or_else(|| ServiceError::InvalidState("no phase has started".into()))
        })
        .await
}

pub async fn start_phase(state: &SharedState, phase_id: Uuid) -> Result<PhaseSummary, ServiceError> {
    phase_transition(
        state,
        RunEvent::StartPhase(phase_id),
        EventKind::PhaseStarted,
        move |sim, now| sim.start_phase(phase_id, now),
    )
    .await
}

pub async fn pause_phase(state: &SharedState) -> Result<PhaseSummary, ServiceError> {
    phase_transition(
        state,
        RunEvent::PausePhase,
        EventKind::PhasePaused,
        |sim, now| sim.pause_phase(now),
    )
    .await
}

pub async fn resume_phase(state: &SharedState) -> Result<PhaseSummary, ServiceError> {
    phase_transition(
        state,
        RunEvent::ResumePhase,
        EventKind::PhaseResumed,
        |sim, now| sim.resume_phase(now),
    )
    .await
}

pub async fn end_phase(state: &SharedState) -> Result<PhaseSummary, ServiceError> {
    phase_transition(state, RunEvent::EndPhase, EventKind::PhaseEnded, |sim, now| {
        sim.end_phase(now)
    })
    .await
}

pub async fn skip_phase(state: &SharedState, phase_id: Uuid) -> Result<PhaseSummary, ServiceError> {
    phase_transition(
        state,
        RunEvent::SkipPhase(phase_id),
        EventKind::PhaseSkipped,
        move |sim, now| sim.skip_phase(phase_id, now),
    )
    .await
}

/// Add minutes to the running phase. The run stays where it is, so no
/// transition is planned; listeners still get a fresh snapshot.
pub async fn extend_phase(state: &SharedState, minutes: u32) -> Result<PhaseSummary, ServiceError> {
    let (summary, run_id) = state
        .run_exclusive(move || async move {
            state
                .commit_simulation(move |sim| {
                    let summary = PhaseSummary::from(sim.extend_phase(minutes, SystemTime::now())?);
                    Ok((summary, sim.id))
                })
                .await
        })
        .await?;

    info!(phase_id = %summary.id, minutes, planned = summary.planned_minutes, "phase extended");
    event_log::record(
        state,
        run_id,
        EventKind::PhaseExtended,
        json!({
            "phase_id": summary.id,
            "phase_name": summary.name,
            "minutes": minutes,
            "planned_minutes": summary.planned_minutes,
        }),
    )
    .await;

    let phase = state.run_phase().await;
    sse_events::broadcast_phase_changed(state, &phase).await;
    Ok(summary)
}

async fn phase_transition<F>(
    state: &SharedState,
    event: RunEvent,
    kind: EventKind,
    apply: F,
) -> Result<PhaseSummary, ServiceError>
where
    F: FnOnce(&mut SimulationSession, SystemTime) -> SimulationResult<&PhaseEntity>,
{
    let (summary, run_id) = run_transition_with_broadcast(state, event, move || async move {
        state
            .commit_simulation(move |sim| {
                let summary = PhaseSummary::from(apply(sim, SystemTime::now())?);
                Ok((summary, sim.id))
            })
            .await
    })
    .await?;

    info!(phase_id = %summary.id, status = ?summary.status, event = kind.as_str(), "phase transition applied");
    event_log::record(state, run_id, kind, phase_payload(summary.id, &summary.name)).await;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::PhaseStatus, sim_store::memory::MemorySimStore},
        state::{AppState, simulation::tests::sample_simulation, state_machine::PhaseCursor},
    };

    async fn loaded_state() -> (SharedState, Vec<Uuid>) {
        let state = AppState::new(AppConfig::default());
        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        let sim = sample_simulation();
        let ids = sim.phases.keys().copied().collect();
        state
            .run_transition(RunEvent::Load(sim.run_phase()), || async { Ok(()) })
            .await
            .unwrap();
        state.replace_simulation(Some(sim)).await;
        (state, ids)
    }

    #[tokio::test]
    async fn start_then_pause_moves_the_run() {
        let (state, ids) = loaded_state().await;

        let started = start_phase(&state, ids[0]).await.unwrap();
        assert_eq!(started.status, PhaseStatus::Active);
        assert_eq!(
            state.run_phase().await,
            RunPhase::Running(PhaseCursor::Active(ids[0]))
        );

        let paused = pause_phase(&state).await.unwrap();
        assert_eq!(paused.status, PhaseStatus::Paused);
        let snapshot = current_snapshot(&state).await;
        assert_eq!(snapshot.phase, VisibleRunPhase::Paused);
        assert!(snapshot.clock.map(|clock| clock.paused).unwrap_or(false));
    }

    #[tokio::test]
    async fn out_of_order_start_is_rejected_and_rolled_back() {
        let (state, ids) = loaded_state().await;

        let err = start_phase(&state, ids[1]).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(state.run_phase().await, RunPhase::Setup);
        assert!(state.snapshot().await.pending.is_none());
    }

    #[tokio::test]
    async fn extend_changes_the_plan_but_not_the_run() {
        let (state, ids) = loaded_state().await;
        start_phase(&state, ids[0]).await.unwrap();

        let extended = extend_phase(&state, 5).await.unwrap();
        assert_eq!(extended.planned_minutes, 15);
        assert_eq!(
            state.run_phase().await,
            RunPhase::Running(PhaseCursor::Active(ids[0]))
        );
        assert_eq!(current_clock(&state).await.unwrap().planned_minutes, 15);
    }

    #[tokio::test]
    async fn transitions_are_audited() {
        let (state, ids) = loaded_state().await;
        start_phase(&state, ids[0]).await.unwrap();
        end_phase(&state).await.unwrap();
        skip_phase(&state, ids[1]).await.unwrap();

        let events = event_log::list_events(&state, None).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, ["phase_started", "phase_ended", "phase_skipped"]);

        let timeline = timeline(&state).await.unwrap();
        assert_eq!(timeline.phases[1].status, PhaseStatus::Skipped);
    }
}
