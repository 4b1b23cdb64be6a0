use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{TransparencyLevel, VoteStatus},
    dto::{
        king::KingDecisionDto,
        simulation::RoleDetail,
        sse::{
            KingDecisionRevealedEvent, KingDecisionSubmittedEvent, PhaseChangedEvent,
            PhaseOvertimeEvent, PhaseTimerEvent, RoleAssignedEvent, RunLifecycleEvent,
            ServerEvent, SystemStatus, VoteAllCastEvent, VoteAnnouncedEvent, VoteClosedEvent,
            VoteOpenedEvent, VoteOverriddenEvent, VoteProgressEvent, VoteTallyEvent,
        },
        vote::{VoteResultDto, VoteSessionSummary, WinnerRef},
    },
    services::phase_service,
    state::{SharedState, state_machine::RunPhase},
};

const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_PHASE_TIMER: &str = "phase.timer";
const EVENT_PHASE_OVERTIME: &str = "phase.overtime";
const EVENT_VOTE_OPENED: &str = "vote.opened";
const EVENT_VOTE_PROGRESS: &str = "vote.progress";
const EVENT_VOTE_TALLY: &str = "vote.tally";
const EVENT_VOTE_ALL_CAST: &str = "vote.all_cast";
const EVENT_VOTE_CLOSED: &str = "vote.closed";
const EVENT_VOTE_ANNOUNCED: &str = "vote.announced";
const EVENT_VOTE_OVERRIDDEN: &str = "vote.overridden";
const EVENT_ROLE_ASSIGNED: &str = "role.assigned";
const EVENT_KING_DECISION_SUBMITTED: &str = "king.decision_submitted";
const EVENT_KING_DECISION_REVEALED: &str = "king.decision_revealed";
const EVENT_RUN_LOADED: &str = "run.loaded";
const EVENT_RUN_CLOSED: &str = "run.closed";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast a run phase change with a fresh snapshot.
pub async fn broadcast_phase_changed(state: &SharedState, phase: &RunPhase) {
    let snapshot = PhaseChangedEvent(phase_service::build_snapshot(state, phase).await);
    send_public_event(state, EVENT_PHASE_CHANGED, &snapshot);
    send_facilitator_event(state, EVENT_PHASE_CHANGED, &snapshot);
}

/// Broadcast the periodic clock of the running phase.
pub fn broadcast_phase_timer(state: &SharedState, payload: &PhaseTimerEvent) {
    send_public_event(state, EVENT_PHASE_TIMER, payload);
    send_facilitator_event(state, EVENT_PHASE_TIMER, payload);
}

/// Broadcast that the running phase crossed its planned end.
pub fn broadcast_phase_overtime(state: &SharedState, payload: &PhaseOvertimeEvent) {
    send_public_event(state, EVENT_PHASE_OVERTIME, payload);
    send_facilitator_event(state, EVENT_PHASE_OVERTIME, payload);
}

pub fn broadcast_vote_opened(state: &SharedState, vote: VoteSessionSummary) {
    send_facilitator_event(
        state,
        EVENT_VOTE_OPENED,
        &VoteOpenedEvent { vote: vote.clone() },
    );
    send_public_event(
        state,
        EVENT_VOTE_OPENED,
        &VoteOpenedEvent {
            vote: vote.for_room(),
        },
    );
}

/// Broadcast the ballot count; secret sessions only report it to the facilitator.
pub fn broadcast_vote_progress(
    state: &SharedState,
    transparency: TransparencyLevel,
    payload: &VoteProgressEvent,
) {
    send_facilitator_event(state, EVENT_VOTE_PROGRESS, payload);
    if transparency != TransparencyLevel::Secret {
        send_public_event(state, EVENT_VOTE_PROGRESS, payload);
    }
}

/// Broadcast a live tally for immediate-reveal sessions.
pub fn broadcast_vote_tally(
    state: &SharedState,
    transparency: TransparencyLevel,
    result: VoteResultDto,
) {
    let payload = VoteTallyEvent { result };
    send_facilitator_event(state, EVENT_VOTE_TALLY, &payload);
    if transparency != TransparencyLevel::Secret {
        send_public_event(state, EVENT_VOTE_TALLY, &payload);
    }
}

pub fn broadcast_vote_all_cast(state: &SharedState, session_id: Uuid, votes_cast: u32) {
    send_facilitator_event(
        state,
        EVENT_VOTE_ALL_CAST,
        &VoteAllCastEvent {
            session_id,
            votes_cast,
        },
    );
}

/// The facilitator receives the tally with the close; the room waits for the announcement.
pub fn broadcast_vote_closed(state: &SharedState, result: VoteResultDto) {
    send_public_event(
        state,
        EVENT_VOTE_CLOSED,
        &VoteClosedEvent {
            session_id: result.session_id,
            status: VoteStatus::Closed,
            result: None,
        },
    );
    send_facilitator_event(
        state,
        EVENT_VOTE_CLOSED,
        &VoteClosedEvent {
            session_id: result.session_id,
            status: VoteStatus::Closed,
            result: Some(result),
        },
    );
}

pub fn broadcast_vote_announced(state: &SharedState, result: VoteResultDto) {
    let payload = VoteAnnouncedEvent { result };
    send_public_event(state, EVENT_VOTE_ANNOUNCED, &payload);
    send_facilitator_event(state, EVENT_VOTE_ANNOUNCED, &payload);
}

/// Overrides reach the room only once the result has been announced.
pub fn broadcast_vote_overridden(
    state: &SharedState,
    session_id: Uuid,
    status: VoteStatus,
    winner: Option<WinnerRef>,
    reason: String,
) {
    let payload = VoteOverriddenEvent {
        session_id,
        winner,
        reason,
    };
    send_facilitator_event(state, EVENT_VOTE_OVERRIDDEN, &payload);
    if status == VoteStatus::Announced {
        send_public_event(state, EVENT_VOTE_OVERRIDDEN, &payload);
    }
}

/// Role assignments carry access codes and stay on the facilitator stream.
pub fn broadcast_role_assigned(state: &SharedState, role: RoleDetail) {
    send_facilitator_event(state, EVENT_ROLE_ASSIGNED, &RoleAssignedEvent { role });
}

/// Unrevealed decisions stay on the facilitator stream.
pub fn broadcast_king_decision_submitted(state: &SharedState, decision: KingDecisionDto) {
    send_facilitator_event(
        state,
        EVENT_KING_DECISION_SUBMITTED,
        &KingDecisionSubmittedEvent { decision },
    );
}

pub fn broadcast_king_decision_revealed(state: &SharedState, decision: KingDecisionDto) {
    let payload = KingDecisionRevealedEvent { decision };
    send_public_event(state, EVENT_KING_DECISION_REVEALED, &payload);
    send_facilitator_event(state, EVENT_KING_DECISION_REVEALED, &payload);
}

pub fn broadcast_run_loaded(state: &SharedState, simulation_id: Uuid, name: &str) {
    let payload = RunLifecycleEvent {
        simulation_id,
        name: name.to_string(),
    };
    send_public_event(state, EVENT_RUN_LOADED, &payload);
    send_facilitator_event(state, EVENT_RUN_LOADED, &payload);
}

pub fn broadcast_run_closed(state: &SharedState, simulation_id: Uuid, name: &str) {
    let payload = RunLifecycleEvent {
        simulation_id,
        name: name.to_string(),
    };
    send_public_event(state, EVENT_RUN_CLOSED, &payload);
    send_facilitator_event(state, EVENT_RUN_CLOSED, &payload);
}

/// Broadcast a degraded-mode toggle.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_public_event(state, EVENT_SYSTEM_STATUS, &payload);
    send_facilitator_event(state, EVENT_SYSTEM_STATUS, &payload);
}

/// Forward every degraded-mode toggle to both streams until the state is dropped.
pub async fn relay_system_status(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        if degraded {
            warn!("entering degraded mode");
        } else {
            info!("leaving degraded mode");
        }
        broadcast_system_status(&state, degraded);
    }
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_facilitator_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.facilitator_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize facilitator SSE payload"),
    }
}
