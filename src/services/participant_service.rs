//! What a participant reaches with their access code: their briefing, the
//! votes open to them and their ballots.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::{VoteChoice, VoteStatus},
    dto::{
        participant::{ParticipantBriefing, RoleBriefing},
        phase::{PhaseClockDto, PhaseSummary},
        vote::{BallotReceipt, ParticipantVote, VoteResultDto, VoteSessionSummary},
    },
    error::ServiceError,
    services::vote_service,
    state::{SharedState, clock::PhaseClock},
};

/// Resolve an access code to the role it belongs to in the loaded run.
pub async fn authenticate(state: &SharedState, access_code: &str) -> Result<Uuid, ServiceError> {
    let found = state
        .read_simulation(|maybe| {
            maybe.map(|sim| sim.role_by_access_code(access_code).map(|role| role.id))
        })
        .await;
    match found {
        Some(Some(role_id)) => Ok(role_id),
        Some(None) => Err(ServiceError::Unauthorized("unknown access code".into())),
        None => Err(ServiceError::Unauthorized("no simulation is running".into())),
    }
}

/// Role sheet, clan and phase clock of `role_id`.
pub async fn briefing(
    state: &SharedState,
    role_id: Uuid,
) -> Result<ParticipantBriefing, ServiceError> {
    let thresholds = state.config().timer_thresholds();
    state
        .with_simulation(|sim| {
            let role = sim.role(role_id)?;
            let current = sim.current_phase();
            let clock = sim
                .running_phase()
                .and_then(|phase| PhaseClock::read(phase, SystemTime::now(), &thresholds))
                .map(PhaseClockDto::from);
            Ok(ParticipantBriefing {
                simulation_id: sim.id,
                simulation_name: sim.name.clone(),
                run_status: sim.status,
                role: RoleBriefing::from(role),
                clan: sim.clans.get(&role.clan_id).map(Into::into),
                current_phase: current.map(PhaseSummary::from),
                clock,
            })
        })
        .await
}

/// Open sessions `role_id` may vote in, flagged when already answered.
pub async fn open_votes(
    state: &SharedState,
    role_id: Uuid,
) -> Result<Vec<ParticipantVote>, ServiceError> {
    state
        .with_simulation(|sim| {
            Ok(sim
                .vote_sessions
                .values()
                .filter(|session| session.status == VoteStatus::Open)
                .filter(|session| sim.eligible_voters(session).any(|role| role.id == role_id))
                .map(|session| ParticipantVote {
                    session: VoteSessionSummary::build(sim, session).for_room(),
                    has_voted: sim.has_voted(session.id, role_id),
                })
                .collect())
        })
        .await
}

pub async fn cast(
    state: &SharedState,
    role_id: Uuid,
    session_id: Uuid,
    choice: VoteChoice,
) -> Result<BallotReceipt, ServiceError> {
    vote_service::cast_ballot(state, session_id, role_id, choice).await
}

pub async fn result(state: &SharedState, session_id: Uuid) -> Result<VoteResultDto, ServiceError> {
    vote_service::announced_result(state, session_id).await
}
