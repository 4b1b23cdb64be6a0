//! Read-only projections of the loaded run for the projector and the room.

use uuid::Uuid;

use crate::{
    dto::{
        phase::{PhaseSnapshot, PhaseTimeline},
        public::{PublicClan, public_clans},
        vote::VoteResultDto,
    },
    error::ServiceError,
    services::{phase_service, vote_service},
    state::SharedState,
};

/// Current run phase with the live clock and degraded flag.
pub async fn get_phase(state: &SharedState) -> PhaseSnapshot {
    phase_service::current_snapshot(state).await
}

pub async fn get_phases(state: &SharedState) -> Result<PhaseTimeline, ServiceError> {
    phase_service::timeline(state).await
}

/// Clans with the public part of their roles.
pub async fn get_clans(state: &SharedState) -> Result<Vec<PublicClan>, ServiceError> {
    state.with_simulation(|sim| Ok(public_clans(sim))).await
}

pub async fn get_vote_result(
    state: &SharedState,
    session_id: Uuid,
) -> Result<VoteResultDto, ServiceError> {
    vote_service::announced_result(state, session_id).await
}
