use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{ParticipantType, RoleEntity, SimulationStatus},
    dto::{
        phase::{PhaseClockDto, PhaseSummary},
        simulation::ClanSummary,
    },
};

/// The participant's own character sheet.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleBriefing {
    pub id: Uuid,
    pub name: String,
    pub position: Option<String>,
    pub background: Option<String>,
    pub participant_type: ParticipantType,
    pub assigned_participant: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&RoleEntity> for RoleBriefing {
    fn from(role: &RoleEntity) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            position: role.position.clone(),
            background: role.background.clone(),
            participant_type: role.participant_type,
            assigned_participant: role.assigned_participant.clone(),
            avatar_url: role.avatar_url.clone(),
        }
    }
}

/// Everything a participant sees after entering their access code.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantBriefing {
    pub simulation_id: Uuid,
    pub simulation_name: String,
    pub run_status: SimulationStatus,
    pub role: RoleBriefing,
    pub clan: Option<ClanSummary>,
    pub current_phase: Option<PhaseSummary>,
    pub clock: Option<PhaseClockDto>,
}
