use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{ParticipantType, RoleEntity},
    dto::simulation::ClanSummary,
    state::simulation::SimulationSession,
};

/// Role details visible to the whole room.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PublicRole {
    pub id: Uuid,
    pub name: String,
    pub position: Option<String>,
    pub participant_type: ParticipantType,
    pub assigned_participant: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&RoleEntity> for PublicRole {
    fn from(role: &RoleEntity) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            position: role.position.clone(),
            participant_type: role.participant_type,
            assigned_participant: role.assigned_participant.clone(),
            avatar_url: role.avatar_url.clone(),
        }
    }
}

/// Clan card with its members.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PublicClan {
    #[serde(flatten)]
    pub clan: ClanSummary,
    pub roles: Vec<PublicRole>,
}

/// Every clan of `sim` in display order.
pub fn public_clans(sim: &SimulationSession) -> Vec<PublicClan> {
    sim.clans
        .values()
        .map(|clan| PublicClan {
            clan: clan.into(),
            roles: sim
                .roles
                .values()
                .filter(|role| role.clan_id == clan.id)
                .map(PublicRole::from)
                .collect(),
        })
        .collect()
}
