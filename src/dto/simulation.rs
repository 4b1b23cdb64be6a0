//! DTO definitions for scenario setup and the facilitator's view of a run.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        ClanEntity, ParticipantType, RoleEntity, RoleStatus, SimulationEntity, SimulationStatus,
    },
    dto::{
        format_system_time,
        phase::PhaseSummary,
        validation::{validate_asset_url, validate_color_hex, validate_not_blank},
        vote::{VoteResultDto, VoteSessionSummary},
    },
    state::simulation::SimulationSession,
};

/// Scenario submitted by the facilitator.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSimulationRequest {
    #[validate(length(min = 1, max = 120), custom(function = "validate_not_blank"))]
    pub name: String,
    /// Scenario tag; defaults to the configured process name.
    #[serde(default)]
    pub version: Option<String>,
    #[validate(length(min = 1), nested)]
    pub clans: Vec<ClanInput>,
    /// Phases in play order; the configured process is used when empty.
    #[serde(default)]
    #[validate(nested)]
    pub phases: Vec<PhaseInput>,
    #[serde(default)]
    pub vote_1_threshold: Option<u32>,
    #[serde(default)]
    pub vote_2_threshold: Option<u32>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Clan with its roles.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClanInput {
    pub name: String,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub key_priorities: Option<String>,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub emblem_url: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleInput>,
}

impl Validate for ClanInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_not_blank(&self.name) {
            errors.add("name", e);
        }
        if let Some(ref color) = self.color_hex {
            if let Err(e) = validate_color_hex(color) {
                errors.add("color_hex", e);
            }
        }
        if let Some(ref url) = self.emblem_url {
            if let Err(e) = validate_asset_url(url) {
                errors.add("emblem_url", e);
            }
        }

        let roles = self
            .roles
            .iter()
            .map(Validate::validate)
            .collect::<Vec<_>>();
        if roles.iter().any(Result::is_err) {
            errors.add(
                "roles",
                validator::ValidationError::new("invalid_role")
                    .with_message("one or more roles are invalid".into()),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Role inside a clan.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default = "default_participant_type")]
    pub participant_type: ParticipantType,
    #[serde(default)]
    pub assigned_participant: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

fn default_participant_type() -> ParticipantType {
    ParticipantType::Human
}

impl Validate for RoleInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_not_blank(&self.name) {
            errors.add("name", e);
        }
        if let Some(ref url) = self.avatar_url {
            if let Err(e) = validate_asset_url(url) {
                errors.add("avatar_url", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Custom phase definition.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct PhaseInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub default_duration_minutes: u32,
}

/// Minimal projection of a stored run.
#[derive(Debug, Serialize, ToSchema)]
pub struct SimulationListItem {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub status: SimulationStatus,
    pub created_at: String,
    pub clans: usize,
    pub roles: usize,
    pub phases: usize,
}

impl From<&SimulationEntity> for SimulationListItem {
    fn from(value: &SimulationEntity) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            version: value.version.clone(),
            status: value.status,
            created_at: format_system_time(value.created_at),
            clans: value.clans.len(),
            roles: value.roles.len(),
            phases: value.phases.len(),
        }
    }
}

/// Public information about a clan.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ClanSummary {
    pub id: Uuid,
    pub name: String,
    pub sequence_number: u32,
    pub about: Option<String>,
    pub key_priorities: Option<String>,
    pub color_hex: Option<String>,
    pub emblem_url: Option<String>,
}

impl From<&ClanEntity> for ClanSummary {
    fn from(clan: &ClanEntity) -> Self {
        Self {
            id: clan.id,
            name: clan.name.clone(),
            sequence_number: clan.sequence_number,
            about: clan.about.clone(),
            key_priorities: clan.key_priorities.clone(),
            color_hex: clan.color_hex.clone(),
            emblem_url: clan.emblem_url.clone(),
        }
    }
}

/// Role as the facilitator sees it, access code included.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct RoleDetail {
    pub id: Uuid,
    pub clan_id: Uuid,
    pub name: String,
    pub position: Option<String>,
    pub background: Option<String>,
    pub participant_type: ParticipantType,
    pub assigned_participant: Option<String>,
    pub access_code: String,
    pub avatar_url: Option<String>,
    pub status: RoleStatus,
}

impl From<&RoleEntity> for RoleDetail {
    fn from(role: &RoleEntity) -> Self {
        Self {
            id: role.id,
            clan_id: role.clan_id,
            name: role.name.clone(),
            position: role.position.clone(),
            background: role.background.clone(),
            participant_type: role.participant_type,
            assigned_participant: role.assigned_participant.clone(),
            access_code: role.access_code.clone(),
            avatar_url: role.avatar_url.clone(),
            status: role.status,
        }
    }
}

/// Full facilitator view of a run.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct SimulationDetail {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub status: SimulationStatus,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub current_phase_id: Option<Uuid>,
    pub vote_1_threshold: Option<u32>,
    pub vote_2_threshold: Option<u32>,
    pub learning_objectives: Vec<String>,
    pub notes: Option<String>,
    pub clans: Vec<ClanSummary>,
    pub roles: Vec<RoleDetail>,
    pub phases: Vec<PhaseSummary>,
    pub vote_sessions: Vec<VoteSessionSummary>,
    pub results: Vec<VoteResultDto>,
}

impl From<&SimulationSession> for SimulationDetail {
    fn from(sim: &SimulationSession) -> Self {
        Self {
            id: sim.id,
            name: sim.name.clone(),
            version: sim.version.clone(),
            status: sim.status,
            created_at: format_system_time(sim.created_at),
            updated_at: format_system_time(sim.updated_at),
            started_at: sim.started_at.map(format_system_time),
            completed_at: sim.completed_at.map(format_system_time),
            current_phase_id: sim.current_phase_id,
            vote_1_threshold: sim.vote_1_threshold,
            vote_2_threshold: sim.vote_2_threshold,
            learning_objectives: sim.learning_objectives.clone(),
            notes: sim.notes.clone(),
            clans: sim.clans.values().map(ClanSummary::from).collect(),
            roles: sim.roles.values().map(RoleDetail::from).collect(),
            phases: sim.phases.values().map(PhaseSummary::from).collect(),
            vote_sessions: sim
                .vote_sessions
                .values()
                .map(|session| VoteSessionSummary::build(sim, session))
                .collect(),
            results: sim
                .results
                .values()
                .filter_map(|result| {
                    sim.vote_sessions
                        .get(&result.session_id)
                        .map(|session| VoteResultDto::build(session, result))
                })
                .collect(),
        }
    }
}

/// Give a role to a participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AssignRoleRequest {
    /// Display name of the participant; `null` frees the role.
    #[serde(default)]
    #[validate(length(min = 1, max = 80))]
    pub participant: Option<String>,
}
