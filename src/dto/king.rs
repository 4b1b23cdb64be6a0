//! DTO definitions for the King's decisions.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        Appointments, BudgetPriorities, InternationalAffairs, KingDecisionEntity, TaxPolicy,
    },
    dto::{format_system_time, vote::CandidateRef},
    state::{king::KingDecisionDraft, simulation::SimulationSession},
};

/// Decisions handed in by the King; resubmitting replaces them until revealed.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitKingDecisionRequest {
    #[serde(default)]
    pub taxes: TaxPolicy,
    pub budget_priorities: BudgetPriorities,
    #[serde(default)]
    pub appointments: Appointments,
    #[serde(default)]
    pub international_affairs: InternationalAffairs,
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub other_decisions: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub final_speech_transcript: Option<String>,
}

impl From<SubmitKingDecisionRequest> for KingDecisionDraft {
    fn from(value: SubmitKingDecisionRequest) -> Self {
        Self {
            taxes: value.taxes,
            budget_priorities: value.budget_priorities,
            appointments: value.appointments,
            international_affairs: value.international_affairs,
            other_decisions: non_blank(value.other_decisions),
            final_speech_transcript: non_blank(value.final_speech_transcript),
        }
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Appointed office holders with display names.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct AppointmentsDto {
    pub economic_advisor: Option<CandidateRef>,
    pub senior_judge: Option<CandidateRef>,
}

/// The King's decisions as shown to the facilitator, and to the room once revealed.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct KingDecisionDto {
    pub id: Uuid,
    pub king: CandidateRef,
    pub taxes: TaxPolicy,
    pub budget_priorities: BudgetPriorities,
    pub appointments: AppointmentsDto,
    pub international_affairs: InternationalAffairs,
    pub other_decisions: Option<String>,
    pub final_speech_transcript: Option<String>,
    pub submitted_at: String,
    pub updated_at: String,
    pub revealed_at: Option<String>,
}

impl KingDecisionDto {
    pub fn build(sim: &SimulationSession, decision: &KingDecisionEntity) -> Self {
        let lookup = |role_id: Uuid| role_ref(sim, role_id);
        Self {
            id: decision.id,
            king: lookup(decision.king_role_id),
            taxes: decision.taxes,
            budget_priorities: decision.budget_priorities,
            appointments: AppointmentsDto {
                economic_advisor: decision.appointments.economic_advisor.map(lookup),
                senior_judge: decision.appointments.senior_judge.map(lookup),
            },
            international_affairs: decision.international_affairs.clone(),
            other_decisions: decision.other_decisions.clone(),
            final_speech_transcript: decision.final_speech_transcript.clone(),
            submitted_at: format_system_time(decision.submitted_at),
            updated_at: format_system_time(decision.updated_at),
            revealed_at: decision.revealed_at.map(format_system_time),
        }
    }
}

/// Who reigns, and the decisions the caller may see.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct KingDecisionStatus {
    pub king: Option<CandidateRef>,
    pub decision: Option<KingDecisionDto>,
}

impl KingDecisionStatus {
    /// `show_hidden` exposes decisions that are not revealed yet.
    pub fn build(sim: &SimulationSession, show_hidden: bool) -> Self {
        let decision = sim
            .king_decision
            .as_ref()
            .filter(|decision| show_hidden || decision.revealed_at.is_some())
            .map(|decision| KingDecisionDto::build(sim, decision));
        Self {
            king: sim.current_king().map(|role_id| role_ref(sim, role_id)),
            decision,
        }
    }
}

pub(crate) fn role_ref(sim: &SimulationSession, role_id: Uuid) -> CandidateRef {
    let role = sim.roles.get(&role_id);
    CandidateRef {
        role_id,
        name: role.map(|r| r.name.clone()).unwrap_or_default(),
        clan_id: role.map(|r| r.clan_id),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::models::{Alliance, BudgetArea, TaxChange, WarTarget};

    #[test]
    fn submission_fills_defaults_and_drops_blank_text() {
        let request: SubmitKingDecisionRequest = serde_json::from_value(json!({
            "taxes": { "agriculture": "lower", "trade": "same", "banking": "higher", "craft": "same" },
            "budget_priorities": {
                "priority_1": "public_welfare",
                "priority_2": "defense",
                "priority_3": "research"
            },
            "international_affairs": { "alliance": "none", "war_declarations": ["assyria"] },
            "other_decisions": "   "
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let draft = KingDecisionDraft::from(request);
        assert_eq!(draft.taxes.banking, TaxChange::Higher);
        assert_eq!(draft.budget_priorities.priority_1, BudgetArea::PublicWelfare);
        assert_eq!(draft.international_affairs.alliance, Alliance::NoAlliance);
        assert_eq!(draft.international_affairs.war_declarations, vec![WarTarget::Assyria]);
        assert_eq!(draft.appointments, Appointments::default());
        assert_eq!(draft.other_decisions, None);
    }

    #[test]
    fn overlong_speech_is_rejected() {
        let request: SubmitKingDecisionRequest = serde_json::from_value(json!({
            "budget_priorities": {
                "priority_1": "culture",
                "priority_2": "trade",
                "priority_3": "agriculture"
            },
            "final_speech_transcript": "a".repeat(20001)
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
