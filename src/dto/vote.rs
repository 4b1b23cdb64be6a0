//! DTO definitions for vote sessions, ballots and results.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        AnimationSpeed, ResultsData, RevealTiming, TransparencyLevel, VoteChoice, VoteEntity,
        VoteFormat, VoteResultEntity, VoteScope, VoteSessionEntity, VoteStatus, VoteType,
        WinnerOverride,
    },
    dto::{format_system_time, validation::validate_not_blank},
    state::simulation::SimulationSession,
};

/// Preset the facilitator opens votes from.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct VoteTemplateDto {
    pub id: String,
    pub name: String,
    pub description: String,
    pub vote_type: VoteType,
    pub vote_format: VoteFormat,
    pub scope: VoteScope,
    pub transparency_level: TransparencyLevel,
    pub reveal_timing: RevealTiming,
    pub animation_speed: AnimationSpeed,
    pub allow_skip_animation: bool,
    pub proposal_title: Option<String>,
    /// Fields the facilitator may override when opening the vote.
    pub customizable: Vec<String>,
}

/// Open a vote session from a template.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateVoteRequest {
    #[validate(length(min = 1))]
    pub template_id: String,
    /// Defaults to the running phase.
    #[serde(default)]
    pub phase_id: Option<Uuid>,
    #[serde(default)]
    pub scope: Option<VoteScope>,
    #[serde(default)]
    pub scope_clan_id: Option<Uuid>,
    /// Defaults to the clan's roles for clan nominations.
    #[serde(default)]
    pub eligible_candidates: Option<Vec<Uuid>>,
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub proposal_title: Option<String>,
    #[serde(default)]
    pub proposal_description: Option<String>,
    #[serde(default)]
    pub transparency_level: Option<TransparencyLevel>,
    #[serde(default)]
    pub reveal_timing: Option<RevealTiming>,
    #[serde(default)]
    pub animation_speed: Option<AnimationSpeed>,
    #[serde(default)]
    pub allow_skip_animation: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub threshold: Option<u32>,
    #[serde(default)]
    #[validate(range(min = 1, max = 180))]
    pub time_limit_minutes: Option<u32>,
}

/// Candidate reference with display name.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct CandidateRef {
    pub role_id: Uuid,
    pub name: String,
    pub clan_id: Option<Uuid>,
}

/// Vote session as listed to clients.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct VoteSessionSummary {
    pub id: Uuid,
    pub phase_id: Option<Uuid>,
    pub template_id: String,
    pub vote_type: VoteType,
    pub vote_format: VoteFormat,
    pub scope: VoteScope,
    pub scope_clan_id: Option<Uuid>,
    pub eligible_candidates: Vec<CandidateRef>,
    pub proposal_title: Option<String>,
    pub proposal_description: Option<String>,
    pub transparency_level: TransparencyLevel,
    pub reveal_timing: RevealTiming,
    pub animation_speed: AnimationSpeed,
    pub allow_skip_animation: bool,
    pub threshold: Option<u32>,
    pub time_limit_minutes: u32,
    pub status: VoteStatus,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub announced_at: Option<String>,
    /// Hidden from the room while a secret vote is open.
    pub votes_cast: Option<u32>,
    pub eligible_voters: u32,
}

impl VoteSessionSummary {
    /// Project `session` with candidate names and progress counts.
    pub fn build(sim: &SimulationSession, session: &VoteSessionEntity) -> Self {
        let eligible_candidates = session
            .eligible_candidates
            .iter()
            .map(|role_id| {
                let role = sim.roles.get(role_id);
                CandidateRef {
                    role_id: *role_id,
                    name: role.map(|r| r.name.clone()).unwrap_or_default(),
                    clan_id: role.map(|r| r.clan_id),
                }
            })
            .collect();

        Self {
            id: session.id,
            phase_id: session.phase_id,
            template_id: session.template_id.clone(),
            vote_type: session.vote_type,
            vote_format: session.vote_format,
            scope: session.scope,
            scope_clan_id: session.scope_clan_id,
            eligible_candidates,
            proposal_title: session.proposal_title.clone(),
            proposal_description: session.proposal_description.clone(),
            transparency_level: session.transparency_level,
            reveal_timing: session.reveal_timing,
            animation_speed: session.animation_speed,
            allow_skip_animation: session.allow_skip_animation,
            threshold: session.threshold,
            time_limit_minutes: session.time_limit_minutes,
            status: session.status,
            created_at: format_system_time(session.created_at),
            closed_at: session.closed_at.map(format_system_time),
            announced_at: session.announced_at.map(format_system_time),
            votes_cast: Some(sim.ballots(session.id).len() as u32),
            eligible_voters: sim.eligible_voters(session).count() as u32,
        }
    }

    /// Drop the live count for secret sessions that are still open.
    pub fn for_room(mut self) -> Self {
        if self.transparency_level == TransparencyLevel::Secret && self.status == VoteStatus::Open {
            self.votes_cast = None;
        }
        self
    }
}

/// Open vote a participant may answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantVote {
    #[serde(flatten)]
    pub session: VoteSessionSummary,
    pub has_voted: bool,
}

/// Ballot cast by a participant.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CastBallotRequest {
    pub choice: VoteChoice,
}

/// Ballot cast by the facilitator for a participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VoteOnBehalfRequest {
    pub voter_role_id: Uuid,
    pub choice: VoteChoice,
    #[validate(length(min = 1, max = 500), custom(function = "validate_not_blank"))]
    pub reason: String,
}

/// Replace the computed winner.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct OverrideWinnerRequest {
    /// `null` declares that nobody won.
    #[serde(default)]
    pub winner_role_id: Option<Uuid>,
    #[validate(length(min = 1, max = 500), custom(function = "validate_not_blank"))]
    pub reason: String,
}

/// Candidates carried over from a closed round into the next election round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ConfirmRunoffRequest {
    #[validate(length(min = 1, max = 50))]
    pub candidates: Vec<Uuid>,
}

/// Confirmation of a recorded ballot.
#[derive(Debug, Serialize, ToSchema)]
pub struct BallotReceipt {
    pub vote_id: Uuid,
    pub session_id: Uuid,
    pub voter_role_id: Uuid,
    pub cast_at: String,
    pub on_behalf: bool,
}

impl From<&VoteEntity> for BallotReceipt {
    fn from(vote: &VoteEntity) -> Self {
        Self {
            vote_id: vote.id,
            session_id: vote.session_id,
            voter_role_id: vote.voter_role_id,
            cast_at: format_system_time(vote.cast_at),
            on_behalf: vote.on_behalf.is_some(),
        }
    }
}

/// Facilitator correction of a result.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct WinnerOverrideDto {
    pub winner_role_id: Option<Uuid>,
    pub winner_name: Option<String>,
    pub reason: String,
    pub overridden_at: String,
}

impl From<&WinnerOverride> for WinnerOverrideDto {
    fn from(value: &WinnerOverride) -> Self {
        Self {
            winner_role_id: value.winner_role_id,
            winner_name: value.winner_name.clone(),
            reason: value.reason.clone(),
            overridden_at: format_system_time(value.overridden_at),
        }
    }
}

/// Winner after any override.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct WinnerRef {
    pub role_id: Uuid,
    pub name: String,
}

/// Result of a closed vote.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct VoteResultDto {
    pub session_id: Uuid,
    pub vote_type: VoteType,
    pub status: VoteStatus,
    pub results: ResultsData,
    pub calculated_at: String,
    pub announced_at: Option<String>,
    pub winner_override: Option<WinnerOverrideDto>,
    pub effective_winner: Option<WinnerRef>,
    /// Candidates confirmed for the next round, empty until the facilitator picks them.
    pub confirmed_runoff_candidates: Vec<Uuid>,
    pub animation_speed: AnimationSpeed,
    pub allow_skip_animation: bool,
}

impl VoteResultDto {
    pub fn build(session: &VoteSessionEntity, result: &VoteResultEntity) -> Self {
        Self {
            session_id: result.session_id,
            vote_type: session.vote_type,
            status: session.status,
            results: result.results.clone(),
            calculated_at: format_system_time(result.calculated_at),
            announced_at: result.announced_at.map(format_system_time),
            winner_override: result.winner_override.as_ref().map(Into::into),
            effective_winner: effective_winner(result),
            confirmed_runoff_candidates: result.confirmed_runoff_candidates.clone(),
            animation_speed: session.animation_speed,
            allow_skip_animation: session.allow_skip_animation,
        }
    }
}

/// Winner of `result`, preferring the facilitator's override.
pub fn effective_winner(result: &VoteResultEntity) -> Option<WinnerRef> {
    if let Some(override_) = &result.winner_override {
        return match (override_.winner_role_id, &override_.winner_name) {
            (Some(role_id), Some(name)) => Some(WinnerRef {
                role_id,
                name: name.clone(),
            }),
            _ => None,
        };
    }
    match &result.results {
        ResultsData::ChoosePerson(person) => person.winner.as_ref().map(|winner| WinnerRef {
            role_id: winner.role_id,
            name: winner.name.clone(),
        }),
        ResultsData::YesNo(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{CandidateTally, PersonResults};

    fn person_result(winner: Option<CandidateTally>) -> VoteResultEntity {
        VoteResultEntity {
            session_id: Uuid::new_v4(),
            results: ResultsData::ChoosePerson(PersonResults {
                winner,
                all_candidates: Vec::new(),
                runoff_candidates: Vec::new(),
                total_votes: 0,
                tie: false,
                threshold_required: None,
                threshold_met: None,
                ballots: Vec::new(),
            }),
            calculated_at: SystemTime::now(),
            announced_at: None,
            winner_override: None,
            confirmed_runoff_candidates: Vec::new(),
        }
    }

    #[test]
    fn override_wins_over_tally() {
        let tallied = CandidateTally {
            role_id: Uuid::new_v4(),
            name: "Aria".into(),
            vote_count: 3,
            percentage: 60.0,
        };
        let mut result = person_result(Some(tallied.clone()));
        assert_eq!(
            effective_winner(&result).map(|w| w.role_id),
            Some(tallied.role_id)
        );

        let chosen = Uuid::new_v4();
        result.winner_override = Some(WinnerOverride {
            winner_role_id: Some(chosen),
            winner_name: Some("Bran".into()),
            reason: "tie broken by lot".into(),
            overridden_at: SystemTime::now(),
        });
        assert_eq!(effective_winner(&result).map(|w| w.role_id), Some(chosen));

        result.winner_override = Some(WinnerOverride {
            winner_role_id: None,
            winner_name: None,
            reason: "annulled".into(),
            overridden_at: SystemTime::now(),
        });
        assert!(effective_winner(&result).is_none());
    }

    #[test]
    fn override_reason_must_not_be_blank() {
        let request = OverrideWinnerRequest {
            winner_role_id: None,
            reason: "   ".into(),
        };
        assert!(request.validate().is_err());
    }
}
