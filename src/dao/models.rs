use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a simulation run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    /// Scenario is being configured.
    Setup,
    /// Configuration is complete and the run can start.
    Ready,
    /// At least one phase has been started.
    InProgress,
    /// The facilitator closed the run.
    Completed,
    /// The run was abandoned before completion.
    Cancelled,
}

/// Lifecycle of a single phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Not started yet.
    Pending,
    /// Running; its clock is ticking.
    Active,
    /// Started, clock frozen.
    Paused,
    /// Ended by the facilitator.
    Completed,
    /// Passed over without being run.
    Skipped,
}

/// Whether a role is played by a person or simulated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    /// Played by a participant in the room.
    Human,
    /// Played by an AI character.
    Ai,
}

/// Whether a role still takes part in votes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    /// Counts as an eligible voter.
    #[default]
    Active,
    /// Left the simulation; no longer votes.
    Inactive,
}

/// Purpose of a vote session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    /// A clan picks its candidate for King.
    ClanNomination,
    /// Everyone votes for King.
    ElectionRound,
    /// A clan decides whether to swear allegiance.
    ClanOath,
    /// A clan decides whether to act against the King.
    ClanAction,
    /// Ad-hoc vote raised by the facilitator.
    FacilitatorProposal,
}

/// Shape of the ballot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteFormat {
    /// Pick one role among the eligible candidates.
    ChoosePerson,
    /// Answer yes, no or abstain.
    YesNo,
}

/// Who may vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteScope {
    /// Every active role.
    All,
    /// Only members of `scope_clan_id`.
    ClanOnly,
}

/// How much of the ballot is disclosed with the result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyLevel {
    /// Ballots are listed per voter.
    Open,
    /// Only tallies are shown.
    Anonymous,
    /// Tallies are shown and progress is hidden while voting.
    Secret,
}

/// When results reach the room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RevealTiming {
    /// Live tally after each ballot.
    Immediate,
    /// Once every eligible voter has voted.
    AfterAllVotes,
    /// Whenever the facilitator announces.
    FacilitatorManual,
}

/// Pace of the reveal animation on the projector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnimationSpeed {
    /// Dramatic reveal.
    Slow,
    /// Default pace.
    Normal,
    /// Quick reveal.
    Fast,
    /// No animation.
    Instant,
}

/// Lifecycle of a vote session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    /// Accepting ballots.
    Open,
    /// Ballots frozen and tallied.
    Closed,
    /// Result revealed to the room.
    Announced,
}

/// Answer to a yes/no proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum YesNoChoice {
    /// In favour.
    Yes,
    /// Against.
    No,
    /// Neither.
    Abstain,
}

/// Content of a ballot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoteChoice {
    /// Vote for a role.
    Person {
        /// Chosen role.
        role_id: Uuid,
    },
    /// Answer to a proposal.
    YesNo {
        /// Chosen answer.
        choice: YesNoChoice,
    },
}

/// Persisted aggregate holding a whole run: setup, phases, and votes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationEntity {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub status: SimulationStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    #[serde(default)]
    pub started_at: Option<SystemTime>,
    #[serde(default)]
    pub completed_at: Option<SystemTime>,
    #[serde(default)]
    pub current_phase_id: Option<Uuid>,
    #[serde(default)]
    pub vote_1_threshold: Option<u32>,
    #[serde(default)]
    pub vote_2_threshold: Option<u32>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub clans: Vec<ClanEntity>,
    pub roles: Vec<RoleEntity>,
    pub phases: Vec<PhaseEntity>,
    #[serde(default)]
    pub vote_sessions: Vec<VoteSessionEntity>,
    #[serde(default)]
    pub votes: Vec<VoteEntity>,
    #[serde(default)]
    pub vote_results: Vec<VoteResultEntity>,
    #[serde(default)]
    pub king_decision: Option<KingDecisionEntity>,
}

/// Faction grouping several roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClanEntity {
    pub id: Uuid,
    pub name: String,
    pub sequence_number: u32,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub key_priorities: Option<String>,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub emblem_url: Option<String>,
}

/// Character played by one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleEntity {
    pub id: Uuid,
    pub clan_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    pub participant_type: ParticipantType,
    #[serde(default)]
    pub assigned_participant: Option<String>,
    pub access_code: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: RoleStatus,
}

/// One timed stage of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseEntity {
    pub id: Uuid,
    pub sequence_number: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub default_duration_minutes: u32,
    /// Extended plan while running; measured duration once ended.
    #[serde(default)]
    pub actual_duration_minutes: Option<u32>,
    #[serde(default)]
    pub started_at: Option<SystemTime>,
    #[serde(default)]
    pub ended_at: Option<SystemTime>,
    #[serde(default)]
    pub paused_at: Option<SystemTime>,
    /// Total time spent paused, excluded from the clock.
    #[serde(default)]
    pub paused_ms: u64,
    pub status: PhaseStatus,
}

/// Configuration and status of one vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteSessionEntity {
    pub id: Uuid,
    #[serde(default)]
    pub phase_id: Option<Uuid>,
    pub template_id: String,
    pub vote_type: VoteType,
    pub vote_format: VoteFormat,
    pub scope: VoteScope,
    #[serde(default)]
    pub scope_clan_id: Option<Uuid>,
    #[serde(default)]
    pub eligible_candidates: Vec<Uuid>,
    #[serde(default)]
    pub proposal_title: Option<String>,
    #[serde(default)]
    pub proposal_description: Option<String>,
    pub transparency_level: TransparencyLevel,
    pub reveal_timing: RevealTiming,
    pub animation_speed: AnimationSpeed,
    pub allow_skip_animation: bool,
    #[serde(default)]
    pub threshold: Option<u32>,
    pub time_limit_minutes: u32,
    pub status: VoteStatus,
    pub created_at: SystemTime,
    #[serde(default)]
    pub closed_at: Option<SystemTime>,
    #[serde(default)]
    pub announced_at: Option<SystemTime>,
}

/// A single ballot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    pub id: Uuid,
    pub session_id: Uuid,
    pub voter_role_id: Uuid,
    pub voter_clan_id: Uuid,
    pub choice: VoteChoice,
    pub cast_at: SystemTime,
    /// Reason given when the facilitator cast the ballot for the voter.
    #[serde(default)]
    pub on_behalf: Option<String>,
}

/// Tally line for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CandidateTally {
    pub role_id: Uuid,
    pub name: String,
    pub vote_count: u32,
    pub percentage: f64,
}

/// Ballot disclosed with open-transparency results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BallotRecord {
    pub voter_role_id: Uuid,
    pub voter_name: String,
    pub choice: VoteChoice,
}

/// Outcome of a choose-person vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PersonResults {
    pub winner: Option<CandidateTally>,
    pub all_candidates: Vec<CandidateTally>,
    #[serde(default)]
    pub runoff_candidates: Vec<CandidateTally>,
    pub total_votes: u32,
    pub tie: bool,
    #[serde(default)]
    pub threshold_required: Option<u32>,
    #[serde(default)]
    pub threshold_met: Option<bool>,
    #[serde(default)]
    pub ballots: Vec<BallotRecord>,
}

/// Outcome of a yes/no vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct YesNoResults {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub total: u32,
    pub yes_percentage: f64,
    pub no_percentage: f64,
    pub abstain_percentage: f64,
    pub passed: bool,
    #[serde(default)]
    pub ballots: Vec<BallotRecord>,
}

/// Computed result, shaped by the vote format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ResultsData {
    /// Candidate ranking.
    ChoosePerson(PersonResults),
    /// Yes/no counts.
    YesNo(YesNoResults),
}

/// Facilitator correction applied on top of a computed result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinnerOverride {
    pub winner_role_id: Option<Uuid>,
    pub winner_name: Option<String>,
    pub reason: String,
    pub overridden_at: SystemTime,
}

/// Stored result of a closed vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteResultEntity {
    pub session_id: Uuid,
    pub results: ResultsData,
    pub calculated_at: SystemTime,
    #[serde(default)]
    pub announced_at: Option<SystemTime>,
    #[serde(default)]
    pub winner_override: Option<WinnerOverride>,
    /// Candidates the facilitator carried over to the next election round.
    #[serde(default)]
    pub confirmed_runoff_candidates: Vec<Uuid>,
}

impl VoteResultEntity {
    /// Winner after any facilitator override.
    pub fn winner_role_id(&self) -> Option<Uuid> {
        if let Some(correction) = &self.winner_override {
            return correction.winner_role_id;
        }
        match &self.results {
            ResultsData::ChoosePerson(person) => person.winner.as_ref().map(|w| w.role_id),
            ResultsData::YesNo(_) => None,
        }
    }
}

/// Direction the King moves a sector's tax rate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxChange {
    Lower,
    #[default]
    Same,
    Higher,
}

/// Tax levels per economic sector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TaxPolicy {
    pub agriculture: TaxChange,
    pub trade: TaxChange,
    pub banking: TaxChange,
    pub craft: TaxChange,
}

/// Area the royal budget can favour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BudgetArea {
    Defense,
    Culture,
    Infrastructure,
    Research,
    PublicWelfare,
    Trade,
    Agriculture,
}

/// Three budget areas, most important first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BudgetPriorities {
    pub priority_1: BudgetArea,
    pub priority_2: BudgetArea,
    pub priority_3: BudgetArea,
}

impl BudgetPriorities {
    pub fn areas(&self) -> [BudgetArea; 3] {
        [self.priority_1, self.priority_2, self.priority_3]
    }
}

/// Offices the King fills with other roles.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Appointments {
    #[serde(default)]
    pub economic_advisor: Option<Uuid>,
    #[serde(default)]
    pub senior_judge: Option<Uuid>,
}

/// City-kingdom the King may ally with.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Alliance {
    #[default]
    #[serde(rename = "none")]
    NoAlliance,
    Salamis,
    Kition,
}

/// Neighbour the King may declare war on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WarTarget {
    Salamis,
    Kition,
    Egypt,
    Persia,
    Assyria,
}

/// Foreign policy of the new reign.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct InternationalAffairs {
    #[serde(default)]
    pub alliance: Alliance,
    #[serde(default)]
    pub war_declarations: Vec<WarTarget>,
}

/// Decisions the elected King hands in, hidden from the room until revealed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KingDecisionEntity {
    pub id: Uuid,
    pub king_role_id: Uuid,
    pub taxes: TaxPolicy,
    pub budget_priorities: BudgetPriorities,
    #[serde(default)]
    pub appointments: Appointments,
    #[serde(default)]
    pub international_affairs: InternationalAffairs,
    #[serde(default)]
    pub other_decisions: Option<String>,
    #[serde(default)]
    pub final_speech_transcript: Option<String>,
    pub submitted_at: SystemTime,
    pub updated_at: SystemTime,
    #[serde(default)]
    pub revealed_at: Option<SystemTime>,
}

/// Audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogEntity {
    pub id: Uuid,
    pub run_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub created_at: SystemTime,
}
