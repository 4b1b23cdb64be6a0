//! Runtime model of the live simulation run.
//!
//! Every mutation here is synchronous and takes `now` explicitly; services
//! call these under the transition gate and persist the result afterwards.

use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use rand::{Rng, distr::Alphanumeric, rng};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{
        ClanEntity, KingDecisionEntity, PhaseEntity, PhaseStatus, ResultsData, RoleEntity,
        RoleStatus, SimulationEntity, SimulationStatus, VoteChoice, VoteEntity, VoteFormat,
        VoteResultEntity, VoteScope, VoteSessionEntity, VoteStatus, WinnerOverride,
    },
    state::{
        clock::{measured_minutes, planned_minutes},
        state_machine::{PhaseCursor, RunPhase},
        tally::tally,
        vote_status::{InvalidVoteTransition, VoteEvent, next_status},
    },
};

/// Length of the participant access code.
pub const ACCESS_CODE_LEN: usize = 8;

/// Domain errors raised by simulation mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("phase {0} not found")]
    PhaseNotFound(Uuid),
    #[error("role {0} not found")]
    RoleNotFound(Uuid),
    #[error("clan {0} not found")]
    ClanNotFound(Uuid),
    #[error("vote session {0} not found")]
    VoteNotFound(Uuid),
    #[error("role {voter_role_id} already voted in session {session_id}")]
    DuplicateBallot { session_id: Uuid, voter_role_id: Uuid },
    #[error("invalid ballot: {0}")]
    InvalidBallot(String),
    #[error("invalid vote setup: {0}")]
    InvalidVoteSetup(String),
    #[error("extension must be at least one minute")]
    InvalidExtension,
    #[error("cannot skip phases; phases must run in order (requested {requested}, next is {next:?})")]
    OutOfOrder { requested: Uuid, next: Option<Uuid> },
    #[error("no phase is running")]
    NoCurrentPhase,
    #[error("phase {phase_id} is {status:?}")]
    PhaseNotRunning { phase_id: Uuid, status: PhaseStatus },
    #[error("phase {0} is still running")]
    AnotherPhaseRunning(Uuid),
    #[error("simulation run is already finished")]
    RunFinished,
    #[error("role {role_id} is not eligible to vote in session {session_id}")]
    NotEligible { session_id: Uuid, role_id: Uuid },
    #[error("vote session {0} has no result yet")]
    NoResult(Uuid),
    #[error("vote session {session_id} is {actual:?}, expected {expected:?}")]
    VoteStatusMismatch {
        session_id: Uuid,
        expected: VoteStatus,
        actual: VoteStatus,
    },
    #[error("no King has been crowned yet")]
    NoKing,
    #[error("role {0} is not the King")]
    NotKing(Uuid),
    #[error("the King has not submitted decisions yet")]
    NoKingDecision,
    #[error("the King's decisions are already revealed")]
    DecisionRevealed,
    #[error("invalid decision: {0}")]
    InvalidDecision(String),
    #[error(transparent)]
    VoteStatus(#[from] InvalidVoteTransition),
}

/// What [`SimulationSession::complete`] wrapped up on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedRun {
    pub ended_phase: Option<Uuid>,
    /// Sessions that were still open and got tallied.
    pub closed_votes: Vec<Uuid>,
}

/// Result alias for simulation mutations.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Live simulation run with ordered lookups over its parts.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub status: SimulationStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub current_phase_id: Option<Uuid>,
    pub vote_1_threshold: Option<u32>,
    pub vote_2_threshold: Option<u32>,
    pub learning_objectives: Vec<String>,
    pub notes: Option<String>,
    /// Clans in display order.
    pub clans: IndexMap<Uuid, ClanEntity>,
    pub roles: IndexMap<Uuid, RoleEntity>,
    /// Phases sorted by sequence number.
    pub phases: IndexMap<Uuid, PhaseEntity>,
    pub vote_sessions: IndexMap<Uuid, VoteSessionEntity>,
    pub votes: Vec<VoteEntity>,
    pub results: IndexMap<Uuid, VoteResultEntity>,
    pub king_decision: Option<KingDecisionEntity>,
}

impl From<SimulationEntity> for SimulationSession {
    fn from(value: SimulationEntity) -> Self {
        let mut clans = value.clans;
        clans.sort_by_key(|clan| clan.sequence_number);
        let mut phases = value.phases;
        phases.sort_by_key(|phase| phase.sequence_number);

        Self {
            id: value.id,
            name: value.name,
            version: value.version,
            status: value.status,
            created_at: value.created_at,
            updated_at: value.updated_at,
            started_at: value.started_at,
            completed_at: value.completed_at,
            current_phase_id: value.current_phase_id,
            vote_1_threshold: value.vote_1_threshold,
            vote_2_threshold: value.vote_2_threshold,
            learning_objectives: value.learning_objectives,
            notes: value.notes,
            clans: clans.into_iter().map(|clan| (clan.id, clan)).collect(),
            roles: value.roles.into_iter().map(|role| (role.id, role)).collect(),
            phases: phases.into_iter().map(|phase| (phase.id, phase)).collect(),
            vote_sessions: value
                .vote_sessions
                .into_iter()
                .map(|session| (session.id, session))
                .collect(),
            votes: value.votes,
            results: value
                .vote_results
                .into_iter()
                .map(|result| (result.session_id, result))
                .collect(),
            king_decision: value.king_decision,
        }
    }
}

impl From<&SimulationSession> for SimulationEntity {
    fn from(value: &SimulationSession) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            version: value.version.clone(),
            status: value.status,
            created_at: value.created_at,
            updated_at: value.updated_at,
            started_at: value.started_at,
            completed_at: value.completed_at,
            current_phase_id: value.current_phase_id,
            vote_1_threshold: value.vote_1_threshold,
            vote_2_threshold: value.vote_2_threshold,
            learning_objectives: value.learning_objectives.clone(),
            notes: value.notes.clone(),
            clans: value.clans.values().cloned().collect(),
            roles: value.roles.values().cloned().collect(),
            phases: value.phases.values().cloned().collect(),
            vote_sessions: value.vote_sessions.values().cloned().collect(),
            votes: value.votes.clone(),
            vote_results: value.results.values().cloned().collect(),
            king_decision: value.king_decision.clone(),
        }
    }
}

/// Draw a random access code (uppercase letters and digits).
pub fn generate_access_code() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_CODE_LEN)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}

impl SimulationSession {
    /// Whether the run can no longer change phases.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            SimulationStatus::Completed | SimulationStatus::Cancelled
        )
    }

    /// Position in the run state machine implied by the stored data.
    pub fn run_phase(&self) -> RunPhase {
        if self.is_finished() {
            return RunPhase::Completed;
        }
        if let Some(phase) = self.running_phase() {
            return match phase.status {
                PhaseStatus::Paused => RunPhase::Running(PhaseCursor::Paused(phase.id)),
                _ => RunPhase::Running(PhaseCursor::Active(phase.id)),
            };
        }
        match self.current_phase_id {
            Some(id) => RunPhase::Running(PhaseCursor::Between(id)),
            None => RunPhase::Setup,
        }
    }

    /// Phase that is active or paused, if any.
    pub fn running_phase(&self) -> Option<&PhaseEntity> {
        self.phases
            .values()
            .find(|phase| matches!(phase.status, PhaseStatus::Active | PhaseStatus::Paused))
    }

    /// Phase the facilitator last started or skipped.
    pub fn current_phase(&self) -> Option<&PhaseEntity> {
        self.current_phase_id.and_then(|id| self.phases.get(&id))
    }

    /// Next pending phase after the current one, in sequence order.
    pub fn next_pending_phase(&self) -> Option<&PhaseEntity> {
        let after = self.current_phase().map(|phase| phase.sequence_number);
        self.phases.values().find(|phase| {
            phase.status == PhaseStatus::Pending
                && after.is_none_or(|sequence| phase.sequence_number > sequence)
        })
    }

    pub fn phase(&self, phase_id: Uuid) -> Result<&PhaseEntity, SimulationError> {
        self.phases
            .get(&phase_id)
            .ok_or(SimulationError::PhaseNotFound(phase_id))
    }

    pub fn role(&self, role_id: Uuid) -> Result<&RoleEntity, SimulationError> {
        self.roles
            .get(&role_id)
            .ok_or(SimulationError::RoleNotFound(role_id))
    }

    pub fn vote_session(&self, session_id: Uuid) -> Result<&VoteSessionEntity, SimulationError> {
        self.vote_sessions
            .get(&session_id)
            .ok_or(SimulationError::VoteNotFound(session_id))
    }

    /// Role holding `code`; codes compare case-insensitively.
    pub fn role_by_access_code(&self, code: &str) -> Option<&RoleEntity> {
        let code = code.trim();
        self.roles
            .values()
            .find(|role| role.access_code.eq_ignore_ascii_case(code))
    }

    pub(super) fn touch(&mut self, now: SystemTime) {
        self.updated_at = now;
    }

    fn ensure_not_finished(&self) -> SimulationResult<()> {
        if self.is_finished() {
            Err(SimulationError::RunFinished)
        } else {
            Ok(())
        }
    }

    fn running_phase_mut(&mut self) -> SimulationResult<&mut PhaseEntity> {
        self.phases
            .values_mut()
            .find(|phase| matches!(phase.status, PhaseStatus::Active | PhaseStatus::Paused))
            .ok_or(SimulationError::NoCurrentPhase)
    }

    /// Start the next pending phase.
    pub fn start_phase(&mut self, phase_id: Uuid, now: SystemTime) -> SimulationResult<&PhaseEntity> {
        self.ensure_not_finished()?;
        self.phase(phase_id)?;
        if let Some(running) = self.running_phase() {
            return Err(SimulationError::AnotherPhaseRunning(running.id));
        }
        let next = self.next_pending_phase().map(|phase| phase.id);
        if next != Some(phase_id) {
            return Err(SimulationError::OutOfOrder {
                requested: phase_id,
                next,
            });
        }

        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if matches!(
            self.status,
            SimulationStatus::Setup | SimulationStatus::Ready
        ) {
            self.status = SimulationStatus::InProgress;
        }
        self.current_phase_id = Some(phase_id);
        self.touch(now);

        let phase = self
            .phases
            .get_mut(&phase_id)
            .ok_or(SimulationError::PhaseNotFound(phase_id))?;
        phase.status = PhaseStatus::Active;
        phase.started_at = Some(now);
        phase.ended_at = None;
        phase.paused_at = None;
        phase.paused_ms = 0;
        Ok(phase)
    }

    /// Freeze the running phase clock.
    pub fn pause_phase(&mut self, now: SystemTime) -> SimulationResult<&PhaseEntity> {
        self.touch(now);
        let phase = self.running_phase_mut()?;
        if phase.status != PhaseStatus::Active {
            return Err(SimulationError::PhaseNotRunning {
                phase_id: phase.id,
                status: phase.status,
            });
        }
        phase.status = PhaseStatus::Paused;
        phase.paused_at = Some(now);
        Ok(phase)
    }

    /// Unfreeze the paused phase, excluding the pause from its clock.
    pub fn resume_phase(&mut self, now: SystemTime) -> SimulationResult<&PhaseEntity> {
        self.touch(now);
        let phase = self.running_phase_mut()?;
        if phase.status != PhaseStatus::Paused {
            return Err(SimulationError::PhaseNotRunning {
                phase_id: phase.id,
                status: phase.status,
            });
        }
        fold_pause(phase, now);
        phase.status = PhaseStatus::Active;
        Ok(phase)
    }

    /// Finish the running phase and record its measured duration.
    pub fn end_phase(&mut self, now: SystemTime) -> SimulationResult<&PhaseEntity> {
        self.touch(now);
        let phase = self.running_phase_mut()?;
        finish(phase, PhaseStatus::Completed, now);
        Ok(phase)
    }

    /// Pass over the next pending phase, or abandon the running one.
    pub fn skip_phase(&mut self, phase_id: Uuid, now: SystemTime) -> SimulationResult<&PhaseEntity> {
        self.ensure_not_finished()?;
        self.phase(phase_id)?;

        match self.running_phase().map(|phase| phase.id) {
            Some(running) if running != phase_id => {
                return Err(SimulationError::AnotherPhaseRunning(running));
            }
            Some(_) => {}
            None => {
                let next = self.next_pending_phase().map(|phase| phase.id);
                if next != Some(phase_id) {
                    return Err(SimulationError::OutOfOrder {
                        requested: phase_id,
                        next,
                    });
                }
            }
        }

        self.current_phase_id = Some(phase_id);
        self.touch(now);
        let phase = self
            .phases
            .get_mut(&phase_id)
            .ok_or(SimulationError::PhaseNotFound(phase_id))?;
        if phase.started_at.is_some() {
            finish(phase, PhaseStatus::Skipped, now);
        } else {
            phase.status = PhaseStatus::Skipped;
        }
        Ok(phase)
    }

    /// Add minutes to the running phase's plan.
    pub fn extend_phase(&mut self, minutes: u32, now: SystemTime) -> SimulationResult<&PhaseEntity> {
        if minutes == 0 {
            return Err(SimulationError::InvalidExtension);
        }
        self.touch(now);
        let phase = self.running_phase_mut()?;
        phase.actual_duration_minutes = Some(planned_minutes(phase).saturating_add(minutes));
        Ok(phase)
    }

    /// Close the run, ending whatever phase is still running and tallying open votes.
    pub fn complete(&mut self, now: SystemTime) -> SimulationResult<CompletedRun> {
        self.ensure_not_finished()?;
        let ended_phase = match self.running_phase_mut() {
            Ok(phase) => {
                finish(phase, PhaseStatus::Completed, now);
                Some(phase.id)
            }
            Err(_) => None,
        };
        let open: Vec<Uuid> = self
            .vote_sessions
            .values()
            .filter(|session| session.status == VoteStatus::Open)
            .map(|session| session.id)
            .collect();
        for session_id in &open {
            self.close_vote(*session_id, now)?;
        }

        self.status = SimulationStatus::Completed;
        self.completed_at = Some(now);
        self.touch(now);
        Ok(CompletedRun {
            ended_phase,
            closed_votes: open,
        })
    }

    /// Hand a role to a participant and issue a fresh access code.
    pub fn assign_role(
        &mut self,
        role_id: Uuid,
        participant: Option<String>,
        now: SystemTime,
    ) -> SimulationResult<&RoleEntity> {
        self.role(role_id)?;
        let code = self.fresh_access_code();
        self.touch(now);
        let role = self
            .roles
            .get_mut(&role_id)
            .ok_or(SimulationError::RoleNotFound(role_id))?;
        role.assigned_participant = participant;
        role.access_code = code;
        Ok(role)
    }

    /// Access code not held by any role of this run.
    pub fn fresh_access_code(&self) -> String {
        loop {
            let code = generate_access_code();
            if self.role_by_access_code(&code).is_none() {
                return code;
            }
        }
    }

    /// Active roles allowed to vote in `session`.
    pub fn eligible_voters<'a>(
        &'a self,
        session: &'a VoteSessionEntity,
    ) -> impl Iterator<Item = &'a RoleEntity> + 'a {
        self.roles.values().filter(move |role| {
            role.status == RoleStatus::Active
                && match session.scope {
                    VoteScope::All => true,
                    VoteScope::ClanOnly => session.scope_clan_id == Some(role.clan_id),
                }
        })
    }

    /// Ballots cast in `session_id`, oldest first.
    pub fn ballots(&self, session_id: Uuid) -> Vec<&VoteEntity> {
        self.votes
            .iter()
            .filter(|vote| vote.session_id == session_id)
            .collect()
    }

    pub fn has_voted(&self, session_id: Uuid, role_id: Uuid) -> bool {
        self.votes
            .iter()
            .any(|vote| vote.session_id == session_id && vote.voter_role_id == role_id)
    }

    /// Register a vote session after checking its references.
    pub fn open_vote(&mut self, session: VoteSessionEntity) -> SimulationResult<&VoteSessionEntity> {
        if let Some(phase_id) = session.phase_id {
            self.phase(phase_id)?;
        }
        match (session.scope, session.scope_clan_id) {
            (VoteScope::ClanOnly, None) => {
                return Err(SimulationError::InvalidVoteSetup(
                    "clan-only votes need a clan".into(),
                ));
            }
            (_, Some(clan_id)) if !self.clans.contains_key(&clan_id) => {
                return Err(SimulationError::ClanNotFound(clan_id));
            }
            _ => {}
        }
        if session.vote_format == VoteFormat::ChoosePerson {
            if session.eligible_candidates.is_empty() {
                return Err(SimulationError::InvalidVoteSetup(
                    "choose-person votes need at least one candidate".into(),
                ));
            }
            for candidate in &session.eligible_candidates {
                self.role(*candidate)?;
            }
        }

        self.touch(session.created_at);
        let id = session.id;
        self.vote_sessions.insert(id, session);
        self.vote_session(id)
    }

    /// Record a ballot for `voter_role_id`.
    pub fn cast_vote(
        &mut self,
        session_id: Uuid,
        voter_role_id: Uuid,
        choice: VoteChoice,
        on_behalf: Option<String>,
        now: SystemTime,
    ) -> SimulationResult<&VoteEntity> {
        self.ensure_not_finished()?;
        let session = self.vote_session(session_id)?;
        if session.status != VoteStatus::Open {
            return Err(SimulationError::VoteStatusMismatch {
                session_id,
                expected: VoteStatus::Open,
                actual: session.status,
            });
        }
        let voter = self.role(voter_role_id)?;
        if !self
            .eligible_voters(session)
            .any(|role| role.id == voter_role_id)
        {
            return Err(SimulationError::NotEligible {
                session_id,
                role_id: voter_role_id,
            });
        }
        match (session.vote_format, choice) {
            (VoteFormat::ChoosePerson, VoteChoice::Person { role_id }) => {
                if !session.eligible_candidates.contains(&role_id) {
                    return Err(SimulationError::InvalidBallot(format!(
                        "role {role_id} is not a candidate"
                    )));
                }
            }
            (VoteFormat::YesNo, VoteChoice::YesNo { .. }) => {}
            (format, _) => {
                return Err(SimulationError::InvalidBallot(format!(
                    "ballot does not match {format:?} session"
                )));
            }
        }
        if self.has_voted(session_id, voter_role_id) {
            return Err(SimulationError::DuplicateBallot {
                session_id,
                voter_role_id,
            });
        }

        let vote = VoteEntity {
            id: Uuid::new_v4(),
            session_id,
            voter_role_id,
            voter_clan_id: voter.clan_id,
            choice,
            cast_at: now,
            on_behalf,
        };
        self.touch(now);
        self.votes.push(vote);
        let index = self.votes.len() - 1;
        Ok(&self.votes[index])
    }

    /// Stop accepting ballots and tally the session.
    pub fn close_vote(&mut self, session_id: Uuid, now: SystemTime) -> SimulationResult<&VoteResultEntity> {
        let session = self
            .vote_sessions
            .get_mut(&session_id)
            .ok_or(SimulationError::VoteNotFound(session_id))?;
        session.status = next_status(session.status, VoteEvent::Close)?;
        session.closed_at = Some(now);
        self.store_tally(session_id, now)
    }

    /// Tally a closed session again, keeping any override.
    pub fn recalculate_vote(
        &mut self,
        session_id: Uuid,
        now: SystemTime,
    ) -> SimulationResult<&VoteResultEntity> {
        let session = self.vote_session(session_id)?;
        if session.status != VoteStatus::Closed {
            return Err(SimulationError::VoteStatusMismatch {
                session_id,
                expected: VoteStatus::Closed,
                actual: session.status,
            });
        }
        self.store_tally(session_id, now)
    }

    fn store_tally(&mut self, session_id: Uuid, now: SystemTime) -> SimulationResult<&VoteResultEntity> {
        let session = self.vote_session(session_id)?;
        let results = tally(session, &self.ballots(session_id), &self.roles);
        let (winner_override, confirmed_runoff_candidates) = self
            .results
            .get(&session_id)
            .map(|existing| {
                (
                    existing.winner_override.clone(),
                    existing.confirmed_runoff_candidates.clone(),
                )
            })
            .unwrap_or_default();

        self.touch(now);
        self.results.insert(
            session_id,
            VoteResultEntity {
                session_id,
                results,
                calculated_at: now,
                announced_at: None,
                winner_override,
                confirmed_runoff_candidates,
            },
        );
        self.results
            .get(&session_id)
            .ok_or(SimulationError::NoResult(session_id))
    }

    /// Reveal the result of a closed session.
    pub fn announce_vote(&mut self, session_id: Uuid, now: SystemTime) -> SimulationResult<&VoteResultEntity> {
        if !self.results.contains_key(&session_id) {
            self.vote_session(session_id)?;
            return Err(SimulationError::NoResult(session_id));
        }
        let session = self
            .vote_sessions
            .get_mut(&session_id)
            .ok_or(SimulationError::VoteNotFound(session_id))?;
        session.status = next_status(session.status, VoteEvent::Announce)?;
        session.announced_at = Some(now);
        self.touch(now);

        let result = self
            .results
            .get_mut(&session_id)
            .ok_or(SimulationError::NoResult(session_id))?;
        result.announced_at = Some(now);
        Ok(result)
    }

    /// Replace the computed winner; `None` clears the winner.
    pub fn override_winner(
        &mut self,
        session_id: Uuid,
        winner_role_id: Option<Uuid>,
        reason: String,
        now: SystemTime,
    ) -> SimulationResult<&VoteResultEntity> {
        self.vote_session(session_id)?;
        if !self.results.contains_key(&session_id) {
            return Err(SimulationError::NoResult(session_id));
        }
        let winner_name = match winner_role_id {
            Some(role_id) => Some(self.role(role_id)?.name.clone()),
            None => None,
        };
        self.touch(now);

        let result = self
            .results
            .get_mut(&session_id)
            .ok_or(SimulationError::NoResult(session_id))?;
        result.winner_override = Some(WinnerOverride {
            winner_role_id,
            winner_name,
            reason,
            overridden_at: now,
        });
        Ok(result)
    }

    /// Fix the candidate list carried into the next election round.
    pub fn confirm_runoff(
        &mut self,
        session_id: Uuid,
        candidates: Vec<Uuid>,
        now: SystemTime,
    ) -> SimulationResult<&VoteResultEntity> {
        self.vote_session(session_id)?;
        let result = self
            .results
            .get(&session_id)
            .ok_or(SimulationError::NoResult(session_id))?;
        let ResultsData::ChoosePerson(person) = &result.results else {
            return Err(SimulationError::InvalidVoteSetup(
                "runoff candidates only apply to person votes".to_string(),
            ));
        };

        let mut confirmed = Vec::with_capacity(candidates.len());
        for role_id in candidates {
            if confirmed.contains(&role_id) {
                continue;
            }
            if !person.all_candidates.iter().any(|tally| tally.role_id == role_id) {
                return Err(SimulationError::InvalidVoteSetup(format!(
                    "role {role_id} received no votes in session {session_id}"
                )));
            }
            confirmed.push(role_id);
        }
        if confirmed.is_empty() {
            return Err(SimulationError::InvalidVoteSetup(
                "runoff needs at least one candidate".to_string(),
            ));
        }
        self.touch(now);

        let result = self
            .results
            .get_mut(&session_id)
            .ok_or(SimulationError::NoResult(session_id))?;
        result.confirmed_runoff_candidates = confirmed;
        Ok(result)
    }

    /// Most recently confirmed runoff list, in session order.
    pub fn last_confirmed_runoff(&self) -> Option<&[Uuid]> {
        self.vote_sessions
            .keys()
            .rev()
            .filter_map(|id| self.results.get(id))
            .map(|result| result.confirmed_runoff_candidates.as_slice())
            .find(|candidates| !candidates.is_empty())
    }
}

fn fold_pause(phase: &mut PhaseEntity, now: SystemTime) {
    if let Some(paused_at) = phase.paused_at.take() {
        let span = now.duration_since(paused_at).unwrap_or(Duration::ZERO);
        phase.paused_ms = phase
            .paused_ms
            .saturating_add(u64::try_from(span.as_millis()).unwrap_or(u64::MAX));
    }
}

fn finish(phase: &mut PhaseEntity, status: PhaseStatus, now: SystemTime) {
    fold_pause(phase, now);
    phase.status = status;
    phase.ended_at = Some(now);
    if let Some(started_at) = phase.started_at {
        phase.actual_duration_minutes = Some(measured_minutes(started_at, now));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dao::models::{
        AnimationSpeed, ParticipantType, RevealTiming, TransparencyLevel, VoteType,
        YesNoChoice,
    };

    pub(crate) fn sample_simulation() -> SimulationSession {
        let now = SystemTime::now();
        let clan_ids = [Uuid::new_v4(), Uuid::new_v4()];
        let clans = clan_ids
            .iter()
            .enumerate()
            .map(|(index, id)| ClanEntity {
                id: *id,
                name: format!("Clan {index}"),
                sequence_number: index as u32,
                about: None,
                key_priorities: None,
                color_hex: None,
                emblem_url: None,
            })
            .collect();
        let roles = ["Aria", "Bran", "Cato", "Dax"]
            .iter()
            .enumerate()
            .map(|(index, name)| RoleEntity {
                id: Uuid::new_v4(),
                clan_id: clan_ids[index % 2],
                name: (*name).to_string(),
                position: None,
                background: None,
                participant_type: ParticipantType::Human,
                assigned_participant: None,
                access_code: format!("CODE000{index}"),
                avatar_url: None,
                status: RoleStatus::Active,
            })
            .collect();
        let phases = ["Induction", "Councils", "Vote"]
            .iter()
            .enumerate()
            .map(|(index, name)| PhaseEntity {
                id: Uuid::new_v4(),
                sequence_number: index as u32,
                name: (*name).to_string(),
                description: None,
                default_duration_minutes: 10,
                actual_duration_minutes: None,
                started_at: None,
                ended_at: None,
                paused_at: None,
                paused_ms: 0,
                status: PhaseStatus::Pending,
            })
            .collect();

        SimulationEntity {
            id: Uuid::new_v4(),
            name: "Test run".into(),
            version: "KING".into(),
            status: SimulationStatus::Setup,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            current_phase_id: None,
            vote_1_threshold: None,
            vote_2_threshold: None,
            learning_objectives: Vec::new(),
            notes: None,
            clans,
            roles,
            phases,
            vote_sessions: Vec::new(),
            votes: Vec::new(),
            vote_results: Vec::new(),
            king_decision: None,
        }
        .into()
    }

    fn phase_ids(sim: &SimulationSession) -> Vec<Uuid> {
        sim.phases.keys().copied().collect()
    }

    pub(crate) fn role_ids(sim: &SimulationSession) -> Vec<Uuid> {
        sim.roles.keys().copied().collect()
    }

    pub(crate) fn person_vote(sim: &SimulationSession, scope: VoteScope) -> VoteSessionEntity {
        VoteSessionEntity {
            id: Uuid::new_v4(),
            phase_id: None,
            template_id: "custom_election".into(),
            vote_type: VoteType::FacilitatorProposal,
            vote_format: VoteFormat::ChoosePerson,
            scope,
            scope_clan_id: None,
            eligible_candidates: role_ids(sim)[..2].to_vec(),
            proposal_title: None,
            proposal_description: None,
            transparency_level: TransparencyLevel::Anonymous,
            reveal_timing: RevealTiming::FacilitatorManual,
            animation_speed: AnimationSpeed::Normal,
            allow_skip_animation: true,
            threshold: None,
            time_limit_minutes: 8,
            status: VoteStatus::Open,
            created_at: SystemTime::now(),
            closed_at: None,
            announced_at: None,
        }
    }

    #[test]
    fn first_start_marks_run_in_progress() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        let now = SystemTime::now();

        sim.start_phase(ids[0], now).unwrap();
        assert_eq!(sim.status, SimulationStatus::InProgress);
        assert_eq!(sim.started_at, Some(now));
        assert_eq!(sim.current_phase_id, Some(ids[0]));
        assert_eq!(sim.run_phase(), RunPhase::Running(PhaseCursor::Active(ids[0])));
    }

    #[test]
    fn phases_must_run_in_order() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        let err = sim.start_phase(ids[1], SystemTime::now()).unwrap_err();
        assert_eq!(
            err,
            SimulationError::OutOfOrder {
                requested: ids[1],
                next: Some(ids[0])
            }
        );
    }

    #[test]
    fn only_one_phase_runs_at_a_time() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        sim.start_phase(ids[0], SystemTime::now()).unwrap();
        let err = sim.start_phase(ids[1], SystemTime::now()).unwrap_err();
        assert_eq!(err, SimulationError::AnotherPhaseRunning(ids[0]));
    }

    #[test]
    fn pause_time_is_accumulated() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        let start = SystemTime::now();
        sim.start_phase(ids[0], start).unwrap();
        sim.pause_phase(start + Duration::from_secs(60)).unwrap();
        assert!(sim.pause_phase(start + Duration::from_secs(61)).is_err());
        let phase = sim.resume_phase(start + Duration::from_secs(90)).unwrap();
        assert_eq!(phase.paused_ms, 30_000);
        assert_eq!(phase.status, PhaseStatus::Active);
        assert!(phase.paused_at.is_none());
    }

    #[test]
    fn ending_records_measured_minutes() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        let start = SystemTime::now();
        sim.start_phase(ids[0], start).unwrap();
        sim.extend_phase(5, start).unwrap();
        assert_eq!(sim.phases[&ids[0]].actual_duration_minutes, Some(15));

        let phase = sim.end_phase(start + Duration::from_secs(125)).unwrap();
        assert_eq!(phase.status, PhaseStatus::Completed);
        assert_eq!(phase.actual_duration_minutes, Some(3));
        assert_eq!(sim.run_phase(), RunPhase::Running(PhaseCursor::Between(ids[0])));
        assert_eq!(sim.next_pending_phase().map(|phase| phase.id), Some(ids[1]));
    }

    #[test]
    fn extension_needs_positive_minutes_and_a_running_phase() {
        let mut sim = sample_simulation();
        assert_eq!(
            sim.extend_phase(0, SystemTime::now()).unwrap_err(),
            SimulationError::InvalidExtension
        );
        assert_eq!(
            sim.extend_phase(3, SystemTime::now()).unwrap_err(),
            SimulationError::NoCurrentPhase
        );
    }

    #[test]
    fn skip_moves_past_pending_phase() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        sim.skip_phase(ids[0], SystemTime::now()).unwrap();
        assert_eq!(sim.phases[&ids[0]].status, PhaseStatus::Skipped);
        assert_eq!(sim.next_pending_phase().map(|phase| phase.id), Some(ids[1]));
        assert!(sim.skip_phase(ids[2], SystemTime::now()).is_err());
    }

    #[test]
    fn skip_running_phase_ends_it() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        sim.start_phase(ids[0], SystemTime::now()).unwrap();
        assert_eq!(
            sim.skip_phase(ids[1], SystemTime::now()).unwrap_err(),
            SimulationError::AnotherPhaseRunning(ids[0])
        );
        let phase = sim.skip_phase(ids[0], SystemTime::now()).unwrap();
        assert_eq!(phase.status, PhaseStatus::Skipped);
        assert!(phase.ended_at.is_some());
    }

    #[test]
    fn complete_ends_running_phase() {
        let mut sim = sample_simulation();
        let ids = phase_ids(&sim);
        sim.start_phase(ids[0], SystemTime::now()).unwrap();
        assert_eq!(sim.complete(SystemTime::now()).unwrap().ended_phase, Some(ids[0]));
        assert_eq!(sim.status, SimulationStatus::Completed);
        assert_eq!(sim.run_phase(), RunPhase::Completed);
        assert_eq!(sim.complete(SystemTime::now()).unwrap_err(), SimulationError::RunFinished);
        assert_eq!(
            sim.start_phase(ids[1], SystemTime::now()).unwrap_err(),
            SimulationError::RunFinished
        );
    }

    #[test]
    fn completed_run_refuses_ballots() {
        let mut sim = sample_simulation();
        let session = person_vote(&sim, VoteScope::All);
        let session_id = session.id;
        let roles = role_ids(&sim);
        sim.open_vote(session).unwrap();
        sim.complete(SystemTime::now()).unwrap();

        let pick = VoteChoice::Person { role_id: roles[0] };
        assert_eq!(
            sim.cast_vote(session_id, roles[2], pick, None, SystemTime::now())
                .unwrap_err(),
            SimulationError::RunFinished
        );
        assert!(sim.ballots(session_id).is_empty());
    }

    #[test]
    fn completing_tallies_open_votes() {
        let mut sim = sample_simulation();
        let session = person_vote(&sim, VoteScope::All);
        let session_id = session.id;
        let roles = role_ids(&sim);
        sim.open_vote(session).unwrap();
        sim.cast_vote(
            session_id,
            roles[2],
            VoteChoice::Person { role_id: roles[1] },
            None,
            SystemTime::now(),
        )
        .unwrap();

        let completed = sim.complete(SystemTime::now()).unwrap();
        assert_eq!(completed.closed_votes, vec![session_id]);
        assert_eq!(sim.vote_sessions[&session_id].status, VoteStatus::Closed);
        assert_eq!(sim.results[&session_id].winner_role_id(), Some(roles[1]));

        // Nothing is left open, and the closed result can still be announced.
        assert!(matches!(
            sim.close_vote(session_id, SystemTime::now()),
            Err(SimulationError::VoteStatus(_))
        ));
        sim.announce_vote(session_id, SystemTime::now()).unwrap();
        assert_eq!(sim.vote_sessions[&session_id].status, VoteStatus::Announced);
    }

    #[test]
    fn runoff_confirmation_keeps_voted_candidates() {
        let mut sim = sample_simulation();
        let session = person_vote(&sim, VoteScope::All);
        let session_id = session.id;
        let roles = role_ids(&sim);
        sim.open_vote(session).unwrap();
        for (voter, candidate) in [(roles[2], roles[0]), (roles[3], roles[1])] {
            sim.cast_vote(
                session_id,
                voter,
                VoteChoice::Person { role_id: candidate },
                None,
                SystemTime::now(),
            )
            .unwrap();
        }
        assert!(matches!(
            sim.confirm_runoff(session_id, vec![roles[0]], SystemTime::now()),
            Err(SimulationError::NoResult(_))
        ));
        sim.close_vote(session_id, SystemTime::now()).unwrap();
        assert_eq!(sim.last_confirmed_runoff(), None);

        assert!(matches!(
            sim.confirm_runoff(session_id, vec![roles[0], roles[2]], SystemTime::now()),
            Err(SimulationError::InvalidVoteSetup(_))
        ));
        assert!(matches!(
            sim.confirm_runoff(session_id, Vec::new(), SystemTime::now()),
            Err(SimulationError::InvalidVoteSetup(_))
        ));

        let result = sim
            .confirm_runoff(session_id, vec![roles[1], roles[0], roles[1]], SystemTime::now())
            .unwrap();
        assert_eq!(result.confirmed_runoff_candidates, vec![roles[1], roles[0]]);
        assert_eq!(sim.last_confirmed_runoff(), Some(&[roles[1], roles[0]][..]));

        // A recount keeps the confirmed list.
        sim.recalculate_vote(session_id, SystemTime::now()).unwrap();
        assert_eq!(
            sim.results[&session_id].confirmed_runoff_candidates,
            vec![roles[1], roles[0]]
        );
    }

    #[test]
    fn reassignment_issues_new_code() {
        let mut sim = sample_simulation();
        let role_id = role_ids(&sim)[0];
        let old = sim.roles[&role_id].access_code.clone();
        let role = sim
            .assign_role(role_id, Some("Maya".into()), SystemTime::now())
            .unwrap();
        assert_ne!(role.access_code, old);
        assert_eq!(role.access_code.len(), ACCESS_CODE_LEN);
        assert!(
            role.access_code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
        let code = role.access_code.to_ascii_lowercase();
        assert_eq!(sim.role_by_access_code(&code).map(|role| role.id), Some(role_id));
    }

    #[test]
    fn clan_only_vote_requires_clan() {
        let mut sim = sample_simulation();
        let session = person_vote(&sim, VoteScope::ClanOnly);
        assert!(matches!(
            sim.open_vote(session).unwrap_err(),
            SimulationError::InvalidVoteSetup(_)
        ));
    }

    #[test]
    fn one_ballot_per_voter_and_only_while_open() {
        let mut sim = sample_simulation();
        let session = person_vote(&sim, VoteScope::All);
        let session_id = session.id;
        let roles = role_ids(&sim);
        sim.open_vote(session).unwrap();

        let pick = VoteChoice::Person { role_id: roles[0] };
        sim.cast_vote(session_id, roles[2], pick, None, SystemTime::now())
            .unwrap();
        assert!(matches!(
            sim.cast_vote(session_id, roles[2], pick, None, SystemTime::now()),
            Err(SimulationError::DuplicateBallot { .. })
        ));
        assert!(matches!(
            sim.cast_vote(
                session_id,
                roles[3],
                VoteChoice::Person { role_id: roles[3] },
                None,
                SystemTime::now()
            ),
            Err(SimulationError::InvalidBallot(_))
        ));
        assert!(matches!(
            sim.cast_vote(
                session_id,
                roles[3],
                VoteChoice::YesNo {
                    choice: YesNoChoice::Yes
                },
                None,
                SystemTime::now()
            ),
            Err(SimulationError::InvalidBallot(_))
        ));

        let result = sim.close_vote(session_id, SystemTime::now()).unwrap();
        let ResultsData::ChoosePerson(person) = &result.results else {
            panic!("expected person results");
        };
        assert_eq!(person.winner.as_ref().map(|w| w.role_id), Some(roles[0]));

        assert!(matches!(
            sim.cast_vote(session_id, roles[3], pick, None, SystemTime::now()),
            Err(SimulationError::VoteStatusMismatch { .. })
        ));
        assert!(matches!(
            sim.close_vote(session_id, SystemTime::now()),
            Err(SimulationError::VoteStatus(_))
        ));
    }

    #[test]
    fn clan_scope_limits_voters() {
        let mut sim = sample_simulation();
        let clan_id = *sim.clans.keys().next().unwrap();
        let mut session = person_vote(&sim, VoteScope::ClanOnly);
        session.scope_clan_id = Some(clan_id);
        let session_id = session.id;
        sim.open_vote(session).unwrap();

        let outsider = sim
            .roles
            .values()
            .find(|role| role.clan_id != clan_id)
            .unwrap()
            .id;
        let candidate = sim.vote_sessions[&session_id].eligible_candidates[0];
        assert!(matches!(
            sim.cast_vote(
                session_id,
                outsider,
                VoteChoice::Person { role_id: candidate },
                None,
                SystemTime::now()
            ),
            Err(SimulationError::NotEligible { .. })
        ));
        assert_eq!(sim.eligible_voters(&sim.vote_sessions[&session_id]).count(), 2);
    }

    #[test]
    fn announce_requires_close_and_override_requires_result() {
        let mut sim = sample_simulation();
        let session = person_vote(&sim, VoteScope::All);
        let session_id = session.id;
        let roles = role_ids(&sim);
        sim.open_vote(session).unwrap();

        assert_eq!(
            sim.announce_vote(session_id, SystemTime::now()).unwrap_err(),
            SimulationError::NoResult(session_id)
        );
        assert_eq!(
            sim.override_winner(session_id, Some(roles[1]), "tie".into(), SystemTime::now())
                .unwrap_err(),
            SimulationError::NoResult(session_id)
        );

        sim.close_vote(session_id, SystemTime::now()).unwrap();
        let result = sim
            .override_winner(session_id, Some(roles[1]), "tie".into(), SystemTime::now())
            .unwrap();
        assert_eq!(
            result.winner_override.as_ref().and_then(|o| o.winner_name.clone()),
            Some("Bran".into())
        );

        let recalculated = sim.recalculate_vote(session_id, SystemTime::now()).unwrap();
        assert!(recalculated.winner_override.is_some());

        let announced = sim.announce_vote(session_id, SystemTime::now()).unwrap();
        assert!(announced.announced_at.is_some());
        assert_eq!(sim.vote_sessions[&session_id].status, VoteStatus::Announced);
        assert!(sim.recalculate_vote(session_id, SystemTime::now()).is_err());
    }

    #[test]
    fn entity_round_trip_keeps_phase_order() {
        let sim = sample_simulation();
        let entity = SimulationEntity::from(&sim);
        let back = SimulationSession::from(entity);
        assert_eq!(
            back.phases.keys().collect::<Vec<_>>(),
            sim.phases.keys().collect::<Vec<_>>()
        );
    }
}
