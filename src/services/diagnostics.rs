//! Integrity checks over stored runs, shared by the facilitator route and
//! the `sim-doctor` binary.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PhaseStatus, ResultsData, SimulationEntity, VoteStatus},
        sim_store::SimStore,
    },
    dto::diagnostics::{DiagnosticIssue, DiagnosticsReport, IssueKind},
    error::ServiceError,
    state::SharedState,
};

/// Scan every run held by `store`.
pub async fn scan_store(store: &dyn SimStore) -> Result<DiagnosticsReport, ServiceError> {
    let simulations = store.list_simulations().await?;
    let issues: Vec<DiagnosticIssue> = simulations.iter().flat_map(scan_simulation).collect();

    if issues.is_empty() {
        info!(runs = simulations.len(), "diagnostics found no issue");
    } else {
        warn!(runs = simulations.len(), issues = issues.len(), "diagnostics found issues");
    }
    Ok(DiagnosticsReport::new(simulations.len(), issues))
}

/// Scan the runs of the installed store.
pub async fn run(state: &SharedState) -> Result<DiagnosticsReport, ServiceError> {
    let store = state.require_sim_store().await?;
    scan_store(store.as_ref()).await
}

/// Every integrity problem of one stored run.
pub fn scan_simulation(sim: &SimulationEntity) -> Vec<DiagnosticIssue> {
    let mut issues = Vec::new();
    let mut report = |kind: IssueKind, detail: String| {
        issues.push(DiagnosticIssue {
            simulation_id: sim.id,
            kind,
            detail,
        })
    };

    let role_ids: HashSet<Uuid> = sim.roles.iter().map(|role| role.id).collect();
    let clan_ids: HashSet<Uuid> = sim.clans.iter().map(|clan| clan.id).collect();
    let session_ids: HashSet<Uuid> = sim.vote_sessions.iter().map(|s| s.id).collect();

    let running: Vec<_> = sim
        .phases
        .iter()
        .filter(|phase| matches!(phase.status, PhaseStatus::Active | PhaseStatus::Paused))
        .map(|phase| phase.name.as_str())
        .collect();
    if running.len() > 1 {
        report(
            IssueKind::SeveralRunningPhases,
            format!("running phases: {}", running.join(", ")),
        );
    }

    if let Some(current) = sim.current_phase_id {
        if !sim.phases.iter().any(|phase| phase.id == current) {
            report(
                IssueKind::DanglingCurrentPhase,
                format!("current phase {current} does not exist"),
            );
        }
    }

    let mut codes: HashMap<String, &str> = HashMap::new();
    for role in &sim.roles {
        if !clan_ids.contains(&role.clan_id) {
            report(
                IssueKind::RoleWithoutClan,
                format!("role {} points at missing clan {}", role.name, role.clan_id),
            );
        }
        if let Some(other) = codes.insert(role.access_code.to_ascii_uppercase(), &role.name) {
            report(
                IssueKind::DuplicateAccessCode,
                format!("roles {other} and {} share an access code", role.name),
            );
        }
    }

    for session in &sim.vote_sessions {
        for candidate in &session.eligible_candidates {
            if !role_ids.contains(candidate) {
                report(
                    IssueKind::DanglingCandidate,
                    format!("session {} lists unknown candidate {candidate}", session.id),
                );
            }
        }
        let has_result = sim.vote_results.iter().any(|r| r.session_id == session.id);
        if session.status != VoteStatus::Open && !has_result {
            report(
                IssueKind::MissingResult,
                format!("session {} is {:?} without a result", session.id, session.status),
            );
        }
    }

    let mut voters: HashSet<(Uuid, Uuid)> = HashSet::new();
    for vote in &sim.votes {
        if !session_ids.contains(&vote.session_id) || !role_ids.contains(&vote.voter_role_id) {
            report(
                IssueKind::OrphanBallot,
                format!("ballot {} references a missing session or voter", vote.id),
            );
        }
        if !voters.insert((vote.session_id, vote.voter_role_id)) {
            report(
                IssueKind::DuplicateBallot,
                format!(
                    "role {} voted twice in session {}",
                    vote.voter_role_id, vote.session_id
                ),
            );
        }
    }

    for result in &sim.vote_results {
        if !session_ids.contains(&result.session_id) {
            report(
                IssueKind::OrphanResult,
                format!("result for missing session {}", result.session_id),
            );
        }
        let tallied = match &result.results {
            ResultsData::ChoosePerson(person) => person.winner.as_ref().map(|w| w.role_id),
            ResultsData::YesNo(_) => None,
        };
        let overridden = result
            .winner_override
            .as_ref()
            .and_then(|o| o.winner_role_id);
        for winner in tallied.into_iter().chain(overridden) {
            if !role_ids.contains(&winner) {
                report(
                    IssueKind::DanglingWinner,
                    format!("session {} names unknown winner {winner}", result.session_id),
                );
            }
        }
    }

    issues
}
