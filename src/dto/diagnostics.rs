use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Category of an integrity problem found in a stored run.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// More than one phase is active or paused.
    SeveralRunningPhases,
    /// `current_phase_id` points at no phase.
    DanglingCurrentPhase,
    /// A role belongs to a clan that does not exist.
    RoleWithoutClan,
    /// Two roles share an access code.
    DuplicateAccessCode,
    /// A vote session lists a candidate that is not a role.
    DanglingCandidate,
    /// A ballot references a missing session or role.
    OrphanBallot,
    /// A voter has more than one ballot in a session.
    DuplicateBallot,
    /// A result exists for a session that does not.
    OrphanResult,
    /// A result names a winner that is not a role.
    DanglingWinner,
    /// A closed or announced session has no result.
    MissingResult,
}

/// One problem found by the diagnostics.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct DiagnosticIssue {
    pub simulation_id: Uuid,
    pub kind: IssueKind,
    pub detail: String,
}

/// Outcome of an integrity scan.
#[derive(Debug, Serialize, ToSchema)]
pub struct DiagnosticsReport {
    pub checked_runs: usize,
    pub healthy: bool,
    pub issues: Vec<DiagnosticIssue>,
}

impl DiagnosticsReport {
    pub fn new(checked_runs: usize, issues: Vec<DiagnosticIssue>) -> Self {
        Self {
            checked_runs,
            healthy: issues.is_empty(),
            issues,
        }
    }
}
