use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PhaseEntity, PhaseStatus, SimulationStatus},
    dto::format_system_time,
    state::{
        clock::{PhaseClock, TimerUrgency, planned_minutes},
        state_machine::{PhaseCursor, RunPhase},
    },
};

/// Run position exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleRunPhase {
    /// No simulation loaded.
    Idle,
    /// Loaded, nothing started yet.
    Setup,
    /// A phase clock is running.
    Active,
    /// A phase clock is frozen.
    Paused,
    /// Waiting for the facilitator to start the next phase.
    Between,
    /// The run is over.
    Completed,
}

impl From<&RunPhase> for VisibleRunPhase {
    fn from(value: &RunPhase) -> Self {
        match value {
            RunPhase::Idle => VisibleRunPhase::Idle,
            RunPhase::Setup => VisibleRunPhase::Setup,
            RunPhase::Running(PhaseCursor::Active(_)) => VisibleRunPhase::Active,
            RunPhase::Running(PhaseCursor::Paused(_)) => VisibleRunPhase::Paused,
            RunPhase::Running(PhaseCursor::Between(_)) => VisibleRunPhase::Between,
            RunPhase::Completed => VisibleRunPhase::Completed,
        }
    }
}

/// Countdown of a started phase.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct PhaseClockDto {
    pub planned_minutes: u32,
    pub elapsed_seconds: i64,
    /// Negative in overtime.
    pub remaining_seconds: i64,
    pub overtime: bool,
    pub paused: bool,
    /// `M:SS`, with a leading `+` in overtime.
    pub display: String,
    pub urgency: TimerUrgency,
}

impl From<PhaseClock> for PhaseClockDto {
    fn from(clock: PhaseClock) -> Self {
        Self {
            planned_minutes: clock.planned_minutes,
            elapsed_seconds: clock.elapsed_seconds,
            remaining_seconds: clock.remaining_seconds,
            overtime: clock.overtime,
            paused: clock.paused,
            display: clock.display,
            urgency: clock.urgency,
        }
    }
}

/// Phase as listed in the timeline.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PhaseSummary {
    pub id: Uuid,
    pub sequence_number: u32,
    pub name: String,
    pub description: Option<String>,
    pub status: PhaseStatus,
    pub default_duration_minutes: u32,
    pub planned_minutes: u32,
    pub actual_duration_minutes: Option<u32>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

impl From<&PhaseEntity> for PhaseSummary {
    fn from(phase: &PhaseEntity) -> Self {
        Self {
            id: phase.id,
            sequence_number: phase.sequence_number,
            name: phase.name.clone(),
            description: phase.description.clone(),
            status: phase.status,
            default_duration_minutes: phase.default_duration_minutes,
            planned_minutes: planned_minutes(phase),
            actual_duration_minutes: phase.actual_duration_minutes,
            started_at: phase.started_at.map(format_system_time),
            ended_at: phase.ended_at.map(format_system_time),
        }
    }
}

/// Shared snapshot of where the run stands, with the live clock.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PhaseSnapshot {
    pub phase: VisibleRunPhase,
    pub simulation_id: Option<Uuid>,
    pub simulation_name: Option<String>,
    pub run_status: Option<SimulationStatus>,
    /// True when the backend operates without storage.
    pub degraded: bool,
    /// Phase last started or skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<PhaseSummary>,
    /// Present once the current phase has started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<PhaseClockDto>,
    /// Phase the facilitator may start next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_phase: Option<PhaseSummary>,
}

/// Ordered list of the run's phases.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseTimeline {
    pub simulation_id: Uuid,
    pub phases: Vec<PhaseSummary>,
    pub total_planned_minutes: u32,
}

/// Minutes to add to the running phase.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ExtendPhaseRequest {
    #[validate(range(min = 1, max = 240))]
    pub minutes: u32,
}
