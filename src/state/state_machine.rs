use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// High-level status of the live simulation slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// No simulation is loaded.
    Idle,
    /// A simulation is loaded and no phase has started yet.
    Setup,
    /// At least one phase has started or been skipped.
    Running(PhaseCursor),
    /// The run is over; results stay readable until it is closed.
    Completed,
}

/// Position of the facilitator within the phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCursor {
    /// The phase clock is running.
    Active(Uuid),
    /// The phase clock is frozen.
    Paused(Uuid),
    /// The phase ended or was skipped and the next one has not started.
    Between(Uuid),
}

impl PhaseCursor {
    /// Phase the cursor points at.
    pub fn phase_id(&self) -> Uuid {
        match self {
            PhaseCursor::Active(id) | PhaseCursor::Paused(id) | PhaseCursor::Between(id) => *id,
        }
    }
}

impl RunPhase {
    /// Phase currently active or paused, if any.
    pub fn running_phase(&self) -> Option<Uuid> {
        match self {
            RunPhase::Running(PhaseCursor::Active(id) | PhaseCursor::Paused(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A stored simulation becomes live, resuming where it left off.
    Load(RunPhase),
    /// The facilitator starts a phase.
    StartPhase(Uuid),
    /// Freeze the running phase.
    PausePhase,
    /// Unfreeze the paused phase.
    ResumePhase,
    /// Finish the running phase.
    EndPhase,
    /// Pass over a phase without running it.
    SkipPhase(Uuid),
    /// Finish the whole run.
    CompleteRun,
    /// Unload the simulation.
    Close,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: RunPhase,
    /// The event that cannot be applied from this phase.
    pub event: RunEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: RunPhase,
        /// Current phase.
        actual: RunPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: RunPhase,
    /// Phase the state machine will transition to.
    pub to: RunPhase,
    /// Event that triggered this transition.
    pub event: RunEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: RunPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<RunPhase>,
}

/// State machine guarding the facilitator's phase flow.
///
/// The cursor holds at most one active or paused phase, which keeps the
/// "single running phase per run" rule out of the storage layer.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    phase: RunPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl RunStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase.clone()
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: RunEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RunPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase.clone(),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase.clone())
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: RunEvent) -> Result<RunPhase, InvalidTransition> {
        use PhaseCursor::{Active, Between, Paused};

        let next = match (self.phase.clone(), event) {
            (RunPhase::Idle, RunEvent::Load(target)) if target != RunPhase::Idle => target,
            (RunPhase::Setup | RunPhase::Running(Between(_)), RunEvent::StartPhase(id)) => {
                RunPhase::Running(Active(id))
            }
            (RunPhase::Running(Active(id)), RunEvent::PausePhase) => RunPhase::Running(Paused(id)),
            (RunPhase::Running(Paused(id)), RunEvent::ResumePhase) => {
                RunPhase::Running(Active(id))
            }
            (RunPhase::Running(Active(id) | Paused(id)), RunEvent::EndPhase) => {
                RunPhase::Running(Between(id))
            }
            (RunPhase::Setup | RunPhase::Running(Between(_)), RunEvent::SkipPhase(id)) => {
                RunPhase::Running(Between(id))
            }
            (RunPhase::Running(Active(current) | Paused(current)), RunEvent::SkipPhase(id))
                if current == id =>
            {
                RunPhase::Running(Between(id))
            }
            (RunPhase::Setup | RunPhase::Running(_), RunEvent::CompleteRun) => RunPhase::Completed,
            (RunPhase::Setup | RunPhase::Running(_) | RunPhase::Completed, RunEvent::Close) => {
                RunPhase::Idle
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
