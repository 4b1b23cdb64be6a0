use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::VoteStatus,
    dto::{
        king::KingDecisionDto,
        phase::{PhaseClockDto, PhaseSnapshot},
        simulation::RoleDetail,
        vote::{VoteResultDto, VoteSessionSummary, WinnerRef},
    },
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Raw text payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `facilitator`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    /// Facilitator token returned when the stream is privileged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Token refresh pushed to the facilitator stream.
pub struct FacilitatorHandshake {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever the run moves to another phase state.
pub struct PhaseChangedEvent(pub PhaseSnapshot);

#[derive(Debug, Serialize, ToSchema)]
/// Periodic clock update for the running phase.
pub struct PhaseTimerEvent {
    pub phase_id: Uuid,
    pub phase_name: String,
    #[serde(flatten)]
    pub clock: PhaseClockDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Emitted once when a phase runs past its plan.
pub struct PhaseOvertimeEvent {
    pub phase_id: Uuid,
    pub phase_name: String,
    pub planned_minutes: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a vote session opens.
pub struct VoteOpenedEvent {
    pub vote: VoteSessionSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Ballot count after each cast; omitted for secret votes on the public stream.
pub struct VoteProgressEvent {
    pub session_id: Uuid,
    pub votes_cast: u32,
    pub eligible_voters: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Live tally for immediate-reveal sessions.
pub struct VoteTallyEvent {
    pub result: VoteResultDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Facilitator notice that every eligible voter has voted.
pub struct VoteAllCastEvent {
    pub session_id: Uuid,
    pub votes_cast: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a session stops accepting ballots.
pub struct VoteClosedEvent {
    pub session_id: Uuid,
    pub status: VoteStatus,
    /// Present when the result may already be shown to the room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VoteResultDto>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the facilitator reveals a result.
pub struct VoteAnnouncedEvent {
    pub result: VoteResultDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Facilitator correction of a result.
pub struct VoteOverriddenEvent {
    pub session_id: Uuid,
    pub winner: Option<WinnerRef>,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Role handed to a participant; facilitator stream only.
pub struct RoleAssignedEvent {
    pub role: RoleDetail,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a run is loaded or closed.
pub struct RunLifecycleEvent {
    pub simulation_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Facilitator notice that the King handed in or revised decisions.
pub struct KingDecisionSubmittedEvent {
    pub decision: KingDecisionDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the facilitator reveals the King's decisions.
pub struct KingDecisionRevealedEvent {
    pub decision: KingDecisionDto,
}
