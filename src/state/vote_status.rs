use thiserror::Error;

use crate::dao::models::VoteStatus;

/// Facilitator actions moving a vote session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteEvent {
    /// Stop accepting ballots and tally.
    Close,
    /// Reveal the result to the room.
    Announce,
}

/// Raised when a vote session cannot take the requested step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("vote session is {from:?}; cannot {event:?}")]
pub struct InvalidVoteTransition {
    /// Status the session was in.
    pub from: VoteStatus,
    /// Rejected action.
    pub event: VoteEvent,
}

/// Status reached by applying `event` to a session in `from`.
///
/// Sessions only move forward: `open → closed → announced`.
pub fn next_status(from: VoteStatus, event: VoteEvent) -> Result<VoteStatus, InvalidVoteTransition> {
    match (from, event) {
        (VoteStatus::Open, VoteEvent::Close) => Ok(VoteStatus::Closed),
        (VoteStatus::Closed, VoteEvent::Announce) => Ok(VoteStatus::Announced),
        (from, event) => Err(InvalidVoteTransition { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_move_forward_only() {
        assert_eq!(
            next_status(VoteStatus::Open, VoteEvent::Close),
            Ok(VoteStatus::Closed)
        );
        assert_eq!(
            next_status(VoteStatus::Closed, VoteEvent::Announce),
            Ok(VoteStatus::Announced)
        );
    }

    #[test]
    fn cannot_announce_open_session() {
        let err = next_status(VoteStatus::Open, VoteEvent::Announce).unwrap_err();
        assert_eq!(err.from, VoteStatus::Open);
    }

    #[test]
    fn cannot_close_twice() {
        assert!(next_status(VoteStatus::Closed, VoteEvent::Close).is_err());
        assert!(next_status(VoteStatus::Announced, VoteEvent::Close).is_err());
    }
}
