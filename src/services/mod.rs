/// Integrity checks over stored runs.
pub mod diagnostics;
/// OpenAPI documentation generation.
pub mod documentation;
/// Audit trail of facilitator actions.
pub mod event_log;
/// Health check service.
pub mod health_service;
/// Decisions of the crowned King.
pub mod king_decision_service;
/// Participant briefing, votes and ballots.
pub mod participant_service;
/// Phase lifecycle and clocks.
pub mod phase_service;
/// Background broadcaster of the running phase's clock.
pub mod phase_ticker;
/// Read-only projections for the room.
pub mod public_service;
/// Run setup, loading and role assignment.
pub mod simulation_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events subscriptions and the facilitator token.
pub mod sse_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Vote sessions, ballots and results.
pub mod vote_service;
/// Vote presets.
pub mod vote_templates;
