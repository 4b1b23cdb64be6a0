use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod diagnostics;
pub mod events;
pub mod health;
pub mod king;
pub mod participant;
pub mod phase;
pub mod public;
pub mod simulation;
pub mod sse;
pub mod validation;
pub mod vote;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
