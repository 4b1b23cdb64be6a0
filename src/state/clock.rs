//! Server-side phase clock.
//!
//! A clock is derived on demand from the persisted phase record, so every
//! client sees the same remaining time regardless of when it connected.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{PhaseEntity, PhaseStatus};

/// Remaining-time bands used to colour the countdown.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerUrgency {
    /// More than the warning threshold left.
    Plenty,
    /// At or below the warning threshold.
    Soon,
    /// At or below the critical threshold.
    LastMinute,
    /// Planned duration exceeded.
    Overtime,
}

/// Seconds-left boundaries of the urgency bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerThresholds {
    pub warning_secs: i64,
    pub critical_secs: i64,
}

impl Default for TimerThresholds {
    fn default() -> Self {
        Self {
            warning_secs: 300,
            critical_secs: 60,
        }
    }
}

impl TimerThresholds {
    /// Band for a signed remaining time.
    pub fn urgency(&self, remaining_seconds: i64) -> TimerUrgency {
        if remaining_seconds < 0 {
            TimerUrgency::Overtime
        } else if remaining_seconds <= self.critical_secs {
            TimerUrgency::LastMinute
        } else if remaining_seconds <= self.warning_secs {
            TimerUrgency::Soon
        } else {
            TimerUrgency::Plenty
        }
    }
}

/// Point-in-time reading of a phase countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseClock {
    pub planned_minutes: u32,
    pub elapsed_seconds: i64,
    /// Negative once the phase runs over.
    pub remaining_seconds: i64,
    pub overtime: bool,
    pub paused: bool,
    /// `M:SS`, prefixed with `+` in overtime.
    pub display: String,
    pub urgency: TimerUrgency,
}

impl PhaseClock {
    /// Read the clock of `phase` at `now`; `None` until the phase has started.
    pub fn read(phase: &PhaseEntity, now: SystemTime, thresholds: &TimerThresholds) -> Option<Self> {
        let started_at = phase.started_at?;
        let planned_minutes = planned_minutes(phase);

        let reference = match phase.status {
            PhaseStatus::Paused => phase.paused_at.unwrap_or(now),
            PhaseStatus::Completed | PhaseStatus::Skipped => phase.ended_at.unwrap_or(now),
            PhaseStatus::Active | PhaseStatus::Pending => now,
        };

        let wall_ms = millis_between(started_at, reference);
        let elapsed_ms = wall_ms - i64::try_from(phase.paused_ms).unwrap_or(i64::MAX);
        let elapsed_ms = elapsed_ms.max(0);
        let planned_ms = i64::from(planned_minutes) * 60_000;

        let remaining_seconds = (planned_ms - elapsed_ms).div_euclid(1000);
        let overtime = remaining_seconds < 0;

        Some(Self {
            planned_minutes,
            elapsed_seconds: elapsed_ms / 1000,
            remaining_seconds,
            overtime,
            paused: phase.status == PhaseStatus::Paused,
            display: display(remaining_seconds),
            urgency: thresholds.urgency(remaining_seconds),
        })
    }
}

/// Extended plan when set, the template duration otherwise.
pub fn planned_minutes(phase: &PhaseEntity) -> u32 {
    phase
        .actual_duration_minutes
        .filter(|minutes| *minutes > 0)
        .unwrap_or(phase.default_duration_minutes)
}

/// Whole minutes between start and end, rounded up.
pub fn measured_minutes(started_at: SystemTime, ended_at: SystemTime) -> u32 {
    let elapsed = ended_at
        .duration_since(started_at)
        .unwrap_or(Duration::ZERO)
        .as_millis();
    elapsed.div_ceil(60_000) as u32
}

/// Format seconds as `M:SS`.
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn display(remaining_seconds: i64) -> String {
    let formatted = format_clock(remaining_seconds.unsigned_abs());
    if remaining_seconds < 0 {
        format!("+{formatted}")
    } else {
        formatted
    }
}

fn millis_between(from: SystemTime, to: SystemTime) -> i64 {
    match to.duration_since(from) {
        Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        Err(err) => -i64::try_from(err.duration().as_millis()).unwrap_or(i64::MAX),
    }
}
