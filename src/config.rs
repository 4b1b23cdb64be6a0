//! Application-level configuration loading, including the default simulation process.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::clock::TimerThresholds;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "KING_SIM_BACK_CONFIG_PATH";
const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    process: ProcessTemplate,
    election: ElectionRule,
    vote_time_limit: VoteTimeLimitRule,
    tick_interval: Duration,
    timer_thresholds: TimerThresholds,
}

/// Ordered list of phases a new simulation is seeded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTemplate {
    /// Scenario name, also used as the default run version tag.
    pub name: String,
    /// Phases in play order.
    pub phases: Vec<PhaseTemplate>,
}

/// One stage of the default process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTemplate {
    /// Display name shown to the room.
    pub name: String,
    /// Short facilitator note describing the stage.
    pub description: Option<String>,
    /// Planned length in minutes.
    pub default_duration_minutes: u32,
}

/// Share of eligible voters needed to win an election round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionRule {
    /// Numerator of the majority ratio.
    pub numerator: u32,
    /// Denominator of the majority ratio.
    pub denominator: u32,
}

impl ElectionRule {
    /// Votes required out of `eligible_voters`, rounded up.
    pub fn threshold_for(&self, eligible_voters: u32) -> u32 {
        if self.denominator == 0 {
            return eligible_voters;
        }
        let scaled = u64::from(eligible_voters) * u64::from(self.numerator);
        scaled.div_ceil(u64::from(self.denominator)) as u32
    }
}

/// Rule deriving a vote's time limit from the phase it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTimeLimitRule {
    /// Minutes reserved at the end of the phase for the announcement.
    pub margin_minutes: u32,
    /// Lower bound for the computed limit.
    pub minimum_minutes: u32,
    /// Limit used when the vote is not attached to a phase.
    pub fallback_minutes: u32,
}

impl VoteTimeLimitRule {
    /// Compute the time limit for a vote opened during a phase of `phase_minutes`.
    pub fn limit_for(&self, phase_minutes: Option<u32>) -> u32 {
        match phase_minutes {
            Some(minutes) if minutes > 0 => minutes
                .saturating_sub(self.margin_minutes)
                .max(self.minimum_minutes),
            _ => self.fallback_minutes,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the baked-in KING process.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        phases = app_config.process.phases.len(),
                        "loaded simulation process from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Process used when a facilitator creates a run without listing phases.
    pub fn process(&self) -> &ProcessTemplate {
        &self.process
    }

    /// Majority rule for election rounds.
    pub fn election(&self) -> ElectionRule {
        self.election
    }

    /// Rule for default vote time limits.
    pub fn vote_time_limit(&self) -> VoteTimeLimitRule {
        self.vote_time_limit
    }

    /// How often the phase ticker broadcasts the running clock.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Urgency bands applied to phase clocks.
    pub fn timer_thresholds(&self) -> TimerThresholds {
        self.timer_thresholds
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            process: default_process(),
            election: ElectionRule {
                numerator: 2,
                denominator: 3,
            },
            vote_time_limit: VoteTimeLimitRule {
                margin_minutes: 2,
                minimum_minutes: 2,
                fallback_minutes: 10,
            },
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            timer_thresholds: TimerThresholds::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    process: Option<RawProcess>,
    #[serde(default)]
    election_threshold: Option<RawRatio>,
    #[serde(default)]
    vote_time_limit: Option<RawVoteTimeLimit>,
    #[serde(default)]
    timer: Option<RawTimer>,
}

#[derive(Debug, Deserialize)]
struct RawProcess {
    name: String,
    phases: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    name: String,
    #[serde(default)]
    description: Option<String>,
    minutes: u32,
}

#[derive(Debug, Deserialize)]
struct RawRatio {
    numerator: u32,
    denominator: u32,
}

#[derive(Debug, Deserialize)]
struct RawVoteTimeLimit {
    margin_minutes: u32,
    minimum_minutes: u32,
    fallback_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct RawTimer {
    #[serde(default)]
    tick_interval_secs: Option<u64>,
    #[serde(default)]
    warning_secs: Option<i64>,
    #[serde(default)]
    critical_secs: Option<i64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let process = value
            .process
            .filter(|process| !process.phases.is_empty())
            .map(|process| ProcessTemplate {
                name: process.name,
                phases: process
                    .phases
                    .into_iter()
                    .map(|phase| PhaseTemplate {
                        name: phase.name,
                        description: phase.description,
                        default_duration_minutes: phase.minutes,
                    })
                    .collect(),
            })
            .unwrap_or(defaults.process);

        let election = value
            .election_threshold
            .filter(|ratio| ratio.denominator > 0 && ratio.numerator <= ratio.denominator)
            .map(|ratio| ElectionRule {
                numerator: ratio.numerator,
                denominator: ratio.denominator,
            })
            .unwrap_or(defaults.election);

        let vote_time_limit = value
            .vote_time_limit
            .map(|rule| VoteTimeLimitRule {
                margin_minutes: rule.margin_minutes,
                minimum_minutes: rule.minimum_minutes,
                fallback_minutes: rule.fallback_minutes,
            })
            .unwrap_or(defaults.vote_time_limit);

        let (tick_interval, timer_thresholds) = match value.timer {
            Some(timer) => {
                let tick = timer
                    .tick_interval_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.tick_interval);
                let thresholds = TimerThresholds {
                    warning_secs: timer
                        .warning_secs
                        .unwrap_or(defaults.timer_thresholds.warning_secs),
                    critical_secs: timer
                        .critical_secs
                        .unwrap_or(defaults.timer_thresholds.critical_secs),
                };
                (tick, thresholds)
            }
            None => (defaults.tick_interval, defaults.timer_thresholds),
        };

        Self {
            process,
            election,
            vote_time_limit,
            tick_interval,
            timer_thresholds,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn phase(name: &str, description: &str, minutes: u32) -> PhaseTemplate {
    PhaseTemplate {
        name: name.to_string(),
        description: Some(description.to_string()),
        default_duration_minutes: minutes,
    }
}

/// The New King process shipped with the binary (stages 0 to 15, 185 minutes).
fn default_process() -> ProcessTemplate {
    ProcessTemplate {
        name: "KING".to_string(),
        phases: vec![
            phase(
                "Role Distribution & Induction",
                "Participants receive roles and read their briefings",
                10,
            ),
            phase("Clan Councils 1", "Clans meet privately to align", 10),
            phase("Free Consultations 1", "Open negotiation between clans", 15),
            phase(
                "Clans nominate candidates",
                "Each clan picks its candidate for King",
                5,
            ),
            phase("Candidate Speeches 1", "Nominees address the assembly", 15),
            phase("Vote 1", "First election round", 10),
            phase("Clan Councils 2", "Clans regroup after the first vote", 10),
            phase("Free Consultations 2", "Second round of negotiation", 15),
            phase("Candidate Speeches 2", "Remaining candidates speak again", 10),
            phase("Vote 2", "Final election round", 5),
            phase(
                "King's Decisions and Final Speech",
                "The elected King announces decisions, if a King was elected",
                10,
            ),
            phase("Clan Councils 3", "Clans weigh the King's decisions", 8),
            phase(
                "Clan's Final Decisions",
                "Clans decide on oath or action",
                7,
            ),
            phase(
                "Individual Reflections",
                "Participants reflect on their own play",
                15,
            ),
            phase("Group Reflections", "Clans debrief together", 20),
            phase("Plenary Debriefing", "Facilitator-led closing debrief", 20),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_process_runs_for_185_minutes() {
        let config = AppConfig::default();
        let total: u32 = config
            .process()
            .phases
            .iter()
            .map(|phase| phase.default_duration_minutes)
            .sum();
        assert_eq!(config.process().phases.len(), 16);
        assert_eq!(total, 185);
    }

    #[test]
    fn two_thirds_threshold_rounds_up() {
        let rule = AppConfig::default().election();
        assert_eq!(rule.threshold_for(12), 8);
        assert_eq!(rule.threshold_for(10), 7);
        assert_eq!(rule.threshold_for(0), 0);
    }

    #[test]
    fn vote_time_limit_keeps_margin_and_floor() {
        let rule = AppConfig::default().vote_time_limit();
        assert_eq!(rule.limit_for(Some(10)), 8);
        assert_eq!(rule.limit_for(Some(3)), 2);
        assert_eq!(rule.limit_for(None), 10);
        assert_eq!(rule.limit_for(Some(0)), 10);
    }

    #[test]
    fn raw_config_overrides_only_given_sections() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "process": {"name": "Short", "phases": [{"name": "Only", "minutes": 3}]},
                "timer": {"tick_interval_secs": 2}
            }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.process().name, "Short");
        assert_eq!(config.process().phases.len(), 1);
        assert_eq!(config.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.timer_thresholds(), TimerThresholds::default());
        assert_eq!(config.election(), AppConfig::default().election());
    }

    #[test]
    fn invalid_ratio_falls_back_to_default() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"election_threshold": {"numerator": 4, "denominator": 3}}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.election(), AppConfig::default().election());
    }
}
