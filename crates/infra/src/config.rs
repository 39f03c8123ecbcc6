//! Engine configuration.

use std::time::Duration;

use lyceum_career::ProficiencyLevel;
use lyceum_coursework::WeightingPolicy;

use crate::retry::RetryPolicy;
use crate::timeout::{CallGuard, DEFAULT_MAX_IN_FLIGHT};

pub const ENV_MAX_CONFLICT_RETRIES: &str = "LYCEUM_MAX_CONFLICT_RETRIES";
pub const ENV_COLLABORATOR_TIMEOUT_MS: &str = "LYCEUM_COLLABORATOR_TIMEOUT_MS";
pub const ENV_NOTIFY_MAX_ATTEMPTS: &str = "LYCEUM_NOTIFY_MAX_ATTEMPTS";
pub const ENV_COLLABORATOR_MAX_IN_FLIGHT: &str = "LYCEUM_COLLABORATOR_MAX_IN_FLIGHT";

/// Progression engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Attempts for the grade → progress → completion unit before surfacing a conflict
    pub max_conflict_retries: u32,
    /// Upper bound on every external collaborator call
    pub collaborator_timeout: Duration,
    /// Helper threads a single collaborator may hold, stuck calls included
    pub collaborator_max_in_flight: usize,
    /// Delivery retries for notifications
    pub notification_retry: RetryPolicy,
    /// Minimum match percentage for a job recommendation to be kept
    pub job_match_threshold: f64,
    /// Lowest proficiency at which a held skill counts towards a job match
    pub job_match_min_proficiency: ProficiencyLevel,
    /// Final-grade weighting
    pub weighting: WeightingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            collaborator_timeout: Duration::from_secs(2),
            collaborator_max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            notification_retry: RetryPolicy::default(),
            job_match_threshold: 40.0,
            job_match_min_proficiency: ProficiencyLevel::Intermediate,
            weighting: WeightingPolicy::Fixed,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl EngineConfig {
    /// Defaults overridden by any well-formed `LYCEUM_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_u64)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<u64>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_MAX_CONFLICT_RETRIES) {
            config.max_conflict_retries = u32::try_from(v).unwrap_or(u32::MAX).max(1);
        }
        if let Some(v) = lookup(ENV_COLLABORATOR_TIMEOUT_MS) {
            config.collaborator_timeout = Duration::from_millis(v.max(1));
        }
        if let Some(v) = lookup(ENV_COLLABORATOR_MAX_IN_FLIGHT) {
            config.collaborator_max_in_flight = usize::try_from(v).unwrap_or(usize::MAX).max(1);
        }
        if let Some(v) = lookup(ENV_NOTIFY_MAX_ATTEMPTS) {
            config.notification_retry.attempts = u32::try_from(v).unwrap_or(u32::MAX).max(1);
        }

        config
    }

    /// Timeout and in-flight cap for calls into the collaborator `name`.
    pub fn call_guard(&self, name: &'static str) -> CallGuard {
        CallGuard::new(name, self.collaborator_timeout, self.collaborator_max_in_flight)
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries.max(1);
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_collaborator_max_in_flight(mut self, max: usize) -> Self {
        self.collaborator_max_in_flight = max.max(1);
        self
    }

    pub fn with_notification_retry(mut self, policy: RetryPolicy) -> Self {
        self.notification_retry = policy;
        self
    }

    pub fn with_job_match_threshold(mut self, threshold: f64) -> Self {
        self.job_match_threshold = threshold;
        self
    }

    pub fn with_job_match_min_proficiency(mut self, level: ProficiencyLevel) -> Self {
        self.job_match_min_proficiency = level;
        self
    }

    pub fn with_weighting(mut self, weighting: WeightingPolicy) -> Self {
        self.weighting = weighting;
        self
    }
}
