//! Tracker configuration

use std::time::Duration;

use crate::alert_gate::{CooldownScope, DEFAULT_ALERT_COOLDOWN};
use crate::milestone::MilestoneSet;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Attempts for a user-initiated creation fetch before the failure is surfaced
pub const DEFAULT_CREATION_MAX_ATTEMPTS: u32 = 3;
/// Retry budget for one asset inside a sweep
pub const DEFAULT_SWEEP_MAX_ELAPSED: Duration = Duration::from_secs(10 * 60);

/// Settings shared by every tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub sweep_interval: Duration,
    pub alert_cooldown: Duration,
    pub cooldown_scope: CooldownScope,
    pub milestones: MilestoneSet,
    pub creation_max_attempts: u32,
    /// `None` retries a failing sweep fetch forever, stalling the rest of that sweep
    pub sweep_max_elapsed: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            alert_cooldown: DEFAULT_ALERT_COOLDOWN,
            cooldown_scope: CooldownScope::default(),
            milestones: MilestoneSet::standard(),
            creation_max_attempts: DEFAULT_CREATION_MAX_ATTEMPTS,
            sweep_max_elapsed: Some(DEFAULT_SWEEP_MAX_ELAPSED),
        }
    }
}
