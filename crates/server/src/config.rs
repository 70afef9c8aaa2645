//! Process configuration read from the environment (after `.env` is loaded)

use anyhow::{anyhow, Context, Result};
use engine::{CooldownScope, TrackerConfig};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "data/calls.db";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub magic_eden_api_key: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub holders_role_id: Option<String>,
    pub db_path: String,
    pub tracker: TrackerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secs = |key: &str| -> Result<Option<Duration>> {
            get(key)
                .map(|v| {
                    v.parse::<u64>()
                        .map(Duration::from_secs)
                        .with_context(|| format!("{key} must be a whole number of seconds, got {v:?}"))
                })
                .transpose()
        };

        let mut tracker = TrackerConfig::default();
        if let Some(interval) = secs("SWEEP_INTERVAL_SECS")? {
            if interval.is_zero() {
                return Err(anyhow!("SWEEP_INTERVAL_SECS must be positive"));
            }
            tracker.sweep_interval = interval;
        }
        if let Some(cooldown) = secs("ALERT_COOLDOWN_SECS")? {
            tracker.alert_cooldown = cooldown;
        }
        if let Some(scope) = get("ALERT_COOLDOWN_SCOPE") {
            tracker.cooldown_scope = scope.parse::<CooldownScope>().map_err(|e| anyhow!(e))?;
        }
        // 0 retries a failing sweep fetch without limit
        if let Some(budget) = secs("SWEEP_MAX_RETRY_SECS")? {
            tracker.sweep_max_elapsed = (!budget.is_zero()).then_some(budget);
        }

        Ok(Self {
            magic_eden_api_key: get("MAGIC_EDEN_API_KEY"),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
            holders_role_id: get("HOLDERS_ROLE_ID"),
            db_path: get("CALL_TRACKER_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            tracker,
        })
    }
}
