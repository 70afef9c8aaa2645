//! Per-key alert cooldown

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Default window between two alerts sharing a key
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Granularity of the cooldown key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One alert per asset per window, whatever the milestone
    Asset,
    /// Each (asset, milestone) pair has its own window
    #[default]
    AssetMilestone,
}

impl CooldownScope {
    pub fn key(&self, asset_id: &str, milestone: Decimal) -> String {
        match self {
            Self::Asset => asset_id.to_string(),
            Self::AssetMilestone => format!("{asset_id}-{}", milestone.normalize()),
        }
    }
}

impl FromStr for CooldownScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asset" => Ok(Self::Asset),
            "asset_milestone" | "asset-milestone" | "milestone" => Ok(Self::AssetMilestone),
            other => Err(format!("unknown cooldown scope: {other}")),
        }
    }
}

/// Suppresses a second alert for the same key inside the cooldown window
#[derive(Debug)]
pub struct AlertGate {
    cooldown: Duration,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl AlertGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn try_consume(&mut self, key: &str) -> bool {
        self.try_consume_at(key, Utc::now())
    }

    /// Returns true and records `now` iff the window for `key` has elapsed.
    /// A clock that moved backwards counts as still inside the window.
    pub fn try_consume_at(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_alert.get(key) {
            match (now - *last).to_std() {
                Ok(elapsed) if elapsed >= self.cooldown => {}
                _ => return false,
            }
        }
        self.last_alert.insert(key.to_string(), now);
        true
    }

    pub fn last_alert(&self, key: &str) -> Option<DateTime<Utc>> {
        self.last_alert.get(key).copied()
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_cooldown_scenario() {
        let mut gate = AlertGate::default();
        let start = t0();

        assert!(gate.try_consume_at("X", start));
        assert!(!gate.try_consume_at("X", start + chrono::Duration::seconds(4 * 60 + 59)));
        assert!(gate.try_consume_at("X", start + chrono::Duration::seconds(5 * 60 + 1)));
    }

    #[test]
    fn test_suppressed_attempt_does_not_extend_window() {
        let mut gate = AlertGate::new(Duration::from_secs(60));
        let start = t0();

        assert!(gate.try_consume_at("X", start));
        assert!(!gate.try_consume_at("X", start + chrono::Duration::seconds(59)));
        assert_eq!(gate.last_alert("X"), Some(start));
        assert!(gate.try_consume_at("X", start + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut gate = AlertGate::default();
        let start = t0();

        assert!(gate.try_consume_at("X", start));
        assert!(gate.try_consume_at("Y", start));
        assert!(!gate.try_consume_at("X", start));
    }

    #[test]
    fn test_clock_going_backwards_is_suppressed() {
        let mut gate = AlertGate::default();
        let start = t0();

        assert!(gate.try_consume_at("X", start));
        assert!(!gate.try_consume_at("X", start - chrono::Duration::hours(1)));
    }

    #[test]
    fn test_scope_keys() {
        assert_eq!(CooldownScope::Asset.key("pepe", dec!(2)), "pepe");
        assert_eq!(CooldownScope::AssetMilestone.key("pepe", dec!(2.0)), "pepe-2");
        assert_eq!(
            "asset".parse::<CooldownScope>().unwrap(),
            CooldownScope::Asset
        );
        assert!("global".parse::<CooldownScope>().is_err());
    }
}
