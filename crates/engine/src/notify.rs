//! Outbound notifications for call creation and milestone hits
//!
//! Delivery is fire-and-forget from the tracker's point of view: a sink error
//! is logged by the caller and never stops tracking.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::info;

use crate::milestone::MilestoneConvention;
use crate::types::{Call, Snapshot};

/// Discord rejects message content longer than this
const MAX_MESSAGE_CHARS: usize = 2000;

/// One milestone crossed by one call during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneHit {
    pub milestone: Decimal,
    pub convention: MilestoneConvention,
    pub current_price: Decimal,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn announce_creation(&self, call: &Call, snapshot: &Snapshot) -> Result<()>;

    async fn announce_milestone(&self, call: &Call, hit: &MilestoneHit) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Message text
// ---------------------------------------------------------------------------

fn role_prefix(role_id: Option<&str>) -> String {
    role_id
        .filter(|r| !r.is_empty())
        .map(|r| format!("<@&{r}> "))
        .unwrap_or_default()
}

pub fn creation_message(call: &Call, snapshot: &Snapshot, role_id: Option<&str>) -> String {
    let unit = call.asset_class.unit();
    let mut text = format!(
        "{}New {} call: **{}** 🚨\nCalled by: <@{}>\nInitial price: {} {unit}",
        role_prefix(role_id),
        call.asset_class.label(),
        call.display_name,
        call.caller_id,
        call.baseline_price.normalize(),
    );

    if !snapshot.volume_24h.is_zero() {
        let _ = write!(text, "\n24h volume: {} {unit}", snapshot.volume_24h.round_dp(2));
    }
    if snapshot.listed_or_tx_count > 0 {
        let _ = write!(text, "\nListed / 24h txns: {}", snapshot.listed_or_tx_count);
    }
    if !snapshot.price_change_24h.is_zero() {
        let _ = write!(text, "\n24h change: {}%", snapshot.price_change_24h.round_dp(2));
    }
    let links = &snapshot.social_links;
    for (label, url) in [
        ("Website", &links.website),
        ("Twitter", &links.twitter),
        ("Discord", &links.discord),
        ("Telegram", &links.telegram),
    ] {
        if let Some(url) = url {
            let _ = write!(text, "\n{label}: {url}");
        }
    }
    if let Some(url) = &call.market_url {
        let _ = write!(text, "\nChart: {url}");
    }
    truncate(text)
}

pub fn milestone_message(call: &Call, hit: &MilestoneHit, role_id: Option<&str>) -> String {
    let unit = call.asset_class.unit();
    let milestone = hit.milestone.normalize();
    let headline = match hit.convention {
        MilestoneConvention::Multiplier => {
            format!("🎯 **{}** hit {milestone}x!", call.display_name)
        }
        MilestoneConvention::PercentDelta => format!(
            "🎯 **{}** has reached a {milestone}% increase from the initial call!",
            call.display_name
        ),
    };
    let mut text = format!(
        "{}{headline}\nInitial price: {} {unit}\nCurrent price: {} {unit}\nCalled by: <@{}>",
        role_prefix(role_id),
        call.baseline_price.normalize(),
        hit.current_price.normalize(),
        call.caller_id,
    );
    if let Some(url) = &call.market_url {
        let _ = write!(text, "\n{url}");
    }
    truncate(text)
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }
    text.chars().take(MAX_MESSAGE_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Writes announcements to the log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn announce_creation(&self, call: &Call, _snapshot: &Snapshot) -> Result<()> {
        info!(
            asset_class = %call.asset_class,
            asset_id = %call.asset_id,
            name = %call.display_name,
            baseline = %call.baseline_price,
            caller = %call.caller_id,
            "New call"
        );
        Ok(())
    }

    async fn announce_milestone(&self, call: &Call, hit: &MilestoneHit) -> Result<()> {
        info!(
            asset_class = %call.asset_class,
            asset_id = %call.asset_id,
            milestone = %format!("{}{}", hit.milestone.normalize(), hit.convention.suffix()),
            price = %hit.current_price,
            "Milestone reached"
        );
        Ok(())
    }
}

/// Posts plain-text messages to a Discord webhook.
///
/// Every message goes to the webhook's own channel; `Call::channel_id` is
/// stored for reference but not used for routing.
pub struct DiscordWebhookSink {
    client: Client,
    webhook_url: String,
    role_id: Option<String>,
}

impl DiscordWebhookSink {
    pub fn new(webhook_url: impl Into<String>, role_id: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            webhook_url: webhook_url.into(),
            role_id,
        }
    }

    async fn post(&self, content: String) -> Result<()> {
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": ["roles", "users"] },
        });
        let resp = self.client.post(&self.webhook_url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Discord webhook error {}: {}", status, text);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    async fn announce_creation(&self, call: &Call, snapshot: &Snapshot) -> Result<()> {
        self.post(creation_message(call, snapshot, self.role_id.as_deref()))
            .await
    }

    async fn announce_milestone(&self, call: &Call, hit: &MilestoneHit) -> Result<()> {
        self.post(milestone_message(call, hit, self.role_id.as_deref()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetClass;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn call(asset_class: AssetClass) -> Call {
        Call {
            asset_class,
            asset_id: "nodemonkes".into(),
            chain: None,
            display_name: "NodeMonkes".into(),
            baseline_price: dec!(0.0400),
            last_price: dec!(0.0400),
            caller_id: "42".into(),
            channel_id: "7".into(),
            created_at: Utc::now(),
            last_update: Utc::now(),
            achieved_milestones: BTreeSet::new(),
            market_url: Some("https://magiceden.io/ordinals/collections/nodemonkes".into()),
            image_url: None,
        }
    }

    #[test]
    fn test_multiplier_message() {
        let hit = MilestoneHit {
            milestone: dec!(2),
            convention: MilestoneConvention::Multiplier,
            current_price: dec!(0.0812),
        };
        let text = milestone_message(&call(AssetClass::SolanaNft), &hit, Some("999"));

        assert!(text.starts_with("<@&999> 🎯 **NodeMonkes** hit 2x!"));
        assert!(text.contains("Initial price: 0.04 SOL"));
        assert!(text.contains("Current price: 0.0812 SOL"));
        assert!(text.contains("Called by: <@42>"));
    }

    #[test]
    fn test_percent_message_without_role() {
        let hit = MilestoneHit {
            milestone: dec!(5),
            convention: MilestoneConvention::PercentDelta,
            current_price: dec!(0.0421),
        };
        let text = milestone_message(&call(AssetClass::Ordinal), &hit, None);

        assert!(text.starts_with("🎯 **NodeMonkes** has reached a 5% increase"));
        assert!(text.contains("BTC"));
    }

    #[test]
    fn test_creation_message_lists_known_fields_only() {
        let mut snapshot = Snapshot::priced("NodeMonkes", dec!(0.04));
        snapshot.listed_or_tx_count = 287;
        snapshot.social_links.twitter = Some("https://twitter.com/nodemonkes".into());

        let text = creation_message(&call(AssetClass::Ordinal), &snapshot, Some(""));

        assert!(text.starts_with("New Ordinal call: **NodeMonkes**"));
        assert!(text.contains("Listed / 24h txns: 287"));
        assert!(text.contains("Twitter: https://twitter.com/nodemonkes"));
        assert!(!text.contains("24h volume"));
        assert!(!text.contains("Website"));
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let mut long = call(AssetClass::Token);
        long.display_name = "x".repeat(3000);
        let text = creation_message(&long, &Snapshot::priced("x", dec!(1)), None);
        assert_eq!(text.chars().count(), MAX_MESSAGE_CHARS);
    }
}
