//! Bitcoin runes via Magic Eden `v2/ord/btc/runes`
//!
//! The reference price is the best (lowest) sell order's unit price in sats.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::magic_eden::MagicEdenClient;
use super::{lenient_decimal, non_empty};
use crate::fetcher::{with_retry, Backoff, FetchError, RetryPolicy};
use crate::source::AssetDataSource;
use crate::types::{AssetClass, Snapshot, SocialLinks};

const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(65);
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuneMarketInfo {
    pub rune: Option<String>,
    pub spaced_rune: Option<String>,
    #[serde(rename = "imageURI")]
    pub image_uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub volume24h: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_volume: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuneOrder {
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub unit_price: Decimal,
}

/// The orders endpoint answers either with a bare list or `{ "orders": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrdersResponse {
    List(Vec<RuneOrder>),
    Wrapped {
        #[serde(default)]
        orders: Vec<RuneOrder>,
    },
}

impl OrdersResponse {
    fn into_orders(self) -> Vec<RuneOrder> {
        match self {
            Self::List(orders) | Self::Wrapped { orders } => orders,
        }
    }
}

/// Lowest positive unit price, or zero for an empty book
pub fn best_ask(orders: &[RuneOrder]) -> Decimal {
    orders
        .iter()
        .map(|o| o.unit_price)
        .filter(|p| *p > Decimal::ZERO)
        .min()
        .unwrap_or(Decimal::ZERO)
}

pub fn snapshot_from_market(rune: &str, info: RuneMarketInfo, orders: &[RuneOrder]) -> Snapshot {
    let display_name = non_empty(info.spaced_rune)
        .or_else(|| non_empty(info.rune))
        .unwrap_or_else(|| rune.to_string());

    Snapshot {
        reference_price: best_ask(orders),
        volume_24h: info.volume24h,
        listed_or_tx_count: orders.len() as u64,
        price_change_24h: Decimal::ZERO,
        display_name,
        image_url: non_empty(info.image_uri),
        social_links: SocialLinks::default(),
        market_url: Some(format!("https://magiceden.io/ordinals/runes/{rune}")),
        fetched_at: Utc::now(),
    }
}

pub struct RuneSource {
    client: Arc<MagicEdenClient>,
}

impl RuneSource {
    pub fn new(client: Arc<MagicEdenClient>) -> Self {
        Self { client }
    }

    async fn fetch_once(&self, rune: &str) -> Result<Snapshot, FetchError> {
        let info: RuneMarketInfo = self
            .client
            .get(&format!("/v2/ord/btc/runes/market/{rune}/info"), &[])
            .await?;
        let orders: OrdersResponse = self
            .client
            .get(
                &format!("/v2/ord/btc/runes/orders/{rune}"),
                &[("side", "sell"), ("sort", "unitPriceAsc")],
            )
            .await?;

        Ok(snapshot_from_market(rune, info, &orders.into_orders()))
    }
}

#[async_trait]
impl AssetDataSource for RuneSource {
    fn asset_class(&self) -> AssetClass {
        AssetClass::Rune
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(Backoff::Fixed(RATE_LIMIT_BACKOFF))
            .with_transient_delay(RETRY_DELAY, Duration::ZERO)
    }

    async fn fetch_snapshot(
        &self,
        asset_id: &str,
        _chain: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<Snapshot, FetchError> {
        with_retry(self.client.name(), policy, asset_id, || self.fetch_once(asset_id)).await
    }
}
