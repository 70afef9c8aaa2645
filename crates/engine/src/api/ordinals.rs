//! Ordinal collections via Magic Eden `v2/ord/btc`
//!
//! Milestones for ordinals are read as percent gains over the baseline floor.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::magic_eden::{MagicEdenClient, MetadataCache};
use super::{lenient_count, lenient_decimal, non_empty};
use crate::fetcher::{with_retry, Backoff, FetchError, RetryPolicy};
use crate::milestone::MilestoneConvention;
use crate::source::AssetDataSource;
use crate::types::{AssetClass, Snapshot, SocialLinks};

const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(65);
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdinalStats {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub floor_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub volume24h: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_volume: Decimal,
    #[serde(default, deserialize_with = "lenient_count")]
    pub listed_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdinalCollection {
    pub name: Option<String>,
    #[serde(rename = "imageURI")]
    pub image_uri: Option<String>,
    pub twitter_link: Option<String>,
    pub discord_link: Option<String>,
    pub website_link: Option<String>,
}

pub fn snapshot_from_stats(
    symbol: &str,
    stats: &OrdinalStats,
    collection: OrdinalCollection,
) -> Snapshot {
    Snapshot {
        reference_price: stats.floor_price,
        volume_24h: stats.volume24h,
        listed_or_tx_count: stats.listed_count,
        price_change_24h: Decimal::ZERO,
        display_name: non_empty(collection.name).unwrap_or_else(|| symbol.to_string()),
        image_url: non_empty(collection.image_uri),
        social_links: SocialLinks {
            website: non_empty(collection.website_link),
            twitter: non_empty(collection.twitter_link),
            discord: non_empty(collection.discord_link),
            telegram: None,
        },
        market_url: Some(format!("https://magiceden.io/ordinals/collections/{symbol}")),
        fetched_at: Utc::now(),
    }
}

pub struct OrdinalSource {
    client: Arc<MagicEdenClient>,
    collections: MetadataCache<OrdinalCollection>,
}

impl OrdinalSource {
    pub fn new(client: Arc<MagicEdenClient>) -> Self {
        Self {
            client,
            collections: MetadataCache::new(),
        }
    }

    async fn fetch_once(&self, symbol: &str) -> Result<Snapshot, FetchError> {
        let stats: OrdinalStats = self
            .client
            .get("/v2/ord/btc/stat", &[("collectionSymbol", symbol)])
            .await?;
        let collection_path = format!("/v2/ord/btc/collections/{symbol}");
        let collection = self
            .collections
            .get_or_fetch(self.client.name(), symbol, || {
                self.client.get::<OrdinalCollection>(&collection_path, &[])
            })
            .await;

        Ok(snapshot_from_stats(symbol, &stats, collection))
    }
}

#[async_trait]
impl AssetDataSource for OrdinalSource {
    fn asset_class(&self) -> AssetClass {
        AssetClass::Ordinal
    }

    fn convention(&self) -> MilestoneConvention {
        MilestoneConvention::PercentDelta
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stats_normalized() {
        let stats: OrdinalStats = serde_json::from_str(
            r#"{
                "floorPrice": "0.0415",
                "volume24h": 3.87,
                "totalVolume": 9123.4,
                "listedCount": "287",
                "owners": 4101
            }"#,
        )
        .unwrap();
        let collection = OrdinalCollection {
            name: Some("NodeMonkes".into()),
            twitter_link: Some("https://twitter.com/nodemonkes".into()),
            website_link: Some(String::new()),
            ..OrdinalCollection::default()
        };

        let snapshot = snapshot_from_stats("nodemonkes", &stats, collection);

        assert_eq!(snapshot.reference_price, dec!(0.0415));
        assert_eq!(snapshot.volume_24h, dec!(3.87));
        assert_eq!(snapshot.listed_or_tx_count, 287);
        assert_eq!(snapshot.display_name, "NodeMonkes");
        assert!(snapshot.social_links.website.is_none());
        assert_eq!(
            snapshot.market_url.as_deref(),
            Some("https://magiceden.io/ordinals/collections/nodemonkes")
        );
    }

    #[test]
    fn test_ordinals_use_percent_convention() {
        let source = OrdinalSource::new(Arc::new(MagicEdenClient::new(None)));
        assert_eq!(source.convention(), MilestoneConvention::PercentDelta);
        assert_eq!(source.asset_class(), AssetClass::Ordinal);
    }
}
