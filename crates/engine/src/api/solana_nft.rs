//! Solana NFT collections via Magic Eden `v2/collections`
//!
//! Prices arrive in lamports and are normalized to SOL.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::magic_eden::{MagicEdenClient, MetadataCache};
use super::{lenient_count, lenient_decimal, non_empty};
use crate::fetcher::{with_retry, Backoff, FetchError, RetryPolicy};
use crate::source::AssetDataSource;
use crate::types::{AssetClass, Snapshot, SocialLinks};

const LAMPORTS_PER_SOL: Decimal = dec!(1000000000);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub floor_price: Decimal,
    #[serde(default, deserialize_with = "lenient_count")]
    pub listed_count: u64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub avg_price24hr: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub volume_all: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionInfo {
    pub name: Option<String>,
    pub image: Option<String>,
    pub twitter: Option<String>,
    pub discord: Option<String>,
    pub website: Option<String>,
}

pub fn lamports_to_sol(lamports: Decimal) -> Decimal {
    lamports / LAMPORTS_PER_SOL
}

/// Normalize collection stats (and whatever metadata is known) into a snapshot
pub fn snapshot_from_stats(symbol: &str, stats: &CollectionStats, info: CollectionInfo) -> Snapshot {
    let floor = lamports_to_sol(stats.floor_price);
    let avg_24h = lamports_to_sol(stats.avg_price24hr);
    let price_change_24h = if avg_24h > Decimal::ZERO {
        ((floor - avg_24h) / avg_24h * dec!(100)).round_dp(2)
    } else {
        Decimal::ZERO
    };

    Snapshot {
        reference_price: floor,
        volume_24h: lamports_to_sol(stats.volume_all),
        listed_or_tx_count: stats.listed_count,
        price_change_24h,
        display_name: non_empty(info.name).unwrap_or_else(|| symbol.to_string()),
        image_url: non_empty(info.image),
        social_links: SocialLinks {
            website: non_empty(info.website),
            twitter: non_empty(info.twitter),
            discord: non_empty(info.discord),
            telegram: None,
        },
        market_url: Some(format!("https://magiceden.io/marketplace/{symbol}")),
        fetched_at: Utc::now(),
    }
}

pub struct SolanaNftSource {
    client: Arc<MagicEdenClient>,
    metadata: MetadataCache<CollectionInfo>,
}

impl SolanaNftSource {
    pub fn new(client: Arc<MagicEdenClient>) -> Self {
        Self {
            client,
            metadata: MetadataCache::new(),
        }
    }

    async fn fetch_once(&self, symbol: &str) -> Result<Snapshot, FetchError> {
        let stats: CollectionStats = self
            .client
            .get(&format!("/v2/collections/{symbol}/stats"), &[])
            .await?;
        let info_path = format!("/v2/collections/{symbol}");
        let info = self
            .metadata
            .get_or_fetch(self.client.name(), symbol, || {
                self.client.get::<CollectionInfo>(&info_path, &[])
            })
            .await;

        Ok(snapshot_from_stats(symbol, &stats, info))
    }
}

#[async_trait]
impl AssetDataSource for SolanaNftSource {
    fn asset_class(&self) -> AssetClass {
        AssetClass::SolanaNft
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(Backoff::Linear(Duration::from_secs(2)))
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

    #[test]
    fn test_stats_normalized_to_sol() {
        let stats: CollectionStats = serde_json::from_str(
            r#"{
                "symbol": "mad_lads",
                "floorPrice": 52300000000,
                "listedCount": 412,
                "avgPrice24hr": 50000000000,
                "volumeAll": 1843255000000000
            }"#,
        )
        .unwrap();
        let info = CollectionInfo {
            name: Some("Mad Lads".into()),
            twitter: Some("https://twitter.com/MadLads".into()),
            ..CollectionInfo::default()
        };

        let snapshot = snapshot_from_stats("mad_lads", &stats, info);

        assert_eq!(snapshot.reference_price, dec!(52.3));
        assert_eq!(snapshot.volume_24h, dec!(1843255));
        assert_eq!(snapshot.listed_or_tx_count, 412);
        assert_eq!(snapshot.price_change_24h, dec!(4.6));
        assert_eq!(snapshot.display_name, "Mad Lads");
        assert_eq!(
            snapshot.market_url.as_deref(),
            Some("https://magiceden.io/marketplace/mad_lads")
        );
    }

    #[test]
    fn test_missing_floor_yields_zero_price() {
        let stats: CollectionStats =
            serde_json::from_str(r#"{"symbol":"empty","listedCount":0}"#).unwrap();
        let snapshot = snapshot_from_stats("empty", &stats, CollectionInfo::default());

        assert!(!snapshot.has_price());
        assert_eq!(snapshot.price_change_24h, Decimal::ZERO);
        assert_eq!(snapshot.display_name, "empty");
    }
}
