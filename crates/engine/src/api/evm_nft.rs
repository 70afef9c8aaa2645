//! Ethereum and ApeChain collections via Magic Eden `v3/rtp/{chain}/collections/v7`
//!
//! Collections are looked up by contract address; prices are in the chain's
//! native currency (ETH / APE).

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::magic_eden::MagicEdenClient;
use super::{decimal_from_value, lenient_count, lenient_decimal, non_empty};
use crate::fetcher::{with_retry, Backoff, FetchError, RetryPolicy};
use crate::source::AssetDataSource;
use crate::types::{AssetClass, Snapshot, SocialLinks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmChain {
    Ethereum,
    ApeChain,
}

impl EvmChain {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::ApeChain => "apechain",
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        match self {
            Self::Ethereum => AssetClass::EthNft,
            Self::ApeChain => AssetClass::ApeNft,
        }
    }
}

impl fmt::Display for EvmChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

// ---------------------------------------------------------------------------
// Deserialization structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    #[serde(default)]
    collections: Vec<Collection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub name: Option<String>,
    pub image: Option<String>,
    pub external_url: Option<String>,
    pub twitter_username: Option<String>,
    pub discord_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub token_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub on_sale_count: u64,
    #[serde(default)]
    pub floor_ask: Option<FloorAsk>,
    /// Keyed by window, e.g. `"1day"`
    #[serde(default)]
    pub volume: HashMap<String, Value>,
    /// Ratio of the current floor sale to the one at the start of the window
    #[serde(default)]
    pub floor_sale_change: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FloorAsk {
    pub price: Option<AskPrice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskPrice {
    pub amount: Option<AskAmount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskAmount {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub native: Decimal,
}

fn window_value(map: &HashMap<String, Value>, key: &str) -> Decimal {
    map.get(key)
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ZERO)
}

/// Normalize the first matching collection into a snapshot
pub fn snapshot_from_collections(
    collections: Vec<Collection>,
    chain: EvmChain,
    contract: &str,
) -> Result<Snapshot, FetchError> {
    let collection = collections.into_iter().next().ok_or_else(|| {
        FetchError::NotFound(format!("no {chain} collection for contract {contract}"))
    })?;

    let floor = collection
        .floor_ask
        .as_ref()
        .and_then(|ask| ask.price.as_ref())
        .and_then(|price| price.amount.as_ref())
        .map_or(Decimal::ZERO, |amount| amount.native);
    let change_ratio = window_value(&collection.floor_sale_change, "1day");
    let price_change_24h = if change_ratio > Decimal::ZERO {
        ((change_ratio - Decimal::ONE) * dec!(100)).round_dp(2)
    } else {
        Decimal::ZERO
    };
    let listed = if collection.on_sale_count > 0 {
        collection.on_sale_count
    } else {
        collection.token_count
    };

    Ok(Snapshot {
        reference_price: floor,
        volume_24h: window_value(&collection.volume, "1day"),
        listed_or_tx_count: listed,
        price_change_24h,
        display_name: non_empty(collection.name).unwrap_or_else(|| contract.to_string()),
        image_url: non_empty(collection.image),
        social_links: SocialLinks {
            website: non_empty(collection.external_url),
            twitter: non_empty(collection.twitter_username)
                .map(|handle| format!("https://twitter.com/{handle}")),
            discord: non_empty(collection.discord_url),
            telegram: None,
        },
        market_url: Some(format!(
            "https://magiceden.io/collections/{}/{contract}",
            chain.slug()
        )),
        fetched_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct EvmNftSource {
    client: Arc<MagicEdenClient>,
    chain: EvmChain,
}

impl EvmNftSource {
    pub fn new(client: Arc<MagicEdenClient>, chain: EvmChain) -> Self {
        Self { client, chain }
    }

    async fn fetch_once(&self, contract: &str) -> Result<Snapshot, FetchError> {
        let path = format!("/v3/rtp/{}/collections/v7", self.chain.slug());
        let response: CollectionsResponse =
            self.client.get(&path, &[("contract", contract)]).await?;
        snapshot_from_collections(response.collections, self.chain, contract)
    }
}

#[async_trait]
impl AssetDataSource for EvmNftSource {
    fn asset_class(&self) -> AssetClass {
        self.chain.asset_class()
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

    const FIXTURE: &str = r#"{
        "collections": [{
            "id": "0xbd3531da5cf5857e7cfaa92426877b022e612cf8",
            "name": "Pudgy Penguins",
            "image": "https://img.reservoir.tools/pudgy.png",
            "externalUrl": "https://pudgypenguins.com",
            "twitterUsername": "pudgypenguins",
            "discordUrl": null,
            "tokenCount": "8888",
            "onSaleCount": "312",
            "floorAsk": { "price": { "amount": { "raw": "10450000000000000000", "native": 10.45 } } },
            "volume": { "1day": 388.12, "7day": 2410.5, "allTime": 900000.0 },
            "floorSaleChange": { "1day": 1.05, "7day": 0.98 }
        }]
    }"#;

    #[test]
    fn test_collection_normalized() {
        let response: CollectionsResponse = serde_json::from_str(FIXTURE).unwrap();
        let snapshot = snapshot_from_collections(
            response.collections,
            EvmChain::Ethereum,
            "0xbd3531da5cf5857e7cfaa92426877b022e612cf8",
        )
        .unwrap();

        assert_eq!(snapshot.reference_price, dec!(10.45));
        assert_eq!(snapshot.volume_24h, dec!(388.12));
        assert_eq!(snapshot.listed_or_tx_count, 312);
        assert_eq!(snapshot.price_change_24h, dec!(5));
        assert_eq!(snapshot.display_name, "Pudgy Penguins");
        assert_eq!(
            snapshot.social_links.twitter.as_deref(),
            Some("https://twitter.com/pudgypenguins")
        );
        assert!(snapshot.social_links.discord.is_none());
    }

    #[test]
    fn test_empty_collections_is_not_found() {
        let response: CollectionsResponse =
            serde_json::from_str(r#"{"collections": []}"#).unwrap();
        let err = snapshot_from_collections(response.collections, EvmChain::ApeChain, "0xdead")
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("apechain"));
    }

    #[test]
    fn test_chain_maps_to_asset_class() {
        assert_eq!(EvmChain::Ethereum.asset_class(), AssetClass::EthNft);
        assert_eq!(EvmChain::ApeChain.asset_class(), AssetClass::ApeNft);
    }
}
