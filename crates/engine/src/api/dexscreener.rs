//! DexScreener client for fungible tokens, public endpoints, no authentication
//!
//! Uses `GET /latest/dex/tokens/{address}` and keeps the pair with the deepest
//! liquidity (optionally restricted to one chain).

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::{lenient_count, lenient_decimal, non_empty, null_as_default};
use crate::fetcher::{
    with_retry, Backoff, FetchError, PacingConfig, RateLimitedFetcher, RetryPolicy,
};
use crate::source::AssetDataSource;
use crate::types::{AssetClass, Snapshot, SocialLinks};

const BASE_URL: &str = "https://api.dexscreener.com";
const PACING: PacingConfig = PacingConfig {
    min_spacing: Duration::from_millis(200),
    per_minute: Some(300),
};

// ---------------------------------------------------------------------------
// Deserialization structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokensResponse {
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    #[serde(default, deserialize_with = "null_as_default")]
    pub chain_id: String,
    pub pair_address: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub base_token: Option<BaseToken>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_usd: Decimal,
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
    #[serde(default)]
    pub volume: Option<Window24h>,
    #[serde(default)]
    pub price_change: Option<Window24h>,
    #[serde(default)]
    pub txns: Option<Txns>,
    #[serde(default)]
    pub info: Option<PairInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseToken {
    pub address: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Liquidity {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub usd: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Window24h {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub h24: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Txns {
    #[serde(default, deserialize_with = "null_as_default")]
    pub h24: TxnCount,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxnCount {
    #[serde(default, deserialize_with = "lenient_count")]
    pub buys: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub sells: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInfo {
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub websites: Vec<Website>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub socials: Vec<Social>,
}

/// Cosmetic only: every field may be absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Website {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Social {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

impl Pair {
    fn liquidity_usd(&self) -> Decimal {
        self.liquidity.as_ref().map_or(Decimal::ZERO, |l| l.usd)
    }
}

/// Pick the most liquid pair on `chain` (any chain when `None`) and normalize it.
pub fn snapshot_from_pairs(
    pairs: Option<Vec<Pair>>,
    token_address: &str,
    chain: Option<&str>,
) -> Result<Snapshot, FetchError> {
    let pairs = pairs.unwrap_or_default();
    let main_pair = pairs
        .into_iter()
        .filter(|pair| chain.map_or(true, |c| pair.chain_id.eq_ignore_ascii_case(c)))
        .max_by(|a, b| a.liquidity_usd().cmp(&b.liquidity_usd()))
        .ok_or_else(|| match chain {
            Some(c) => FetchError::NotFound(format!("no {c} pairs for token {token_address}")),
            None => FetchError::NotFound(format!("no pairs for token {token_address}")),
        })?;

    let base_token = main_pair.base_token.clone().unwrap_or_default();
    let display_name = non_empty(base_token.symbol)
        .or_else(|| non_empty(base_token.name))
        .unwrap_or_else(|| token_address.to_string());
    let txns = main_pair.txns.clone().unwrap_or_default().h24;
    let info = main_pair.info.clone().unwrap_or_default();

    let mut social_links = SocialLinks {
        website: info
            .websites
            .iter()
            .find_map(|w| non_empty(w.url.clone())),
        ..SocialLinks::default()
    };
    for social in &info.socials {
        let (Some(kind), Some(url)) = (social.kind.as_deref(), non_empty(social.url.clone())) else {
            continue;
        };
        let slot = match kind.to_lowercase().as_str() {
            "twitter" | "x" => &mut social_links.twitter,
            "discord" => &mut social_links.discord,
            "telegram" => &mut social_links.telegram,
            _ => continue,
        };
        slot.get_or_insert(url);
    }

    let market_url = non_empty(main_pair.url.clone()).or_else(|| {
        let pair_address = non_empty(main_pair.pair_address.clone())?;
        if main_pair.chain_id.is_empty() {
            return None;
        }
        Some(format!(
            "https://dexscreener.com/{}/{pair_address}",
            main_pair.chain_id
        ))
    });

    Ok(Snapshot {
        reference_price: main_pair.price_usd,
        volume_24h: main_pair.volume.map_or(Decimal::ZERO, |v| v.h24),
        listed_or_tx_count: txns.buys + txns.sells,
        price_change_24h: main_pair.price_change.map_or(Decimal::ZERO, |c| c.h24),
        display_name,
        image_url: non_empty(info.image_url),
        social_links,
        market_url,
        fetched_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// DexScreener-backed source for the token tracker
pub struct TokenSource {
    fetcher: RateLimitedFetcher,
}

impl TokenSource {
    pub fn new() -> Self {
        Self {
            fetcher: RateLimitedFetcher::new("dexscreener", PACING),
        }
    }

    async fn fetch_once(
        &self,
        token_address: &str,
        chain: Option<&str>,
    ) -> Result<Snapshot, FetchError> {
        let url = format!("{BASE_URL}/latest/dex/tokens/{token_address}");
        let response: TokensResponse = self.fetcher.get_json(&url, &[]).await?;
        snapshot_from_pairs(response.pairs, token_address, chain)
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetDataSource for TokenSource {
    fn asset_class(&self) -> AssetClass {
        AssetClass::Token
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(Backoff::Linear(Duration::from_secs(2)))
    }

    async fn fetch_snapshot(
        &self,
        asset_id: &str,
        chain: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<Snapshot, FetchError> {
        with_retry(self.fetcher.name(), policy, asset_id, || {
            self.fetch_once(asset_id, chain)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::classify_response;
    use rust_decimal_macros::dec;

    const FIXTURE: &str = r#"{
        "schemaVersion": "1.0.0",
        "pairs": [
            {
                "chainId": "solana",
                "dexId": "raydium",
                "url": "https://dexscreener.com/solana/pairsmall",
                "pairAddress": "pairsmall",
                "baseToken": { "address": "Tok", "name": "Bonk", "symbol": "BONK" },
                "priceUsd": "0.00002100",
                "txns": { "h24": { "buys": 10, "sells": 5 } },
                "volume": { "h24": 1200.5 },
                "priceChange": { "h24": -3.2 },
                "liquidity": { "usd": 5000 }
            },
            {
                "chainId": "solana",
                "dexId": "orca",
                "url": "https://dexscreener.com/solana/pairdeep",
                "pairAddress": "pairdeep",
                "baseToken": { "address": "Tok", "name": "Bonk", "symbol": "BONK" },
                "priceUsd": "0.00002315",
                "txns": { "h24": { "buys": 812, "sells": 640 } },
                "volume": { "h24": 981234.12 },
                "priceChange": { "h24": 12.5 },
                "liquidity": { "usd": 750000.25 },
                "info": {
                    "imageUrl": "https://cdn.dexscreener.com/bonk.png",
                    "websites": [{ "label": "Website", "url": "https://bonkcoin.com" }],
                    "socials": [
                        { "type": "twitter", "url": "https://x.com/bonk_inu" },
                        { "type": "telegram", "url": "https://t.me/bonk" }
                    ]
                }
            },
            {
                "chainId": "base",
                "dexId": "uniswap",
                "pairAddress": "pairbase",
                "baseToken": { "address": "Tok", "symbol": "BONK" },
                "priceUsd": "0.0000229",
                "liquidity": { "usd": 9000000 }
            }
        ]
    }"#;

    fn fixture_pairs() -> Option<Vec<Pair>> {
        serde_json::from_str::<TokensResponse>(FIXTURE).unwrap().pairs
    }

    #[test]
    fn test_picks_deepest_pair_on_chain() {
        let snapshot = snapshot_from_pairs(fixture_pairs(), "Tok", Some("Solana")).unwrap();

        assert_eq!(snapshot.reference_price, dec!(0.00002315));
        assert_eq!(snapshot.volume_24h, dec!(981234.12));
        assert_eq!(snapshot.price_change_24h, dec!(12.5));
        assert_eq!(snapshot.listed_or_tx_count, 1452);
        assert_eq!(snapshot.display_name, "BONK");
        assert_eq!(
            snapshot.market_url.as_deref(),
            Some("https://dexscreener.com/solana/pairdeep")
        );
        assert_eq!(snapshot.social_links.twitter.as_deref(), Some("https://x.com/bonk_inu"));
        assert_eq!(snapshot.social_links.website.as_deref(), Some("https://bonkcoin.com"));
        assert!(snapshot.social_links.discord.is_none());
    }

    #[test]
    fn test_without_chain_picks_deepest_overall() {
        let snapshot = snapshot_from_pairs(fixture_pairs(), "Tok", None).unwrap();

        assert_eq!(snapshot.reference_price, dec!(0.0000229));
        assert_eq!(
            snapshot.market_url.as_deref(),
            Some("https://dexscreener.com/base/pairbase")
        );
        assert_eq!(snapshot.listed_or_tx_count, 0);
    }

    #[test]
    fn test_partial_cosmetic_info_still_prices() {
        let body = r#"{
            "pairs": [{
                "chainId": "solana",
                "baseToken": null,
                "priceUsd": "1.5",
                "txns": { "h24": null },
                "info": {
                    "imageUrl": null,
                    "websites": null,
                    "socials": [
                        { "type": "twitter", "handle": "bonk" },
                        { "type": "telegram", "url": "https://t.me/bonk" }
                    ]
                }
            }]
        }"#;
        let response: TokensResponse =
            classify_response("dex", reqwest::StatusCode::OK, body).unwrap();
        let snapshot = snapshot_from_pairs(response.pairs, "Tok", None).unwrap();

        assert_eq!(snapshot.reference_price, dec!(1.5));
        assert_eq!(snapshot.display_name, "Tok");
        assert!(snapshot.social_links.website.is_none());
        assert!(snapshot.social_links.twitter.is_none());
        assert_eq!(snapshot.social_links.telegram.as_deref(), Some("https://t.me/bonk"));
        assert!(snapshot.market_url.is_none());
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let response: TokensResponse =
            serde_json::from_str(r#"{"schemaVersion":"1.0.0","pairs":null}"#).unwrap();
        let err = snapshot_from_pairs(response.pairs, "Nope", None).unwrap_err();
        assert!(err.is_not_found());

        let err = snapshot_from_pairs(fixture_pairs(), "Tok", Some("ethereum")).unwrap_err();
        assert!(err.is_not_found());
    }
}
