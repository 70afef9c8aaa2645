//! Core types shared by the trackers, adapters and read models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Asset classes, one tracker each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Token,
    SolanaNft,
    EthNft,
    ApeNft,
    Rune,
    Ordinal,
}

impl AssetClass {
    pub const ALL: [AssetClass; 6] = [
        Self::Token,
        Self::SolanaNft,
        Self::EthNft,
        Self::ApeNft,
        Self::Rune,
        Self::Ordinal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::SolanaNft => "solana_nft",
            Self::EthNft => "eth_nft",
            Self::ApeNft => "ape_nft",
            Self::Rune => "rune",
            Self::Ordinal => "ordinal",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Token => "Token",
            Self::SolanaNft => "Solana NFT",
            Self::EthNft => "ETH NFT",
            Self::ApeNft => "APE NFT",
            Self::Rune => "Rune",
            Self::Ordinal => "Ordinal",
        }
    }

    /// Unit the reference price is quoted in
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Token => "USD",
            Self::SolanaNft => "SOL",
            Self::EthNft => "ETH",
            Self::ApeNft => "APE",
            Self::Rune => "sats",
            Self::Ordinal => "BTC",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown asset class: {0}")]
pub struct UnknownAssetClass(pub String);

impl FromStr for AssetClass {
    type Err = UnknownAssetClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "token" | "tokens" => Ok(Self::Token),
            "solana_nft" | "sol_nft" | "nft" => Ok(Self::SolanaNft),
            "eth_nft" | "ethereum_nft" => Ok(Self::EthNft),
            "ape_nft" | "apechain_nft" => Ok(Self::ApeNft),
            "rune" | "runes" => Ok(Self::Rune),
            "ordinal" | "ordinals" => Ok(Self::Ordinal),
            other => Err(UnknownAssetClass(other.to_string())),
        }
    }
}

/// Social and project links attached to a snapshot (all optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub discord: Option<String>,
    pub telegram: Option<String>,
}

impl SocialLinks {
    pub fn is_empty(&self) -> bool {
        self.website.is_none()
            && self.twitter.is_none()
            && self.discord.is_none()
            && self.telegram.is_none()
    }
}

/// A normalized read of one asset's market metrics from one provider.
///
/// Fields a provider does not supply are zero / `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub reference_price: Decimal,
    pub volume_24h: Decimal,
    pub listed_or_tx_count: u64,
    /// Percent, e.g. 12.5 = +12.5%
    pub price_change_24h: Decimal,
    pub display_name: String,
    pub image_url: Option<String>,
    pub social_links: SocialLinks,
    /// Marketplace / chart page for the asset
    pub market_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Snapshot with only a price and name; everything else defaulted
    pub fn priced(display_name: impl Into<String>, reference_price: Decimal) -> Self {
        Self {
            reference_price,
            volume_24h: Decimal::ZERO,
            listed_or_tx_count: 0,
            price_change_24h: Decimal::ZERO,
            display_name: display_name.into(),
            image_url: None,
            social_links: SocialLinks::default(),
            market_url: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn has_price(&self) -> bool {
        self.reference_price > Decimal::ZERO
    }
}

/// Inbound request to start tracking an asset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub asset_id: String,
    #[serde(default)]
    pub chain: Option<String>,
    pub caller_id: String,
    pub channel_id: String,
}

/// One tracked asset within one asset class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub asset_class: AssetClass,
    pub asset_id: String,
    pub chain: Option<String>,
    pub display_name: String,
    /// Fixed at creation
    pub baseline_price: Decimal,
    /// Price seen by the latest successful sweep
    pub last_price: Decimal,
    pub caller_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Only ever grows
    pub achieved_milestones: BTreeSet<Decimal>,
    pub market_url: Option<String>,
    pub image_url: Option<String>,
}

impl Call {
    pub fn summary(&self) -> CallSummary {
        CallSummary {
            asset_class: self.asset_class,
            asset_id: self.asset_id.clone(),
            display_name: self.display_name.clone(),
            baseline_price: self.baseline_price,
            last_price: self.last_price,
            caller_id: self.caller_id.clone(),
            created_at: self.created_at,
            last_update: self.last_update,
            achieved_milestones: self.achieved_milestones.iter().copied().collect(),
        }
    }
}

/// Read-only view of a call handed to reporting consumers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub asset_class: AssetClass,
    pub asset_id: String,
    pub display_name: String,
    pub baseline_price: Decimal,
    pub last_price: Decimal,
    pub caller_id: String,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub achieved_milestones: Vec<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_class_round_trips_through_str() {
        for class in AssetClass::ALL {
            assert_eq!(class.as_str().parse::<AssetClass>().unwrap(), class);
        }
    }

    #[test]
    fn test_asset_class_aliases() {
        assert_eq!("Runes".parse::<AssetClass>().unwrap(), AssetClass::Rune);
        assert_eq!("eth-nft".parse::<AssetClass>().unwrap(), AssetClass::EthNft);
        assert!("stocks".parse::<AssetClass>().is_err());
    }
}
