//! Market-data adapters, one per asset class
//!
//! - DexScreener for fungible tokens
//! - Magic Eden for Solana / Ethereum / ApeChain collections, runes and ordinals

pub mod dexscreener;
pub mod evm_nft;
pub mod magic_eden;
pub mod ordinals;
pub mod runes;
pub mod solana_nft;

pub use dexscreener::TokenSource;
pub use evm_nft::{EvmChain, EvmNftSource};
pub use magic_eden::MagicEdenClient;
pub use ordinals::OrdinalSource;
pub use runes::RuneSource;
pub use solana_nft::SolanaNftSource;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::source::AssetDataSource;

/// One adapter per asset class; the five Magic Eden adapters share one paced client
pub fn default_sources(magic_eden_api_key: Option<&str>) -> Vec<Arc<dyn AssetDataSource>> {
    let magic_eden = Arc::new(MagicEdenClient::new(magic_eden_api_key));

    vec![
        Arc::new(TokenSource::new()),
        Arc::new(SolanaNftSource::new(magic_eden.clone())),
        Arc::new(EvmNftSource::new(magic_eden.clone(), EvmChain::Ethereum)),
        Arc::new(EvmNftSource::new(magic_eden.clone(), EvmChain::ApeChain)),
        Arc::new(RuneSource::new(magic_eden.clone())),
        Arc::new(OrdinalSource::new(magic_eden)),
    ]
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Providers send prices as numbers, numeric strings, or scientific notation
pub(crate) fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Missing, null or unparseable values decode as zero
pub(crate) fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ZERO))
}

/// Counts arrive as numbers or numeric strings
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// `null` decodes the same as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Treat empty strings as absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
