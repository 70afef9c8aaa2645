//! Magic Eden API client shared by the NFT, rune and ordinal adapters
//!
//! All Magic Eden traffic goes through one paced fetcher so the adapters
//! together stay under the account-wide quota.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::fetcher::{FetchError, PacingConfig, RateLimitedFetcher};

pub const BASE_URL: &str = "https://api-mainnet.magiceden.dev";
const PACING: PacingConfig = PacingConfig {
    min_spacing: Duration::from_millis(500),
    per_minute: Some(120),
};

/// Paced Magic Eden client, optionally authenticated with an API key
pub struct MagicEdenClient {
    fetcher: RateLimitedFetcher,
}

impl MagicEdenClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            fetcher: RateLimitedFetcher::new("magic_eden", PACING).with_bearer(api_key),
        }
    }

    pub fn name(&self) -> &str {
        self.fetcher.name()
    }

    /// GET `{BASE_URL}{path}`
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{BASE_URL}{path}");
        self.fetcher.get_json(&url, query).await
    }
}

/// Per-asset cache for cosmetic metadata (names, images, links).
///
/// Metadata never blocks a price read: a failed lookup is logged and the
/// caller falls back to defaults. Only successful lookups and definite
/// "not found" answers are cached.
pub struct MetadataCache<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T: Clone + Default> MetadataCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, source: &str, asset_id: &str, fetch: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        if let Some(hit) = self.entries.lock().await.get(asset_id) {
            return hit.clone();
        }

        let value = match fetch().await {
            Ok(value) => value,
            Err(e) if e.is_not_found() => T::default(),
            Err(e) => {
                debug!(source, asset_id, error = %e, "Metadata lookup failed");
                return T::default();
            }
        };
        self.entries
            .lock()
            .await
            .insert(asset_id.to_string(), value.clone());
        value
    }
}

impl<T: Clone + Default> Default for MetadataCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
