//! Market-data port implemented by every provider adapter

use async_trait::async_trait;

use crate::fetcher::{FetchError, RetryPolicy};
use crate::milestone::MilestoneConvention;
use crate::types::{AssetClass, Snapshot};

/// Fetches a normalized [`Snapshot`] for one asset of one asset class.
///
/// Implementations own their pacing and rate-limit backoff; the caller picks
/// how long to keep retrying by bounding the policy returned from
/// [`AssetDataSource::retry_policy`].
#[async_trait]
pub trait AssetDataSource: Send + Sync {
    fn asset_class(&self) -> AssetClass;

    /// How milestone thresholds are read for this asset class
    fn convention(&self) -> MilestoneConvention {
        MilestoneConvention::Multiplier
    }

    /// Unbounded retry policy carrying this provider's backoff settings
    fn retry_policy(&self) -> RetryPolicy;

    async fn fetch_snapshot(
        &self,
        asset_id: &str,
        chain: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<Snapshot, FetchError>;
}
