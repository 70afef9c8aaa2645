//! Call desk: the set of per-class trackers behind one inbound interface
//!
//! Dispatches call creation to the right tracker and merges read views
//! across asset classes.

use persistence::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::leaderboard::{self, LeaderboardEntry};
use crate::notify::NotificationSink;
use crate::source::AssetDataSource;
use crate::tracker::{CallError, TrackerScheduler, TrackerStatus};
use crate::types::{AssetClass, Call, CallRequest, CallSummary, UnknownAssetClass};

pub struct CallDesk {
    trackers: BTreeMap<AssetClass, Arc<TrackerScheduler>>,
}

impl CallDesk {
    /// One tracker per source; a later source for the same class replaces an earlier one
    pub fn new(
        sources: Vec<Arc<dyn AssetDataSource>>,
        sink: Arc<dyn NotificationSink>,
        config: TrackerConfig,
        journal: Option<SqlitePool>,
    ) -> Self {
        let trackers = sources
            .into_iter()
            .map(|source| {
                let mut tracker = TrackerScheduler::new(source, sink.clone(), config.clone());
                if let Some(pool) = &journal {
                    tracker = tracker.with_journal(pool.clone());
                }
                (tracker.asset_class(), Arc::new(tracker))
            })
            .collect();
        Self { trackers }
    }

    pub fn tracker(&self, asset_class: AssetClass) -> Result<&Arc<TrackerScheduler>, CallError> {
        self.trackers
            .get(&asset_class)
            .ok_or_else(|| UnknownAssetClass(asset_class.to_string()).into())
    }

    pub fn asset_classes(&self) -> Vec<AssetClass> {
        self.trackers.keys().copied().collect()
    }

    pub async fn create_call(
        &self,
        asset_class: AssetClass,
        request: CallRequest,
    ) -> Result<Call, CallError> {
        self.tracker(asset_class)?.create_call(request).await
    }

    pub async fn get(&self, asset_class: AssetClass, asset_id: &str) -> Option<Call> {
        match self.trackers.get(&asset_class) {
            Some(tracker) => tracker.get(asset_id).await,
            None => None,
        }
    }

    /// Summaries for one class, or all classes in class order
    pub async fn summaries(&self, asset_class: Option<AssetClass>) -> Vec<CallSummary> {
        let mut all = Vec::new();
        for (class, tracker) in &self.trackers {
            if asset_class.map_or(true, |c| c == *class) {
                all.extend(tracker.summaries().await);
            }
        }
        all
    }

    pub async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        leaderboard::rank(self.summaries(None).await, limit)
    }

    /// Restore every tracker from the journal; returns the total restored
    pub async fn restore_all(&self) -> usize {
        let mut total = 0;
        for (class, tracker) in &self.trackers {
            match tracker.restore().await {
                Ok(0) => {}
                Ok(n) => {
                    info!(asset_class = %class, restored = n, "Restored calls from journal");
                    total += n;
                }
                Err(e) => warn!(asset_class = %class, error = %e, "Failed to restore calls"),
            }
        }
        total
    }

    /// Start every tracker's sweep loop on the runtime
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        self.trackers
            .values()
            .map(|tracker| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.run().await })
            })
            .collect()
    }

    pub fn cancel_all(&self) {
        for tracker in self.trackers.values() {
            tracker.cancel();
        }
    }

    pub async fn statuses(&self) -> Vec<TrackerStatus> {
        let mut statuses = Vec::with_capacity(self.trackers.len());
        for tracker in self.trackers.values() {
            statuses.push(tracker.status().await);
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{Backoff, FetchError, RetryPolicy};
    use crate::notify::LogSink;
    use crate::types::Snapshot;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FixedSource {
        asset_class: AssetClass,
        price: Decimal,
    }

    #[async_trait]
    impl AssetDataSource for FixedSource {
        fn asset_class(&self) -> AssetClass {
            self.asset_class
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::unbounded(Backoff::Linear(std::time::Duration::from_secs(2)))
        }

        async fn fetch_snapshot(
            &self,
            asset_id: &str,
            _chain: Option<&str>,
            _policy: &RetryPolicy,
        ) -> Result<Snapshot, FetchError> {
            Ok(Snapshot::priced(asset_id, self.price))
        }
    }

    fn desk() -> CallDesk {
        let sources: Vec<Arc<dyn AssetDataSource>> = vec![
            Arc::new(FixedSource {
                asset_class: AssetClass::Token,
                price: dec!(0.5),
            }),
            Arc::new(FixedSource {
                asset_class: AssetClass::Rune,
                price: dec!(120),
            }),
        ];
        CallDesk::new(sources, Arc::new(LogSink), TrackerConfig::default(), None)
    }

    fn request(asset_id: &str) -> CallRequest {
        CallRequest {
            asset_id: asset_id.into(),
            chain: None,
            caller_id: "42".into(),
            channel_id: "7".into(),
        }
    }

    #[tokio::test]
    async fn test_same_id_in_two_classes() {
        let desk = desk();

        desk.create_call(AssetClass::Token, request("PEPE")).await.unwrap();
        desk.create_call(AssetClass::Rune, request("PEPE")).await.unwrap();

        assert_eq!(desk.summaries(None).await.len(), 2);
        assert_eq!(desk.summaries(Some(AssetClass::Rune)).await.len(), 1);
        assert_eq!(
            desk.get(AssetClass::Rune, "PEPE").await.unwrap().baseline_price,
            dec!(120)
        );
    }

    #[tokio::test]
    async fn test_missing_tracker_is_unknown_class() {
        let desk = desk();
        let err = desk
            .create_call(AssetClass::Ordinal, request("nodemonkes"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::UnknownAssetClass(_)));
        assert!(desk.get(AssetClass::Ordinal, "nodemonkes").await.is_none());
    }

    #[tokio::test]
    async fn test_leaderboard_spans_classes() {
        let desk = desk();
        desk.create_call(AssetClass::Token, request("a")).await.unwrap();
        desk.create_call(AssetClass::Rune, request("b")).await.unwrap();

        let entries = desk.leaderboard(1).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(desk.statuses().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_trackers() {
        let desk = desk();
        let handles = desk.spawn_all();
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        desk.cancel_all();

        for handle in handles {
            handle.await.unwrap();
        }
        for status in desk.statuses().await {
            assert!(!status.running);
            assert_eq!(status.sweeps_completed, 1);
        }
    }
}
