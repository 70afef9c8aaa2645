//! Tracker scheduler: one per asset class
//!
//! Owns the asset class's registry and alert gate, creates calls on request
//! and sweeps every registered call on a fixed interval:
//! fetch -> evaluate milestones -> record -> gate -> notify.

use chrono::{DateTime, Utc};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::alert_gate::AlertGate;
use crate::config::TrackerConfig;
use crate::fetcher::{FetchError, RetryPolicy};
use crate::journal;
use crate::milestone::evaluate;
use crate::notify::{MilestoneHit, NotificationSink};
use crate::registry::{CallRegistry, RegistryError};
use crate::source::AssetDataSource;
use crate::types::{AssetClass, Call, CallRequest, CallSummary, UnknownAssetClass};

/// Cancellation is checked at least this often while waiting for the next tick
const CANCEL_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CallError {
    #[error("{asset_class} call for {asset_id} already exists")]
    Duplicate {
        asset_class: AssetClass,
        asset_id: String,
    },

    #[error("{asset_id} has no usable price ({price})")]
    InvalidBaseline {
        asset_id: String,
        price: Decimal,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("market data unavailable: {0}")]
    Fetch(FetchError),

    #[error(transparent)]
    UnknownAssetClass(#[from] UnknownAssetClass),
}

impl From<FetchError> for CallError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Fetch(other),
        }
    }
}

impl From<RegistryError> for CallError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Duplicate {
                asset_class,
                asset_id,
            } => Self::Duplicate {
                asset_class,
                asset_id,
            },
            RegistryError::InvalidBaseline { asset_id, price } => {
                Self::InvalidBaseline { asset_id, price }
            }
            RegistryError::WrongAssetClass { found, .. } => {
                Self::InvalidRequest(format!("call belongs to {found}"))
            }
        }
    }
}

/// Outcome of one pass over a tracker's calls
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub failed: usize,
    /// Fetched, but without a usable price
    pub skipped: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            attempted: 0,
            failed: 0,
            skipped: 0,
            alerts_sent: 0,
            alerts_suppressed: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub asset_class: AssetClass,
    pub running: bool,
    pub calls: usize,
    pub sweeps_completed: u64,
    pub last_report: Option<SweepReport>,
}

pub struct TrackerScheduler {
    source: Arc<dyn AssetDataSource>,
    sink: Arc<dyn NotificationSink>,
    config: TrackerConfig,
    registry: RwLock<CallRegistry>,
    gate: Mutex<AlertGate>,
    journal: Option<SqlitePool>,
    running: AtomicBool,
    cancelled: AtomicBool,
    sweeps_completed: AtomicU64,
    last_report: RwLock<Option<SweepReport>>,
}

impl TrackerScheduler {
    pub fn new(
        source: Arc<dyn AssetDataSource>,
        sink: Arc<dyn NotificationSink>,
        config: TrackerConfig,
    ) -> Self {
        let asset_class = source.asset_class();
        Self {
            registry: RwLock::new(CallRegistry::new(asset_class)),
            gate: Mutex::new(AlertGate::new(config.alert_cooldown)),
            source,
            sink,
            config,
            journal: None,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            sweeps_completed: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    /// Write calls and milestones through to `pool`
    pub fn with_journal(mut self, pool: SqlitePool) -> Self {
        self.journal = Some(pool);
        self
    }

    pub fn asset_class(&self) -> AssetClass {
        self.source.asset_class()
    }

    fn creation_policy(&self) -> RetryPolicy {
        self.source
            .retry_policy()
            .with_max_attempts(self.config.creation_max_attempts)
    }

    fn sweep_policy(&self) -> RetryPolicy {
        let policy = self.source.retry_policy();
        match self.config.sweep_max_elapsed {
            Some(max) => policy.with_max_elapsed(max),
            None => policy,
        }
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Fetch a baseline snapshot, register the call and announce it
    pub async fn create_call(&self, request: CallRequest) -> Result<Call, CallError> {
        let asset_class = self.asset_class();
        let request = CallRequest {
            asset_id: request.asset_id.trim().to_string(),
            chain: request
                .chain
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty()),
            ..request
        };
        if request.asset_id.is_empty() {
            return Err(CallError::InvalidRequest("asset id is empty".into()));
        }
        if self.registry.read().await.contains(&request.asset_id) {
            return Err(CallError::Duplicate {
                asset_class,
                asset_id: request.asset_id,
            });
        }

        let snapshot = self
            .source
            .fetch_snapshot(
                &request.asset_id,
                request.chain.as_deref(),
                &self.creation_policy(),
            )
            .await?;

        let call = self
            .registry
            .write()
            .await
            .create(&request, &snapshot, Utc::now())?;

        info!(
            asset_class = %asset_class,
            asset_id = %call.asset_id,
            baseline = %call.baseline_price,
            caller = %call.caller_id,
            "Call created"
        );

        if let Some(pool) = &self.journal {
            journal::save_call(pool, &call).await;
        }
        if let Err(e) = self.sink.announce_creation(&call, &snapshot).await {
            warn!(asset_class = %asset_class, asset_id = %call.asset_id, error = %e, "Failed to announce call");
        }

        Ok(call)
    }

    pub async fn get(&self, asset_id: &str) -> Option<Call> {
        self.registry.read().await.get(asset_id).cloned()
    }

    /// Snapshot of every call, in creation order
    pub async fn calls(&self) -> Vec<Call> {
        self.registry.read().await.list_all()
    }

    pub async fn summaries(&self) -> Vec<CallSummary> {
        self.calls().await.iter().map(Call::summary).collect()
    }

    /// Re-register journaled calls; returns how many were restored
    pub async fn restore(&self) -> anyhow::Result<usize> {
        let Some(pool) = &self.journal else {
            return Ok(0);
        };
        let calls = journal::load_calls(pool, self.asset_class()).await?;

        let mut registry = self.registry.write().await;
        let mut restored = 0;
        for call in calls {
            let asset_id = call.asset_id.clone();
            match registry.insert(call) {
                Ok(()) => restored += 1,
                Err(e) => warn!(asset_class = %self.asset_class(), asset_id = %asset_id, error = %e, "Skipping journaled call"),
            }
        }
        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// One pass over the calls registered at the start of the sweep.
    /// Per-call failures are logged and counted, never propagated.
    pub async fn sweep(&self) -> SweepReport {
        let asset_class = self.asset_class();
        let calls = self.registry.read().await.list_all();
        let policy = self.sweep_policy();
        let mut report = SweepReport::new(Utc::now());

        for call in &calls {
            if self.is_cancelled() {
                break;
            }
            report.attempted += 1;

            let snapshot = match self
                .source
                .fetch_snapshot(&call.asset_id, call.chain.as_deref(), &policy)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    report.failed += 1;
                    warn!(asset_class = %asset_class, asset_id = %call.asset_id, error = %e, "Failed to check call");
                    continue;
                }
            };

            let now = Utc::now();
            if !snapshot.has_price() {
                report.skipped += 1;
                debug!(asset_class = %asset_class, asset_id = %call.asset_id, price = %snapshot.reference_price, "No usable price, skipping");
                self.registry
                    .write()
                    .await
                    .touch(&call.asset_id, None, now);
                continue;
            }

            let price = snapshot.reference_price;
            let crossed = evaluate(
                self.source.convention(),
                &self.config.milestones,
                call.baseline_price,
                price,
                &call.achieved_milestones,
            );
            for milestone in crossed {
                self.handle_milestone(call, milestone, price, now, &mut report)
                    .await;
            }

            self.registry
                .write()
                .await
                .touch(&call.asset_id, Some(price), now);
            if let Some(pool) = &self.journal {
                journal::save_touch(pool, asset_class, &call.asset_id, price, now).await;
            }
        }

        report.finished_at = Utc::now();
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_report.write().await = Some(report.clone());

        info!(
            asset_class = %asset_class,
            attempted = report.attempted,
            failed = report.failed,
            skipped = report.skipped,
            alerts = report.alerts_sent,
            suppressed = report.alerts_suppressed,
            "Sweep complete"
        );
        report
    }

    /// Record the milestone, then alert unless the cooldown suppresses it.
    /// A suppressed milestone stays achieved and is never re-alerted.
    async fn handle_milestone(
        &self,
        call: &Call,
        milestone: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let asset_class = self.asset_class();
        if !self
            .registry
            .write()
            .await
            .record_milestone(&call.asset_id, milestone)
        {
            return;
        }
        if let Some(pool) = &self.journal {
            journal::save_milestone(pool, asset_class, &call.asset_id, milestone, now).await;
        }

        let key = self.config.cooldown_scope.key(&call.asset_id, milestone);
        if !self.gate.lock().await.try_consume_at(&key, now) {
            report.alerts_suppressed += 1;
            debug!(asset_class = %asset_class, asset_id = %call.asset_id, milestone = %milestone, "Alert suppressed by cooldown");
            return;
        }

        let convention = self.source.convention();
        info!(
            asset_class = %asset_class,
            asset_id = %call.asset_id,
            milestone = %format!("{}{}", milestone.normalize(), convention.suffix()),
            price = %price,
            "Milestone reached"
        );
        report.alerts_sent += 1;

        let hit = MilestoneHit {
            milestone,
            convention,
            current_price: price,
        };
        if let Err(e) = self.sink.announce_milestone(call, &hit).await {
            warn!(asset_class = %asset_class, asset_id = %call.asset_id, error = %e, "Failed to send milestone alert");
        }
    }

    /// Sweep every `sweep_interval` until cancelled
    pub async fn run(&self) {
        let asset_class = self.asset_class();
        self.running.store(true, Ordering::Relaxed);
        info!(
            asset_class = %asset_class,
            interval_secs = self.config.sweep_interval.as_secs(),
            "Tracker starting"
        );

        let mut next_tick = Instant::now() + self.config.sweep_interval;
        loop {
            if !self.wait_until(next_tick).await {
                break;
            }
            let started = Instant::now();
            self.sweep().await;
            next_tick = (started + self.config.sweep_interval).max(Instant::now());
        }

        self.running.store(false, Ordering::Relaxed);
        info!(asset_class = %asset_class, "Tracker stopped");
    }

    /// Sleep until `deadline` in short chunks; false if cancelled meanwhile
    async fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep((deadline - now).min(CANCEL_POLL)).await;
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> TrackerStatus {
        TrackerStatus {
            asset_class: self.asset_class(),
            running: self.running.load(Ordering::Relaxed),
            calls: self.registry.read().await.len(),
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            last_report: self.last_report.read().await.clone(),
        }
    }
}
