//! Call Tracker Engine: price-milestone tracking for community "calls"
//!
//! Provides:
//! - Market-data adapters for tokens, NFT collections, runes and ordinals
//! - Per-asset-class tracker schedulers with milestone detection and alert cooldowns
//! - Best-effort write-through journal for restart recovery
//! - Cross-class leaderboard

pub mod alert_gate;
pub mod api;
pub mod config;
pub mod desk;
pub mod fetcher;
pub mod journal;
pub mod leaderboard;
pub mod milestone;
pub mod notify;
pub mod registry;
pub mod source;
pub mod tracker;
pub mod types;

// Re-exports for convenience
pub use alert_gate::{AlertGate, CooldownScope, DEFAULT_ALERT_COOLDOWN};
pub use api::default_sources;
pub use config::{
    TrackerConfig, DEFAULT_CREATION_MAX_ATTEMPTS, DEFAULT_SWEEP_INTERVAL, DEFAULT_SWEEP_MAX_ELAPSED,
};
pub use desk::CallDesk;
pub use fetcher::{Backoff, FetchError, PacingConfig, RetryPolicy};
pub use leaderboard::{rank, LeaderboardEntry};
pub use milestone::{MilestoneConvention, MilestoneError, MilestoneSet};
pub use notify::{DiscordWebhookSink, LogSink, MilestoneHit, NotificationSink};
pub use registry::{CallRegistry, RegistryError};
pub use source::AssetDataSource;
pub use tracker::{CallError, SweepReport, TrackerScheduler, TrackerStatus};
pub use types::*;
