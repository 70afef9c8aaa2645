//! Leaderboard: rank calls across all asset classes by performance since the call
//!
//! Ranking uses `last_price / baseline_price`, the price seen by the most recent
//! successful sweep against the price at call time.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::CallSummary;

pub const DEFAULT_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    /// `last_price / baseline_price`
    pub multiple: Decimal,
    /// `(multiple - 1) * 100`
    pub pnl_pct: Decimal,
    pub call: CallSummary,
}

fn multiple(summary: &CallSummary) -> Decimal {
    if summary.baseline_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    summary
        .last_price
        .checked_div(summary.baseline_price)
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Best `limit` calls by multiple, descending; ties go to the earlier call
pub fn rank(summaries: Vec<CallSummary>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut scored: Vec<(Decimal, CallSummary)> = summaries
        .into_iter()
        .map(|summary| (multiple(&summary), summary))
        .collect();

    scored.sort_by(|(ma, a), (mb, b)| {
        mb.cmp(ma)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });

    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (multiple, call))| LeaderboardEntry {
            rank: i + 1,
            pnl_pct: ((multiple - Decimal::ONE) * dec!(100)).round_dp(2),
            multiple: multiple.round_dp(4),
            call,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
