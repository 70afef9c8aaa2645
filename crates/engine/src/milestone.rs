//! Milestone thresholds and crossing detection

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MilestoneError {
    #[error("milestone list is empty")]
    Empty,
    #[error("milestone {0} is not positive")]
    NotPositive(Decimal),
    #[error("milestones must be strictly increasing ({previous} then {next})")]
    NotIncreasing { previous: Decimal, next: Decimal },
}

/// Ordered, strictly increasing performance thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneSet(Vec<Decimal>);

impl MilestoneSet {
    pub fn new(thresholds: Vec<Decimal>) -> Result<Self, MilestoneError> {
        if thresholds.is_empty() {
            return Err(MilestoneError::Empty);
        }
        for (i, &threshold) in thresholds.iter().enumerate() {
            if threshold <= Decimal::ZERO {
                return Err(MilestoneError::NotPositive(threshold));
            }
            if i > 0 && thresholds[i - 1] >= threshold {
                return Err(MilestoneError::NotIncreasing {
                    previous: thresholds[i - 1],
                    next: threshold,
                });
            }
        }
        Ok(Self(thresholds))
    }

    /// `[2, 3, 4, 5, 10, 20, 50]`, shared by every asset class
    pub fn standard() -> Self {
        Self(vec![
            dec!(2),
            dec!(3),
            dec!(4),
            dec!(5),
            dec!(10),
            dec!(20),
            dec!(50),
        ])
    }

    pub fn thresholds(&self) -> &[Decimal] {
        &self.0
    }
}

impl Default for MilestoneSet {
    fn default() -> Self {
        Self::standard()
    }
}

/// How a threshold is read against baseline and current price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneConvention {
    /// `current / baseline`; threshold 2 means "2x"
    Multiplier,
    /// `(current - baseline) / baseline * 100`; threshold 2 means "+2%"
    PercentDelta,
}

impl MilestoneConvention {
    /// Performance of `current` against `baseline`, or `None` when the baseline is not positive
    pub fn performance(&self, baseline: Decimal, current: Decimal) -> Option<Decimal> {
        if baseline <= Decimal::ZERO {
            return None;
        }
        let ratio = current.checked_div(baseline).unwrap_or(Decimal::MAX);
        Some(match self {
            Self::Multiplier => ratio,
            Self::PercentDelta => (ratio - Decimal::ONE)
                .checked_mul(dec!(100))
                .unwrap_or(Decimal::MAX),
        })
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Multiplier => "x",
            Self::PercentDelta => "%",
        }
    }
}

/// Thresholds reached by `current` that are not yet in `achieved`, ascending.
pub fn evaluate(
    convention: MilestoneConvention,
    milestones: &MilestoneSet,
    baseline: Decimal,
    current: Decimal,
    achieved: &BTreeSet<Decimal>,
) -> Vec<Decimal> {
    let Some(performance) = convention.performance(baseline, current) else {
        return Vec::new();
    };

    milestones
        .thresholds()
        .iter()
        .take_while(|&&threshold| performance >= threshold)
        .filter(|threshold| !achieved.contains(*threshold))
        .copied()
        .collect()
}
