//! Write-through journal glue between the trackers and `persistence`
//!
//! Journal writes are best effort: failures are logged and tracking goes on.

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use persistence::{CallRecord, CallRepository, MilestoneRecord, SqlitePool};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::warn;

use crate::types::{AssetClass, Call};

pub fn to_record(call: &Call) -> CallRecord {
    CallRecord {
        id: None,
        asset_class: call.asset_class.as_str().to_string(),
        asset_id: call.asset_id.clone(),
        chain: call.chain.clone(),
        display_name: call.display_name.clone(),
        caller_id: call.caller_id.clone(),
        channel_id: call.channel_id.clone(),
        baseline_price: call.baseline_price.to_string(),
        last_price: call.last_price.to_string(),
        market_url: call.market_url.clone(),
        image_url: call.image_url.clone(),
        created_at: call.created_at.timestamp_millis(),
        last_update: call.last_update.timestamp_millis(),
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid timestamp {ms}"))
}

/// Rebuild a call from its journal row and achieved milestones
pub fn from_record(record: CallRecord, milestones: &[MilestoneRecord]) -> Result<Call> {
    let asset_class = AssetClass::from_str(&record.asset_class)?;
    let baseline_price = Decimal::from_str(&record.baseline_price)?;
    let last_price = Decimal::from_str(&record.last_price).unwrap_or(baseline_price);

    let achieved_milestones = milestones
        .iter()
        .filter_map(|m| Decimal::from_str(&m.milestone).ok())
        .collect::<BTreeSet<_>>();

    Ok(Call {
        asset_class,
        asset_id: record.asset_id,
        chain: record.chain,
        display_name: record.display_name,
        baseline_price,
        last_price,
        caller_id: record.caller_id,
        channel_id: record.channel_id,
        created_at: from_millis(record.created_at)?,
        last_update: from_millis(record.last_update)?,
        achieved_milestones,
        market_url: record.market_url,
        image_url: record.image_url,
    })
}

/// Load every journaled call of `asset_class`, in creation order.
/// Rows that no longer decode are skipped with a warning.
pub async fn load_calls(pool: &SqlitePool, asset_class: AssetClass) -> Result<Vec<Call>> {
    let repo = CallRepository::new(pool);
    let records = repo.load_calls(asset_class.as_str()).await?;
    let milestones = repo.load_milestones(asset_class.as_str()).await?;

    let mut by_asset: HashMap<String, Vec<MilestoneRecord>> = HashMap::new();
    for m in milestones {
        by_asset.entry(m.asset_id.clone()).or_default().push(m);
    }

    let mut calls = Vec::with_capacity(records.len());
    for record in records {
        let asset_id = record.asset_id.clone();
        let achieved = by_asset.remove(&asset_id).unwrap_or_default();
        match from_record(record, &achieved) {
            Ok(call) => calls.push(call),
            Err(e) => warn!(asset_class = %asset_class, asset_id = %asset_id, error = %e, "Skipping journal row"),
        }
    }
    Ok(calls)
}

pub async fn save_call(pool: &SqlitePool, call: &Call) {
    if let Err(e) = CallRepository::new(pool).save_call(&to_record(call)).await {
        warn!(asset_class = %call.asset_class, asset_id = %call.asset_id, error = %e, "Failed to journal call");
    }
}

pub async fn save_milestone(
    pool: &SqlitePool,
    asset_class: AssetClass,
    asset_id: &str,
    milestone: Decimal,
    achieved_at: DateTime<Utc>,
) {
    let result = CallRepository::new(pool)
        .add_milestone(
            asset_class.as_str(),
            asset_id,
            &milestone.normalize().to_string(),
            achieved_at.timestamp_millis(),
        )
        .await;
    if let Err(e) = result {
        warn!(asset_class = %asset_class, asset_id, error = %e, "Failed to journal milestone");
    }
}

pub async fn save_touch(
    pool: &SqlitePool,
    asset_class: AssetClass,
    asset_id: &str,
    last_price: Decimal,
    last_update: DateTime<Utc>,
) {
    let result = CallRepository::new(pool)
        .touch(
            asset_class.as_str(),
            asset_id,
            &last_price.to_string(),
            last_update.timestamp_millis(),
        )
        .await;
    if let Err(e) = result {
        warn!(asset_class = %asset_class, asset_id, error = %e, "Failed to journal update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::Database;
    use rust_decimal_macros::dec;

    fn call() -> Call {
        let created = Utc.timestamp_millis_opt(1_760_000_000_123).unwrap();
        Call {
            asset_class: AssetClass::Token,
            asset_id: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".into(),
            chain: Some("solana".into()),
            display_name: "BONK".into(),
            baseline_price: dec!(0.000000000123),
            last_price: dec!(0.000000000150),
            caller_id: "42".into(),
            channel_id: "7".into(),
            created_at: created,
            last_update: created,
            achieved_milestones: BTreeSet::new(),
            market_url: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_journal_restores_call_with_milestones() {
        let db = Database::in_memory().await.unwrap();
        let original = call();

        save_call(db.pool(), &original).await;
        save_milestone(db.pool(), AssetClass::Token, &original.asset_id, dec!(2.0), Utc::now()).await;
        save_milestone(db.pool(), AssetClass::Token, &original.asset_id, dec!(3), Utc::now()).await;
        save_milestone(db.pool(), AssetClass::Token, &original.asset_id, dec!(2), Utc::now()).await;

        let restored = load_calls(db.pool(), AssetClass::Token).await.unwrap();
        assert_eq!(restored.len(), 1);
        let call = &restored[0];
        assert_eq!(call.baseline_price, dec!(0.000000000123));
        assert_eq!(call.last_price, dec!(0.00000000015));
        assert_eq!(call.created_at, original.created_at);
        assert_eq!(call.achieved_milestones, BTreeSet::from([dec!(2), dec!(3)]));

        assert!(load_calls(db.pool(), AssetClass::Rune).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_touch_updates_last_price() {
        let db = Database::in_memory().await.unwrap();
        let original = call();
        save_call(db.pool(), &original).await;

        let later = original.created_at + chrono::Duration::minutes(3);
        save_touch(db.pool(), AssetClass::Token, &original.asset_id, dec!(0.0000000005), later).await;

        let restored = load_calls(db.pool(), AssetClass::Token).await.unwrap();
        assert_eq!(restored[0].last_price, dec!(0.0000000005));
        assert_eq!(restored[0].last_update, later);
    }

    #[test]
    fn test_unknown_asset_class_row_is_rejected() {
        let mut record = to_record(&call());
        record.asset_class = "stocks".into();
        assert!(from_record(record, &[]).is_err());
    }
}
