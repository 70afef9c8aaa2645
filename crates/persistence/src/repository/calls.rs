//! Calls repository: write-through journal for tracked calls and their milestones

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted call
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CallRecord {
    pub id: Option<i64>,
    pub asset_class: String,
    pub asset_id: String,
    pub chain: Option<String>,
    pub display_name: String,
    pub caller_id: String,
    pub channel_id: String,
    pub baseline_price: String,
    pub last_price: String,
    pub market_url: Option<String>,
    pub image_url: Option<String>,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub last_update: i64,
}

/// A milestone reached by a call
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MilestoneRecord {
    pub asset_class: String,
    pub asset_id: String,
    pub milestone: String,
    pub achieved_at: i64,
}

/// Repository for call journal data
pub struct CallRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CallRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a call. Returns false if the (asset_class, asset_id) pair already exists.
    pub async fn save_call(&self, record: &CallRecord) -> DbResult<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO calls
                (asset_class, asset_id, chain, display_name, caller_id, channel_id,
                 baseline_price, last_price, market_url, image_url, created_at, last_update)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.asset_class)
        .bind(&record.asset_id)
        .bind(&record.chain)
        .bind(&record.display_name)
        .bind(&record.caller_id)
        .bind(&record.channel_id)
        .bind(&record.baseline_price)
        .bind(&record.last_price)
        .bind(&record.market_url)
        .bind(&record.image_url)
        .bind(record.created_at)
        .bind(record.last_update)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record an achieved milestone (idempotent). Returns true if it was new.
    pub async fn add_milestone(
        &self,
        asset_class: &str,
        asset_id: &str,
        milestone: &str,
        achieved_at: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO call_milestones (asset_class, asset_id, milestone, achieved_at)
               VALUES (?1, ?2, ?3, ?4)"#,
        )
        .bind(asset_class)
        .bind(asset_id)
        .bind(milestone)
        .bind(achieved_at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Refresh the last observed price and update time of a call
    pub async fn touch(
        &self,
        asset_class: &str,
        asset_id: &str,
        last_price: &str,
        last_update: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE calls SET last_price = ?3, last_update = ?4 WHERE asset_class = ?1 AND asset_id = ?2",
        )
        .bind(asset_class)
        .bind(asset_id)
        .bind(last_price)
        .bind(last_update)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// All calls of one asset class, in creation order
    pub async fn load_calls(&self, asset_class: &str) -> DbResult<Vec<CallRecord>> {
        let records = sqlx::query_as::<_, CallRecord>(
            "SELECT * FROM calls WHERE asset_class = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(asset_class)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// All milestones of one asset class
    pub async fn load_milestones(&self, asset_class: &str) -> DbResult<Vec<MilestoneRecord>> {
        let records = sqlx::query_as::<_, MilestoneRecord>(
            r#"SELECT asset_class, asset_id, milestone, achieved_at FROM call_milestones
               WHERE asset_class = ?1 ORDER BY achieved_at ASC, id ASC"#,
        )
        .bind(asset_class)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count_calls(&self) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM calls")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn record(asset_class: &str, asset_id: &str, created_at: i64) -> CallRecord {
        CallRecord {
            id: None,
            asset_class: asset_class.into(),
            asset_id: asset_id.into(),
            chain: None,
            display_name: asset_id.to_uppercase(),
            caller_id: "42".into(),
            channel_id: "7".into(),
            baseline_price: "0.0015".into(),
            last_price: "0.0015".into(),
            market_url: None,
            image_url: None,
            created_at,
            last_update: created_at,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_in_creation_order() {
        let db = Database::in_memory().await.unwrap();
        let repo = CallRepository::new(db.pool());

        assert!(repo.save_call(&record("token", "b", 2_000)).await.unwrap());
        assert!(repo.save_call(&record("token", "a", 1_000)).await.unwrap());
        assert!(repo.save_call(&record("rune", "a", 500)).await.unwrap());

        let tokens = repo.load_calls("token").await.unwrap();
        let ids: Vec<_> = tokens.iter().map(|c| c.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(tokens[0].baseline_price, "0.0015");
        assert_eq!(repo.count_calls().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_call_is_ignored() {
        let db = Database::in_memory().await.unwrap();
        let repo = CallRepository::new(db.pool());

        assert!(repo.save_call(&record("token", "a", 1_000)).await.unwrap());
        assert!(!repo.save_call(&record("token", "a", 5_000)).await.unwrap());

        let tokens = repo.load_calls("token").await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].created_at, 1_000);
    }

    #[tokio::test]
    async fn test_milestones_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let repo = CallRepository::new(db.pool());
        repo.save_call(&record("ordinal", "nodemonkes", 1_000)).await.unwrap();

        assert!(repo.add_milestone("ordinal", "nodemonkes", "2", 10).await.unwrap());
        assert!(!repo.add_milestone("ordinal", "nodemonkes", "2", 20).await.unwrap());
        assert!(repo.add_milestone("ordinal", "nodemonkes", "3", 30).await.unwrap());

        let milestones = repo.load_milestones("ordinal").await.unwrap();
        let values: Vec<_> = milestones.iter().map(|m| m.milestone.as_str()).collect();
        assert_eq!(values, vec!["2", "3"]);
        assert!(repo.load_milestones("token").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_touch_updates_price_and_time() {
        let db = Database::in_memory().await.unwrap();
        let repo = CallRepository::new(db.pool());
        repo.save_call(&record("token", "a", 1_000)).await.unwrap();

        repo.touch("token", "a", "0.0045", 61_000).await.unwrap();

        let calls = repo.load_calls("token").await.unwrap();
        assert_eq!(calls[0].last_price, "0.0045");
        assert_eq!(calls[0].last_update, 61_000);
        assert_eq!(calls[0].baseline_price, "0.0015");
    }
}
