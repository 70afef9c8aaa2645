//! Database schema definitions

/// SQL to create all tables
/// NOTE: prices and milestones are stored as TEXT to preserve rust_decimal::Decimal precision
pub const CREATE_TABLES: &str = r#"
-- One row per call, unique within its asset class
CREATE TABLE IF NOT EXISTS calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_class TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    chain TEXT,
    display_name TEXT NOT NULL,
    caller_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    baseline_price TEXT NOT NULL,
    last_price TEXT NOT NULL,
    market_url TEXT,
    image_url TEXT,
    created_at INTEGER NOT NULL,
    last_update INTEGER NOT NULL,
    UNIQUE (asset_class, asset_id)
);

-- Achieved milestones; append-only
CREATE TABLE IF NOT EXISTS call_milestones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_class TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    milestone TEXT NOT NULL,
    achieved_at INTEGER NOT NULL,
    UNIQUE (asset_class, asset_id, milestone)
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_calls_class ON calls(asset_class, created_at);
CREATE INDEX IF NOT EXISTS idx_milestones_call ON call_milestones(asset_class, asset_id)
"#;

