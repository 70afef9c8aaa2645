//! Call Tracker: price-milestone alerts for community calls
//!
//! Usage:
//!   call-tracker serve --port 3002                 : Run the trackers and the control API
//!   call-tracker snapshot --class token --asset X  : Fetch one snapshot and print it

mod config;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::{Parser, Subcommand};
use engine::{
    default_sources, leaderboard, AssetClass, CallDesk, CallError, CallRequest,
    DiscordWebhookSink, LogSink, NotificationSink, DEFAULT_CREATION_MAX_ATTEMPTS,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::AppConfig;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "call-tracker")]
#[command(about = "Tracks community calls and alerts on price milestones", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every tracker and the HTTP control API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3002)]
        port: u16,
        /// Keep calls in memory only (no journal)
        #[arg(long)]
        no_persist: bool,
    },
    /// Fetch a single market snapshot and print it as JSON
    Snapshot {
        /// Asset class: token, solana_nft, eth_nft, ape_nft, rune, ordinal
        #[arg(long)]
        class: String,
        /// Token address, collection symbol/contract, rune or ordinal symbol
        #[arg(long)]
        asset: String,
        /// Chain filter (tokens only)
        #[arg(long)]
        chain: Option<String>,
    },
}

#[derive(Clone)]
struct AppState {
    desk: Arc<CallDesk>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,call_tracker=debug")
    } else {
        EnvFilter::new("info,engine=info,call_tracker=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_persist,
        } => {
            cmd_serve(config, &host, port, no_persist).await?;
        }
        Commands::Snapshot {
            class,
            asset,
            chain,
        } => {
            cmd_snapshot(config, &class, &asset, chain.as_deref()).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Serve command: trackers + Axum control API
// ============================================================================

async fn cmd_serve(config: AppConfig, host: &str, port: u16, no_persist: bool) -> anyhow::Result<()> {
    info!("Call Tracker v{} starting...", APP_VERSION);

    let journal = if no_persist {
        info!("Journal disabled, calls are kept in memory only");
        None
    } else {
        let db = persistence::Database::new(&config.db_path).await.map_err(|e| {
            error!("Failed to initialize database: {}", e);
            anyhow::anyhow!("Database initialization failed: {}", e)
        })?;
        info!("Database initialized: {}", config.db_path);
        Some(db.pool_clone())
    };

    let sink: Arc<dyn NotificationSink> = match &config.discord_webhook_url {
        Some(url) => Arc::new(DiscordWebhookSink::new(url.clone(), config.holders_role_id.clone())),
        None => {
            warn!("DISCORD_WEBHOOK_URL not set, alerts go to the log only");
            Arc::new(LogSink)
        }
    };

    let desk = Arc::new(CallDesk::new(
        default_sources(config.magic_eden_api_key.as_deref()),
        sink,
        config.tracker.clone(),
        journal,
    ));
    let restored = desk.restore_all().await;
    let handles = desk.spawn_all();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/calls", get(api_list_calls).post(api_create_call))
        .route("/calls/:asset_class/:asset_id", get(api_get_call))
        .route("/leaderboard", get(api_leaderboard))
        .route("/trackers", get(api_trackers))
        .with_state(AppState { desk: desk.clone() });

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Call Tracker v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health                 - Health check");
    println!("  POST /api/calls                  - Create a call");
    println!("  GET  /api/calls                  - List calls (?assetClass=)");
    println!("  GET  /api/calls/:class/:asset    - One call");
    println!("  GET  /api/leaderboard            - Best calls (?limit=)");
    println!("  GET  /api/trackers               - Tracker status");
    println!(
        "\n  Sweep interval: {}s | Alert cooldown: {}s",
        config.tracker.sweep_interval.as_secs(),
        config.tracker.alert_cooldown.as_secs()
    );
    if no_persist {
        println!("  Database: disabled");
    } else {
        println!("  Database: {} ({} calls restored)", config.db_path, restored);
    }
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let desk_for_shutdown = desk.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl+C received, stopping trackers...");
            desk_for_shutdown.cancel_all();
        })
        .await?;

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Tracker task ended abnormally: {}", e);
        }
    }
    info!("Call Tracker stopped");

    Ok(())
}

// ============================================================================
// Snapshot command: one-shot fetch
// ============================================================================

async fn cmd_snapshot(
    config: AppConfig,
    class: &str,
    asset: &str,
    chain: Option<&str>,
) -> anyhow::Result<()> {
    let asset_class: AssetClass = class.parse()?;
    let source = default_sources(config.magic_eden_api_key.as_deref())
        .into_iter()
        .find(|s| s.asset_class() == asset_class)
        .ok_or_else(|| anyhow::anyhow!("no data source for {}", asset_class))?;

    let policy = source
        .retry_policy()
        .with_max_attempts(DEFAULT_CREATION_MAX_ATTEMPTS);
    let snapshot = source.fetch_snapshot(asset.trim(), chain, &policy).await?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

/// Maps engine errors onto HTTP status codes
struct ApiError(StatusCode, String);

impl From<CallError> for ApiError {
    fn from(e: CallError) -> Self {
        let status = match &e {
            CallError::InvalidBaseline { .. }
            | CallError::InvalidRequest(_)
            | CallError::UnknownAssetClass(_) => StatusCode::BAD_REQUEST,
            CallError::NotFound(_) => StatusCode::NOT_FOUND,
            CallError::Duplicate { .. } => StatusCode::CONFLICT,
            CallError::Fetch(_) => StatusCode::BAD_GATEWAY,
        };
        Self(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

fn parse_class(s: &str) -> Result<AssetClass, ApiError> {
    s.parse::<AssetClass>()
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "call-tracker",
        "version": APP_VERSION,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallBody {
    asset_class: String,
    #[serde(flatten)]
    request: CallRequest,
}

/// POST /api/calls: fetch the baseline and start tracking
async fn api_create_call(
    State(state): State<AppState>,
    Json(body): Json<CreateCallBody>,
) -> Result<(StatusCode, Json<engine::Call>), ApiError> {
    let asset_class = parse_class(&body.asset_class)?;
    info!(
        asset_class = %asset_class,
        asset_id = %body.request.asset_id,
        caller = %body.request.caller_id,
        "Call requested"
    );
    let call = state.desk.create_call(asset_class, body.request).await?;
    Ok((StatusCode::CREATED, Json(call)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    asset_class: Option<String>,
}

/// GET /api/calls: summaries, optionally for one asset class
async fn api_list_calls(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<engine::CallSummary>>, ApiError> {
    let asset_class = params.asset_class.as_deref().map(parse_class).transpose()?;
    Ok(Json(state.desk.summaries(asset_class).await))
}

/// GET /api/calls/:asset_class/:asset_id
async fn api_get_call(
    State(state): State<AppState>,
    Path((asset_class, asset_id)): Path<(String, String)>,
) -> Result<Json<engine::Call>, ApiError> {
    let asset_class = parse_class(&asset_class)?;
    state
        .desk
        .get(asset_class, &asset_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError(
                StatusCode::NOT_FOUND,
                format!("no {} call for {}", asset_class, asset_id),
            )
        })
}

#[derive(Deserialize)]
struct LeaderboardParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    leaderboard::DEFAULT_LIMIT
}

/// GET /api/leaderboard
async fn api_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Json<Vec<engine::LeaderboardEntry>> {
    Json(state.desk.leaderboard(params.limit).await)
}

/// GET /api/trackers: per-class status and last sweep report
async fn api_trackers(State(state): State<AppState>) -> Json<Vec<engine::TrackerStatus>> {
    Json(state.desk.statuses().await)
}
