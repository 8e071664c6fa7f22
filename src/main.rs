//! Walletscope - wallet ingestion and scoring scheduler
//!
//! Runs three loops on their own cadence:
//! - wallet sync over seeds, discovered counterparties and stale rows
//! - market sync (price, gas, network stats)
//! - popularity ranking
//!
//! Ctrl+C cancels pending work; in-flight wallet syncs finish first.

use walletscope::core::{spawn_job, MarketJob, PopularityJob, WalletJob};
use walletscope::models::AppResult;
use walletscope::providers::{CoinGeckoClient, EtherscanClient, EvmWalletSource, RpcProvider};
use walletscope::storage::{connect_graph, MultiStoreWriter, SqliteStore};
use walletscope::utils::constants::{APP_NAME, APP_VERSION};
use walletscope::{
    MarketSyncPipeline, PipelineConfig, PopularityRanker, PriceSource, RateLimiter,
    SyncTelemetry, TtlCache, WalletSyncPipeline,
};

use eyre::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const TELEMETRY_DIR: &str = "telemetry";

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    info!("🚀 {} v{} starting", APP_NAME, APP_VERSION);

    let config = PipelineConfig::from_env()?;

    let limiter = Arc::new(RateLimiter::new());
    for (source, min_interval) in config.providers.rate_limits() {
        limiter.register(source, min_interval);
    }

    // Stores
    let relational = Arc::new(SqliteStore::open(&config.database_path)?);
    let graph = connect_graph(&config.graph_backend).await?;
    let cache = Arc::new(TtlCache::new());
    let telemetry = Arc::new(SyncTelemetry::new());
    let writer = Arc::new(
        MultiStoreWriter::new(
            relational.clone(),
            graph,
            cache.clone(),
            config.store_timeout,
        )
        .with_telemetry(telemetry.clone()),
    );

    // Providers
    let providers = &config.providers;
    let rpc = RpcProvider::new(&providers.rpc_url, limiter.clone(), config.fetch_timeout)?;
    info!("🔗 RPC: {}", rpc.masked_url());
    let etherscan = EtherscanClient::new(
        &providers.etherscan_url,
        providers.etherscan_api_key.clone(),
        limiter.clone(),
        config.fetch_timeout,
    )?;
    let prices: Arc<dyn PriceSource> = Arc::new(CoinGeckoClient::new(
        &providers.coingecko_url,
        providers.coingecko_api_key.clone(),
        limiter.clone(),
        config.fetch_timeout,
    )?);
    let wallet_source = Arc::new(EvmWalletSource::new(
        rpc.clone(),
        etherscan.clone(),
        prices.clone(),
    ));

    // Pipelines
    let wallet_pipeline =
        WalletSyncPipeline::new(wallet_source, writer.clone(), telemetry.clone(), &config);
    let market_pipeline = MarketSyncPipeline::new(
        prices,
        Arc::new(etherscan),
        Arc::new(rpc),
        writer.clone(),
        telemetry.clone(),
        config.fetch_timeout,
    );
    let ranker = PopularityRanker::new(writer.clone(), telemetry.clone(), config.store_timeout);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutting down gracefully...");
            ctrl_c.cancel();
        }
    });

    let wallet_job = WalletJob::new(
        wallet_pipeline,
        relational,
        cache,
        telemetry.clone(),
        &config,
        cancel.clone(),
    );
    let (wallet, market, popularity) = tokio::join!(
        spawn_job(wallet_job, config.wallet_sync_interval, cancel.clone()),
        spawn_job(MarketJob(market_pipeline), config.market_sync_interval, cancel.clone()),
        spawn_job(PopularityJob(ranker), config.popularity_interval, cancel.clone()),
    );
    let outcome = join_outcome(wallet, market, popularity);

    telemetry.log_summary();
    match telemetry.export_stats_json(Path::new(TELEMETRY_DIR)) {
        Ok(path) => info!("✅ Stats exported to: {}", path.display()),
        Err(e) => warn!("❌ Stats export failed: {}", e),
    }

    outcome
}

/// First task failure wins; a panicked task is reported as an error
fn join_outcome(
    wallet: std::result::Result<AppResult<()>, JoinError>,
    market: std::result::Result<AppResult<()>, JoinError>,
    popularity: std::result::Result<AppResult<()>, JoinError>,
) -> Result<()> {
    for task in [wallet, market, popularity] {
        task??;
    }
    Ok(())
}
