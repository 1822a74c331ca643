mod runner;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tv_signal_relay::config::Config;
use tv_signal_relay::core::bias::BiasScheduler;
use tv_signal_relay::core::dedup::DuplicateSuppressor;
use tv_signal_relay::http::{self, AppState};
use tv_signal_relay::notify::{
    BatchPolicy, Channel, DiscordChannel, Dispatcher, Formatter, RetryPolicy,
};
use tv_signal_relay::relay::Relay;
use tv_signal_relay::store::MemoryStore;
use tv_signal_relay::trading::{RetentionAges, Sweeps, TradeEngine};

use crate::runner::SweepTicker;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    if cfg.primary_webhook_url.is_empty() {
        anyhow::bail!("DISCORD_WEBHOOK_URL is not set");
    }

    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    let mut channels: Vec<Arc<dyn Channel>> = vec![Arc::new(DiscordChannel::new(
        "primary",
        &cfg.primary_webhook_url,
        timeout,
    )?)];
    for (i, url) in cfg.extra_webhook_urls.iter().enumerate() {
        channels.push(Arc::new(DiscordChannel::new(
            format!("secondary-{}", i + 1),
            url,
            timeout,
        )?));
    }
    info!("dispatching to {} channel(s)", channels.len());

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(TradeEngine::new(store.clone(), cfg.trading_window));
    let bias = Arc::new(BiasScheduler::new(store.clone(), cfg.bias_release));
    let dedup = Arc::new(DuplicateSuppressor::new(
        store.clone(),
        cfg.duplicate_window_ms,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        channels,
        RetryPolicy::new(cfg.retry_max_attempts, cfg.retry_base_delay_ms),
        BatchPolicy::new(cfg.batch_capacity, cfg.batch_delay_ms),
    ));
    let formatter = Arc::new(Formatter::new(
        &cfg.symbol_label,
        &cfg.buy_image_url,
        &cfg.sell_image_url,
    ));

    let relay = Arc::new(Relay::new(
        engine.clone(),
        bias.clone(),
        dedup,
        dispatcher.clone(),
        formatter.clone(),
    ));
    let sweeps = Arc::new(Sweeps::new(
        store,
        engine,
        bias,
        dispatcher,
        formatter,
        RetentionAges {
            trade_ms: cfg.trade_max_age_ms,
            archive_ms: cfg.archive_max_age_ms,
            marker_ms: cfg.duplicate_window_ms,
            pending_bias_ms: cfg.pending_bias_max_age_ms,
        },
    ));

    let app = http::router(Arc::new(AppState { relay }));
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    info!("listening on {}", cfg.bind_addr);

    let ticker = SweepTicker::new(sweeps, &cfg);

    tokio::select! {
        res = async { axum::serve(listener, app).await } => {
            res.context("http server")?;
        }
        _ = ticker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
