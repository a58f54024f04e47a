// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod store;
pub mod stream;
pub mod trends;

use std::sync::Arc;

use axum::Router;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use crate::api::{router, AppState};
pub use crate::config::TrendsConfig;
pub use crate::error::{TrendError, TrendResult};
pub use crate::stream::{TrendEvent, TrendStreamer};
pub use crate::trends::{TrendItem, TrendLimits, TrendService};

use crate::config::StoreBackend;
use crate::store::{MemoryStore, RedisStore};

/// Enable tracing output for local runs.
/// Activation requires TRENDS_DEV_LOG=1; TRENDS_LOG_JSON=1 switches to JSON lines.
pub fn enable_dev_tracing() {
    let on = std::env::var("TRENDS_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return;
    }
    let json = std::env::var("TRENDS_LOG_JSON").ok().as_deref() == Some("1");

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trends=info,warn"));

    // The host runtime may already have installed a subscriber; keep it if so.
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wire the store, pipeline and streamer described by `cfg`.
pub async fn build_state(cfg: &TrendsConfig) -> anyhow::Result<AppState> {
    let service = match cfg.store.backend {
        StoreBackend::Redis => {
            let store = RedisStore::new(&cfg.store.redis_url, cfg.store.timeout())?;
            TrendService::from_store(Arc::new(store), cfg.trends.clone())
        }
        StoreBackend::Memory => {
            TrendService::from_store(Arc::new(MemoryStore::new()), cfg.trends.clone())
        }
    };
    let streamer = TrendStreamer::new(service.clone(), cfg.stream.tick())
        .with_store_failure_policy(cfg.stream.on_store_error);

    info!(
        target: "trends",
        backend = ?cfg.store.backend,
        tick_secs = cfg.stream.tick_secs,
        max_size = cfg.trends.max_size,
        "trend feed wired"
    );
    Ok(AppState::new(service, streamer, cfg.stream.keep_alive()))
}

/// Full application router (trend routes + `/metrics`) built from `TrendsConfig::load()`.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = TrendsConfig::load()?;
    app_with_config(&cfg).await
}

pub async fn app_with_config(cfg: &TrendsConfig) -> anyhow::Result<Router> {
    let state = build_state(cfg).await?;
    let metrics = crate::metrics::Metrics::init(cfg.stream.tick_secs)?;
    Ok(api::router(state).merge(metrics.router()))
}
