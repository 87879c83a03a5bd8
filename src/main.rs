//! ==============================================================================
//! main.rs - shadow logger entry point
//! ==============================================================================
//!
//! purpose:
//!     polls one device's cloud shadow, keeps every new reading in a local
//!     sqlite file and serves the latest and historical readings to a
//!     dashboard.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - make sure the reading table exists
//!     - run the polling loop (write path)
//!     - serve the dashboard and json api (read path)
//!
//! relationships:
//!     - config.rs   logger.toml + env overrides
//!     - shadow.rs   remote shadow fetch
//!     - extract.rs  snapshot -> reading
//!     - store.rs    sqlite table and history queries
//!     - poller.rs   dedup + persist loop
//!     - server.rs   axum routes
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                     shadow logger                            │
//!     │  ┌─────────────┐                    ┌─────────────────────┐  │
//!     │  │ poll loop   │                    │ web server          │  │
//!     │  │ (5s cycle)  │                    │ /api/data (live)    │  │
//!     │  └──┬───────┬──┘                    │ /api/history        │  │
//!     │     │       │                       └───┬─────────────┬───┘  │
//!     │     │       └──────────┐   ┌────────────┘             │      │
//!     │     ▼                  ▼   ▼                          ▼      │
//!     │  ┌────────┐          ┌────────────┐              ┌────────┐  │
//!     │  │ store  │          │ shadow     │              │ store  │  │
//!     │  │ append │          │ client     │              │ query  │  │
//!     │  └────────┘          └─────┬──────┘              └────────┘  │
//!     └────────────────────────────┼─────────────────────────────────┘
//!                                  │ https
//!                                  ▼
//!                          cloud iotda shadow api
//!
//! ==============================================================================

mod config;
mod domain;
mod error;
mod extract;
mod poller;
mod server;
mod shadow;
mod store;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use config::{ConfigSource, LoggerConfig};
use poller::Poller;
use server::ApiState;
use shadow::IotdaShadowClient;
use std::sync::Arc;
use store::Store;

fn init_tracing(config: &LoggerConfig) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| "info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: configuration and logging
    let (config, source) = LoggerConfig::load_or_default();
    init_tracing(&config)?;

    match &source {
        ConfigSource::File(path) => tracing::info!(path = %path.display(), "configuration loaded"),
        ConfigSource::Defaults { skipped } => {
            for reason in skipped {
                tracing::warn!(%reason, "config file skipped");
            }
            tracing::warn!("no usable config file found; using defaults");
        }
    }
    config.log_summary();
    config.validate()?;
    if config.device.auth_token.is_none() {
        tracing::warn!(
            env = config::TOKEN_ENV,
            "no iotda token configured; every shadow fetch will fail"
        );
    }

    // step 2: storage
    let store = Store::new(config.store.path.clone());
    let rows = store
        .run(|s| {
            s.init()?;
            s.count()
        })
        .await
        .with_context(|| format!("failed to initialise {}", store.path().display()))?;
    tracing::info!(path = %store.path().display(), rows, "reading table ready");

    // step 3: shadow client shared by the poller and the live api
    let client = Arc::new(
        IotdaShadowClient::new(&config.device, config.request_timeout())
            .context("failed to build shadow client")?,
    );
    tracing::info!(url = client.url(), "shadow client ready");

    // step 4: web server in the background
    let api_state = ApiState {
        source: client.clone(),
        store: store.clone(),
        history: config.history.clone(),
    };
    let bind = config.server.bind.clone();
    let web = tokio::spawn(async move {
        if let Err(e) = server::run_server(&bind, api_state).await {
            tracing::error!(error = %e, "web server exited");
        }
    });

    // step 5: polling loop until ctrl-c
    let poller = Poller::new(client, store).with_sensor_echo(config.logging.show_sensor_data);
    tokio::select! {
        _ = poller.run(config.poll_interval()) => {}
        _ = web => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
