//! Process supervisor: wires the pipeline together, owns the shutdown
//! sequence, and keeps close best-effort.
//!
//! Startup order is publisher (bus), time-series store, graph store, then
//! the dispatcher. Shutdown runs the same list in reverse after the
//! dispatcher has stopped intake and drained inflight handlers.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use etl_bus::{NatsPublisher, RecordPublisher};
use etl_core::{Config, JoinCache, METRICS};
use etl_writers::{EventStore, GraphStore, Neo4jWriter, TimescaleWriter};

use crate::consumer::{Dispatcher, Handlers};

/// Run the service until a shutdown signal arrives.
///
/// Returns an error only for unrecoverable startup failures; a clean
/// shutdown returns `Ok(())`.
pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        version = etl_core::VERSION,
        env = %config.env,
        fake_rdns = config.fake_rdns,
        max_inflight = config.max_inflight,
        "starting ETL enrichment service"
    );
    info!(nats = %config.nats_url, "bus endpoint");
    info!(
        timescale = %format!("{}:{}/{}", config.pg.host, config.pg.port, config.pg.db),
        neo4j = %config.neo4j.uri,
        "store endpoints"
    );

    let client = etl_bus::connect(&config.nats_url)
        .await
        .context("bus unreachable after reconnect budget")?;
    let publisher: Arc<dyn RecordPublisher> = Arc::new(NatsPublisher::new(client.clone()));

    let events: Arc<dyn EventStore> = Arc::new(
        TimescaleWriter::connect(&config.pg)
            .await
            .context("TimescaleDB bootstrap failed")?,
    );
    let graph: Arc<dyn GraphStore> = Arc::new(
        Neo4jWriter::connect(&config.neo4j)
            .await
            .context("Neo4j bootstrap failed")?,
    );
    info!(bus = "connected", timescale = "connected", neo4j = "connected", "dependency health");

    let join_cache = Arc::new(JoinCache::new(config.join_cache));
    let handlers = Arc::new(Handlers::new(
        publisher,
        events.clone(),
        graph.clone(),
        join_cache,
        config.env.clone(),
        config.fake_rdns,
    ));
    let dispatcher = Dispatcher::new(client.clone(), handlers, &config);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    dispatcher.run(cancel).await?;

    // Reverse dependency order; close never raises.
    graph.close().await;
    events.close().await;
    if let Err(err) = client.drain().await {
        warn!(error = %err, "bus drain failed");
    }
    METRICS.flush();
    info!("ETL enrichment service stopped");
    Ok(())
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            info!("received SIGINT, initiating graceful shutdown");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received interrupt, initiating graceful shutdown");
}
