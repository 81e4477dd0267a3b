// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service bootstrap: load configuration, open the store, rebuild the
//! embedding index, wire the service objects, and serve the RPC surface
//! until interrupted. There are no process-wide singletons; everything the
//! RPC layer needs is constructed here and injected.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use agentevolution_core::application::discovery::DiscoveryService;
use agentevolution_core::application::gauntlet::Gauntlet;
use agentevolution_core::application::publishing::PublishingService;
use agentevolution_core::application::telemetry::TelemetryService;
use agentevolution_core::application::ToolLockTable;
use agentevolution_core::domain::config::{ConfigError, RegistryConfigManifest, ServiceConfig};
use agentevolution_core::domain::screener::{ScreenerPolicy, StaticScreener};
use agentevolution_core::infrastructure::{
    BagOfWordsEmbedder, Database, EmbeddingIndex, ProcessSandbox, SqliteToolRepository,
};
use agentevolution_core::presentation;
use agentevolution_core::ToolRepository;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("registry store unavailable: {0}")]
    Store(#[source] anyhow::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service failed: {0}")]
    Runtime(#[source] anyhow::Error),
}

pub async fn run(
    config_path: Option<PathBuf>,
    host_override: Option<String>,
    port_override: Option<u16>,
) -> Result<(), ServeError> {
    let mut config: ServiceConfig = match config_path {
        Some(path) => {
            let manifest = RegistryConfigManifest::load(&path)?;
            info!(manifest = %path.display(), node = %manifest.metadata.name, "loaded configuration");
            manifest.spec
        }
        None => {
            info!("no configuration manifest given; using defaults");
            ServiceConfig::default()
        }
    };
    if let Some(host) = host_override {
        config.server.host = host;
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }
    config.validate()?;

    let store_path = config.store_path();
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServeError::Store(anyhow::Error::new(e).context("creating data directory")))?;
    }
    let database = Database::open(&store_path).await.map_err(ServeError::Store)?;
    let repo = Arc::new(SqliteToolRepository::new(database.get_pool().clone()));

    let index = Arc::new(EmbeddingIndex::new(Arc::new(BagOfWordsEmbedder)));
    let persisted = repo
        .load_embedding_terms()
        .await
        .map_err(|e| ServeError::Store(anyhow::Error::new(e).context("rebuilding embedding index")))?;
    for (tool_id, terms) in persisted {
        index.index_terms(tool_id, terms);
    }
    info!(indexed = index.len(), store = %store_path.display(), "registry store opened");

    let sandbox = Arc::new(ProcessSandbox::new(
        config.sandbox.interpreter.clone(),
        config.sandbox.max_concurrency,
        config.sandbox.max_queue_depth,
    ));
    let screener = StaticScreener::new(ScreenerPolicy::new(
        config.screener.allowed_imports.iter().cloned(),
    ));
    let gauntlet = Gauntlet::new(screener, sandbox, config.sandbox.limits());

    let locks = Arc::new(ToolLockTable::new());
    let publishing = Arc::new(PublishingService::new(
        gauntlet,
        repo.clone(),
        index.clone(),
        config.fitness.clone(),
        locks.clone(),
    ));
    let telemetry = Arc::new(TelemetryService::new(
        repo.clone(),
        index.clone(),
        config.fitness.clone(),
        locks,
    ));
    let discovery = Arc::new(DiscoveryService::new(repo, index, config.discovery.clone()));

    let app = presentation::app(publishing, telemetry, discovery);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind { addr: addr.clone(), source })?;
    info!(%addr, "registry listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServeError::Runtime(e.into()))?;

    info!("registry shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
    }
}
