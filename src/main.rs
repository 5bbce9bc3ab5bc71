mod backend;
mod config;
mod health;
mod metrics;
mod parser;
mod pool;
mod protocol;
mod router;
mod session;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use backend::{Backend, BackendRegistry, BackendRole, DbGroup};
use config::{Config, WeightedAddr};
use health::HealthChecker;
use metrics::metrics;
use pool::PoolManager;
use router::Router;
use session::Session;

/// Global counter for unique session ids
static CONNECTION_COUNTER: AtomicU32 = AtomicU32::new(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "artemis.toml".to_string());
    let config = config::load_config(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    info!(path = %config_path, "configuration loaded");

    let registry = Arc::new(build_registry(&config)?);
    let pool = Arc::new(PoolManager::new(config.pool.clone(), config.auth.clone()));
    let router = Arc::new(Router::new(
        config.sharding.clone(),
        config.default_group.clone(),
    ));

    let shutdown = CancellationToken::new();
    let checker = Arc::new(HealthChecker::new(
        registry.clone(),
        config.auth.clone(),
        config.health.clone(),
    ));
    checker.start(shutdown.clone());

    if let Some(metrics_addr) = config.server.metrics_addr.clone() {
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(&metrics_addr).await {
                error!(error = %e, "metrics server failed");
            }
        });
    }

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(addr = %bind_addr, groups = config.groups.len(), "artemis proxy listening");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };

        let session_id = CONNECTION_COUNTER.fetch_add(1, Ordering::SeqCst);
        let session = Session::new(
            session_id,
            registry.clone(),
            pool.clone(),
            router.clone(),
            config.auth.clone(),
        );
        metrics().record_connection_accepted();

        info!(session = session_id, peer = %peer_addr, "connection accepted");
        tokio::spawn(async move {
            if let Err(e) = session.run(stream).await {
                warn!(session = session_id, error = %e, "session ended with error");
            } else {
                info!(session = session_id, "session ended");
            }
            metrics().record_connection_closed();
        });
    }
}

/// Turn the configured group list into the shared registry. Addresses reused
/// across groups share one `Backend`, so health state is tracked once.
fn build_registry(config: &Config) -> anyhow::Result<BackendRegistry> {
    let mut by_addr: std::collections::HashMap<String, Arc<Backend>> =
        std::collections::HashMap::new();
    let mut intern = |parsed: WeightedAddr, role: BackendRole| {
        by_addr
            .entry(parsed.addr.clone())
            .or_insert_with(|| Arc::new(Backend::new(parsed.addr, parsed.weight, role)))
            .clone()
    };

    let mut groups = Vec::with_capacity(config.groups.len());
    for group in &config.groups {
        let master = intern(WeightedAddr::parse(&group.master)?, BackendRole::Master);
        let replicas = group
            .replicas
            .iter()
            .map(|token| Ok(intern(WeightedAddr::parse(token)?, BackendRole::Replica)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        groups.push(Arc::new(DbGroup::new(group.name.clone(), master, replicas)));
    }
    Ok(BackendRegistry::new(groups))
}
