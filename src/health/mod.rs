//! Backend liveness probes.
//!
//! One probe loop per distinct backend address. A probe is a fresh login
//! plus COM_PING under the configured timeout; failures accumulate until the
//! threshold marks the backend DOWN, and a single success brings it back.
//! The session path never probes, it only consults the UP flag the loops
//! maintain.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{Backend, BackendRegistry};
use crate::config::{AuthConfig, HealthCheckConfig};
use crate::metrics::metrics;
use crate::pool::PooledConnection;

pub struct HealthChecker {
    registry: Arc<BackendRegistry>,
    auth: AuthConfig,
    config: HealthCheckConfig,
}

impl HealthChecker {
    pub fn new(registry: Arc<BackendRegistry>, auth: AuthConfig, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            auth,
            config,
        }
    }

    /// Spawn one probe loop per distinct backend address.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        if !self.config.enabled {
            info!("health checks disabled");
            return Vec::new();
        }

        let backends = self.registry.backends();
        info!(
            backends = backends.len(),
            interval_ms = self.config.check_interval_ms,
            threshold = self.config.failure_threshold,
            "health checker started"
        );

        backends
            .into_iter()
            .map(|backend| {
                let checker = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { checker.probe_loop(backend, shutdown).await })
            })
            .collect()
    }

    async fn probe_loop(&self, backend: Arc<Backend>, shutdown: CancellationToken) {
        let mut ticker = interval(Duration::from_millis(self.config.check_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        metrics().set_backend_up(&backend.addr, backend.is_up());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(addr = %backend.addr, "probe loop stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let healthy = self.probe(&backend.addr).await;
            metrics().record_health_check(if healthy { "ok" } else { "fail" });

            if healthy {
                if backend.record_success() {
                    info!(addr = %backend.addr, "backend recovered");
                }
            } else {
                backend.record_failure(self.config.failure_threshold);
            }
            metrics().set_backend_up(&backend.addr, backend.is_up());
        }
    }

    async fn probe(&self, addr: &str) -> bool {
        let budget = Duration::from_millis(self.config.check_timeout_ms);
        match timeout(budget, PooledConnection::connect(addr, &self.auth, None)).await {
            Ok(Ok(mut conn)) => timeout(budget, conn.ping()).await.unwrap_or(false),
            Ok(Err(e)) => {
                debug!(addr, error = %e, "probe connect failed");
                false
            }
            Err(_) => {
                debug!(addr, "probe timed out");
                false
            }
        }
    }
}
