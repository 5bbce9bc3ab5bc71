use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{AuthConfig, PoolConfig};

use super::connection::{ConnectionError, PooledConnection};

/// Idle-connection pool, one LIFO stack per backend address.
///
/// The most-recently-returned socket is handed out first so hot sockets stay
/// warm. Acquire never blocks waiting for a peer to release: a miss opens a
/// fresh connection instead.
pub struct PoolManager {
    config: PoolConfig,
    auth: AuthConfig,
    idle: Mutex<HashMap<String, Vec<PooledConnection>>>,
}

impl PoolManager {
    pub fn new(config: PoolConfig, auth: AuthConfig) -> Self {
        Self {
            config,
            auth,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Pop an idle socket for `addr`, or open a new one.
    pub async fn acquire(
        &self,
        addr: &str,
        database: Option<&str>,
    ) -> Result<PooledConnection, ConnectionError> {
        let max_age = Duration::from_secs(self.config.max_conn_age_secs);
        let max_idle = Duration::from_secs(self.config.max_idle_secs);

        {
            let mut idle = self.idle.lock().await;
            if let Some(stack) = idle.get_mut(addr) {
                while let Some(mut conn) = stack.pop() {
                    if conn.is_expired(max_age) || conn.is_idle_too_long(max_idle) {
                        debug!(addr, "discarding stale pooled connection");
                        continue;
                    }
                    if let Some(db) = database {
                        if conn.database() != Some(db) {
                            drop(idle);
                            if conn.init_db(db).await.is_err() {
                                debug!(addr, "pooled connection refused USE, discarding");
                                return self.open(addr, database).await;
                            }
                            return Ok(conn);
                        }
                    }
                    debug!(addr, "reusing pooled connection");
                    return Ok(conn);
                }
            }
        }

        self.open(addr, database).await
    }

    async fn open(
        &self,
        addr: &str,
        database: Option<&str>,
    ) -> Result<PooledConnection, ConnectionError> {
        debug!(addr, "opening new backend connection");
        PooledConnection::connect(addr, &self.auth, database.map(str::to_string)).await
    }

    /// Return a socket. Unreusable or expired sockets are closed; a full
    /// stack drops the oldest entry to make room for the fresher one.
    pub async fn release(&self, conn: PooledConnection) {
        if !conn.is_reusable() {
            debug!(addr = conn.addr(), "dropping unreusable connection");
            return;
        }
        if conn.is_expired(Duration::from_secs(self.config.max_conn_age_secs)) {
            debug!(addr = conn.addr(), "dropping aged-out connection");
            return;
        }

        let mut idle = self.idle.lock().await;
        let stack = idle.entry(conn.addr().to_string()).or_default();
        if stack.len() >= self.config.max_idle_per_backend {
            stack.remove(0);
        }
        stack.push(conn);
    }

    pub async fn idle_count(&self, addr: &str) -> usize {
        self.idle
            .lock()
            .await
            .get(addr)
            .map_or(0, |stack| stack.len())
    }

    /// Drop every idle socket, closing them
    pub async fn close_all(&self) {
        self.idle.lock().await.clear();
    }
}
