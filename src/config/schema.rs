use serde::Deserialize;

use crate::router::{RuleKind, ShardingRule};

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub health: HealthCheckConfig,
    pub groups: Vec<GroupConfig>,
    /// Group serving statements that touch no sharded table
    pub default_group: String,
    #[serde(default)]
    pub sharding: Vec<ShardingRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Prometheus/health HTTP endpoint, e.g. "127.0.0.1:9188"; absent
    /// disables it
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_listen_port() -> u16 {
    3307
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

/// Credentials: what clients present to the proxy, and what the proxy
/// presents to every backend
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub backend_user: String,
    #[serde(default)]
    pub backend_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Idle sockets kept per backend address
    #[serde(default = "default_max_idle")]
    pub max_idle_per_backend: usize,
    /// A pooled socket older than this is closed instead of reused
    #[serde(default = "default_max_age_secs")]
    pub max_conn_age_secs: u64,
    /// A socket idle longer than this is closed instead of reused
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
}

fn default_max_idle() -> usize {
    16
}

fn default_max_age_secs() -> u64 {
    3600
}

fn default_max_idle_secs() -> u64 {
    600
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_backend: default_max_idle(),
            max_conn_age_secs: default_max_age_secs(),
            max_idle_secs: default_max_idle_secs(),
        }
    }
}

/// Health check configuration for backend instances
#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Consecutive failures before a backend is marked DOWN
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

fn default_health_enabled() -> bool {
    true
}

fn default_check_interval_ms() -> u64 {
    5000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_check_timeout_ms() -> u64 {
    3000
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            check_interval_ms: default_check_interval_ms(),
            failure_threshold: default_failure_threshold(),
            check_timeout_ms: default_check_timeout_ms(),
        }
    }
}

/// One db group: a master address plus weighted replica addresses
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Master address, `host:port`
    pub master: String,
    /// Replica addresses, `host:port` or `host:port@weight`
    #[serde(default)]
    pub replicas: Vec<String>,
}

/// A parsed `host:port@weight` token; weight defaults to 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedAddr {
    pub addr: String,
    pub weight: u32,
}

impl WeightedAddr {
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        let (addr, weight) = match token.rsplit_once('@') {
            Some((addr, weight)) => {
                let weight: u32 = weight.parse().map_err(|_| {
                    ConfigError::Invalid(format!("bad weight in backend address {token:?}"))
                })?;
                if weight == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "zero weight in backend address {token:?}"
                    )));
                }
                (addr, weight)
            }
            None => (token, 1),
        };
        if addr.is_empty() || !addr.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "backend address {token:?} is not host:port"
            )));
        }
        Ok(Self {
            addr: addr.to_string(),
            weight,
        })
    }
}

impl Config {
    /// Reject configurations the router cannot serve safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::Invalid("no db groups configured".into()));
        }

        let group_exists =
            |name: &str| self.groups.iter().any(|g| g.name == name);

        if !group_exists(&self.default_group) {
            return Err(ConfigError::Invalid(format!(
                "default_group {:?} is not a configured group",
                self.default_group
            )));
        }

        for group in &self.groups {
            WeightedAddr::parse(&group.master)?;
            for replica in &group.replicas {
                WeightedAddr::parse(replica)?;
            }
        }

        for rule in &self.sharding {
            for name in rule.all_groups() {
                if !group_exists(&name) {
                    return Err(ConfigError::Invalid(format!(
                        "sharding rule for table {:?} references unknown group {name:?}",
                        rule.table
                    )));
                }
            }
            if let RuleKind::Range { slots } = &rule.kind {
                if slots.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "range rule for table {:?} has no slots",
                        rule.table
                    )));
                }
                for slot in slots {
                    if slot.begin > slot.end {
                        return Err(ConfigError::Invalid(format!(
                            "range rule for table {:?} has inverted slot {}..{}",
                            rule.table, slot.begin, slot.end
                        )));
                    }
                }
                // slots must be declared in ascending order without overlap
                for pair in slots.windows(2) {
                    if pair[1].begin <= pair[0].end {
                        return Err(ConfigError::Invalid(format!(
                            "range rule for table {:?} has overlapping or unordered slots",
                            rule.table
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
