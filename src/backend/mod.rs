//! Backend registry: physical MySQL endpoints grouped into named db groups.

mod selector;

pub use selector::WeightedRoundRobin;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Role of a backend within its group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    Master,
    Replica,
}

/// One physical MySQL endpoint.
///
/// Shared via `Arc` across every group that references the same address;
/// the handle's last drop is the removal point, there is no manual
/// reference counting.
#[derive(Debug)]
pub struct Backend {
    pub addr: String,
    pub weight: u32,
    pub role: BackendRole,
    up: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl Backend {
    pub fn new(addr: String, weight: u32, role: BackendRole) -> Self {
        Self {
            addr,
            weight: weight.max(1),
            role,
            up: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Release);
        if up {
            self.consecutive_failures.store(0, Ordering::Release);
        }
    }

    /// Record a failed health probe. Marks the backend DOWN once the
    /// consecutive-failure count reaches `threshold`; returns true when this
    /// call caused the UP -> DOWN transition.
    pub fn record_failure(&self, threshold: u32) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= threshold && self.is_up() {
            self.up.store(false, Ordering::Release);
            warn!(addr = %self.addr, failures, "backend marked DOWN");
            true
        } else {
            false
        }
    }

    /// Record a successful health probe; one success brings a backend back.
    /// Returns true when this call caused the DOWN -> UP transition.
    pub fn record_success(&self) -> bool {
        self.consecutive_failures.store(0, Ordering::Release);
        if !self.is_up() {
            self.up.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }
}

/// One named shard: a master plus ordered weighted replicas
#[derive(Debug)]
pub struct DbGroup {
    pub name: String,
    pub master: Arc<Backend>,
    pub replicas: Vec<Arc<Backend>>,
    read_selector: WeightedRoundRobin,
}

impl DbGroup {
    pub fn new(name: String, master: Arc<Backend>, replicas: Vec<Arc<Backend>>) -> Self {
        Self {
            name,
            master,
            replicas,
            read_selector: WeightedRoundRobin::new(),
        }
    }

    /// Master if UP, else None. There is no automatic promotion.
    pub fn select_write(&self) -> Option<Arc<Backend>> {
        self.master.is_up().then(|| self.master.clone())
    }

    /// Weighted round-robin over UP replicas; a group without usable
    /// replicas serves reads from its master.
    pub fn select_read(&self) -> Option<Arc<Backend>> {
        self.read_selector
            .select(&self.replicas)
            .or_else(|| self.select_write())
    }
}

/// The registry shared by every session: group list plus name lookup
#[derive(Debug, Default)]
pub struct BackendRegistry {
    groups: Vec<Arc<DbGroup>>,
    by_name: HashMap<String, usize>,
}

impl BackendRegistry {
    pub fn new(groups: Vec<Arc<DbGroup>>) -> Self {
        let by_name = groups
            .iter()
            .enumerate()
            .map(|(idx, g)| (g.name.clone(), idx))
            .collect();
        Self { groups, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<DbGroup>> {
        self.by_name.get(name).map(|&idx| &self.groups[idx])
    }

    pub fn groups(&self) -> &[Arc<DbGroup>] {
        &self.groups
    }

    /// Distinct backends across all groups (an address shared between
    /// groups yields a single entry)
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        let mut seen: HashMap<&str, Arc<Backend>> = HashMap::new();
        for group in &self.groups {
            seen.entry(group.master.addr.as_str())
                .or_insert_with(|| group.master.clone());
            for replica in &group.replicas {
                seen.entry(replica.addr.as_str())
                    .or_insert_with(|| replica.clone());
            }
        }
        seen.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, replica_count: usize) -> DbGroup {
        let master = Arc::new(Backend::new(
            format!("{name}-master:3306"),
            1,
            BackendRole::Master,
        ));
        let replicas = (0..replica_count)
            .map(|i| {
                Arc::new(Backend::new(
                    format!("{name}-replica-{i}:3306"),
                    1,
                    BackendRole::Replica,
                ))
            })
            .collect();
        DbGroup::new(name.to_string(), master, replicas)
    }

    #[test]
    fn test_write_requires_up_master() {
        let g = group("g0", 1);
        assert!(g.select_write().is_some());
        g.master.set_up(false);
        assert!(g.select_write().is_none());
    }

    #[test]
    fn test_read_falls_back_to_master() {
        let g = group("g0", 1);
        g.replicas[0].set_up(false);
        let picked = g.select_read().unwrap();
        assert_eq!(picked.addr, g.master.addr);
    }

    #[test]
    fn test_read_without_replicas_uses_master() {
        let g = group("g0", 0);
        assert_eq!(g.select_read().unwrap().addr, g.master.addr);
    }

    #[test]
    fn test_failure_threshold_and_recovery() {
        let backend = Backend::new("db:3306".into(), 1, BackendRole::Master);
        assert!(!backend.record_failure(3));
        assert!(!backend.record_failure(3));
        assert!(backend.record_failure(3));
        assert!(!backend.is_up());
        // subsequent failures do not re-report the transition
        assert!(!backend.record_failure(3));
        assert!(backend.record_success());
        assert!(backend.is_up());
        assert!(!backend.record_success());
    }

    #[test]
    fn test_registry_lookup_and_distinct_backends() {
        let shared = Arc::new(Backend::new("shared:3306".into(), 1, BackendRole::Replica));
        let g0 = {
            let master = Arc::new(Backend::new("m0:3306".into(), 1, BackendRole::Master));
            Arc::new(DbGroup::new("g0".into(), master, vec![shared.clone()]))
        };
        let g1 = {
            let master = Arc::new(Backend::new("m1:3306".into(), 1, BackendRole::Master));
            Arc::new(DbGroup::new("g1".into(), master, vec![shared.clone()]))
        };
        let registry = BackendRegistry::new(vec![g0, g1]);

        assert!(registry.get("g0").is_some());
        assert!(registry.get("missing").is_none());
        // m0, m1 and the shared replica
        assert_eq!(registry.backends().len(), 3);
    }
}
