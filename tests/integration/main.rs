//! Integration test entry point.
//!
//! Run with: ARTEMIS_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Expects a running proxy in front of sharded MySQL backends, configured
//! with:
//! - a hash rule on `users(id)` across every group
//! - a range rule on `orders(id)`: group 0 serves ids 1..=100, group 1
//!   serves ids 101..=200
//!
//! Environment variables:
//! - ARTEMIS_RUN_INTEGRATION_TESTS: set to "1" to enable
//! - ARTEMIS_TEST_PROXY_HOST: proxy host (default: 127.0.0.1)
//! - ARTEMIS_TEST_PROXY_PORT: proxy port (default: 3307)
//! - ARTEMIS_TEST_PROXY_USER: proxy user (default: app_user)
//! - ARTEMIS_TEST_PROXY_PASS: proxy password (default: test123)
//! - ARTEMIS_TEST_PROXY_DB: database name (default: artemis_test)
//! - ARTEMIS_TEST_SHARD_COUNT: number of hash groups (default: 2)

mod rw_split;
mod sharding;
mod transaction;

use mysql::{Error as MySqlError, OptsBuilder, Pool, PooledConn};
use std::env;

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("ARTEMIS_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set ARTEMIS_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Proxy connection settings pulled from the environment
#[derive(Debug, Clone)]
pub struct ProxyTestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

pub fn get_proxy_config() -> ProxyTestConfig {
    ProxyTestConfig {
        host: env::var("ARTEMIS_TEST_PROXY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: env::var("ARTEMIS_TEST_PROXY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3307),
        user: env::var("ARTEMIS_TEST_PROXY_USER").unwrap_or_else(|_| "app_user".to_string()),
        password: env::var("ARTEMIS_TEST_PROXY_PASS").unwrap_or_else(|_| "test123".to_string()),
        database: env::var("ARTEMIS_TEST_PROXY_DB")
            .unwrap_or_else(|_| "artemis_test".to_string()),
    }
}

/// Number of hash groups the proxy is configured with
pub fn get_shard_count() -> i64 {
    env::var("ARTEMIS_TEST_SHARD_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2)
}

impl ProxyTestConfig {
    pub fn pool(&self) -> Pool {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(&self.host))
            .tcp_port(self.port)
            .user(Some(&self.user))
            .pass(Some(&self.password))
            .db_name(Some(&self.database));
        Pool::new(opts).expect("Failed to create connection pool")
    }

    pub fn conn(&self) -> PooledConn {
        self.pool().get_conn().expect("Failed to get connection")
    }
}

/// The group index a hash-sharded id lands on (Euclidean remainder, so
/// negative keys stay in range)
pub fn hash_group(id: i64, shard_count: i64) -> i64 {
    id.rem_euclid(shard_count)
}

/// Two ids guaranteed to hash to different groups
pub fn ids_on_different_groups(shard_count: i64) -> (i64, i64) {
    (shard_count, shard_count + 1)
}

/// Assert that a query result is a MySQL error with given code and message
pub fn assert_query_error<T: std::fmt::Debug>(
    result: Result<T, MySqlError>,
    expected_code: u16,
    expected_msg: &str,
) {
    match result {
        Ok(v) => panic!(
            "Expected MySQL error {} with message containing '{}', but got: {:?}",
            expected_code, expected_msg, v
        ),
        Err(MySqlError::MySqlError(ref e)) => {
            assert_eq!(
                e.code, expected_code,
                "Expected error code {}, got {}. Message: {}",
                expected_code, e.code, e.message
            );
            assert!(
                e.message.contains(expected_msg),
                "Expected message containing '{}', got: {}",
                expected_msg,
                e.message
            );
        }
        Err(e) => panic!(
            "Expected MySQL error {} with message containing '{}', got different error: {:?}",
            expected_code, expected_msg, e
        ),
    }
}
