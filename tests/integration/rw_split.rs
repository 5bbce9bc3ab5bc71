//! Read-write split behavior seen through a real client.
//!
//! These tests cannot observe which physical backend served a statement, so
//! they assert the user-visible contract: reads and writes both succeed, the
//! master hint is accepted, and a freshly written row is visible through a
//! hinted read even when replicas lag.

use crate::{get_proxy_config, skip_if_not_enabled};
use mysql::prelude::*;

const TEST_ID: i64 = 880_001;

#[test]
fn test_reads_and_writes_through_same_connection() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let _ = conn.query_drop(format!("DELETE FROM users WHERE id = {TEST_ID}"));

    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({TEST_ID}, 'rw-split')"
    ))
    .expect("write should reach the master");

    // plain read goes to a replica; it must still be a valid resultset
    let _: Vec<String> = conn
        .query(format!("SELECT name FROM users WHERE id = {TEST_ID}"))
        .expect("replica read should succeed");

    let _ = conn.query_drop(format!("DELETE FROM users WHERE id = {TEST_ID}"));
}

#[test]
fn test_master_hint_reads_own_write() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let _ = conn.query_drop(format!("DELETE FROM users WHERE id = {TEST_ID}"));

    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({TEST_ID}, 'hinted')"
    ))
    .unwrap();

    // the hint forces the master, so the row is visible immediately
    let name: Option<String> = conn
        .query_first(format!(
            "/*MASTER*/ SELECT name FROM users WHERE id = {TEST_ID}"
        ))
        .expect("hinted read should succeed");
    assert_eq!(name.as_deref(), Some("hinted"));

    let _ = conn.query_drop(format!("DELETE FROM users WHERE id = {TEST_ID}"));
}

#[test]
fn test_show_statement_routes_as_read() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    let tables: Vec<String> = conn.query("SHOW TABLES").expect("SHOW should succeed");
    assert!(tables.iter().any(|t| t == "users"));
}

#[test]
fn test_set_names_is_answered_locally() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    conn.query_drop("SET NAMES utf8mb4")
        .expect("SET NAMES should be acknowledged");
    conn.query_drop("SET autocommit = 1")
        .expect("SET autocommit should be acknowledged");

    // the connection still routes statements afterwards
    let one: Option<i64> = conn.query_first("SELECT id FROM users WHERE id = 1").ok().flatten();
    let _ = one;
}

#[test]
fn test_session_variable_reaches_backends() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    conn.query_drop("SET sql_mode = 'STRICT_ALL_TABLES'")
        .expect("SET should be acknowledged");

    // the locally acknowledged variable is replayed on whichever pooled
    // socket serves the next statement
    let mode: Option<String> = conn
        .query_first("SELECT @@sql_mode")
        .expect("reading the variable back should succeed");
    assert!(mode.unwrap_or_default().contains("STRICT_ALL_TABLES"));
}
