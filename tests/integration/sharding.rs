//! Shard routing behavior seen through a real client.
//!
//! NOTE: Uses string interpolation instead of prepared statements because
//! shard keys cannot be extracted from parameterized queries.

use crate::{assert_query_error, get_proxy_config, ids_on_different_groups, skip_if_not_enabled};
use mysql::prelude::*;
use mysql::PooledConn;

// ids in this window route to distinct hash groups and distinct range slots
const HASH_ID_BASE: i64 = 770_000;
const RANGE_ID_LOW: i64 = 42; // range group 0 (1..=100)
const RANGE_ID_HIGH: i64 = 142; // range group 1 (101..=200)

fn cleanup_users(conn: &mut PooledConn, ids: &[i64]) {
    for id in ids {
        let _ = conn.query_drop(format!("DELETE FROM users WHERE id = {id}"));
    }
}

fn cleanup_orders(conn: &mut PooledConn, ids: &[i64]) {
    for id in ids {
        let _ = conn.query_drop(format!("DELETE FROM orders WHERE id = {id}"));
    }
}

#[test]
fn test_point_select_with_shard_key() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let id = HASH_ID_BASE + 1;
    cleanup_users(&mut conn, &[id]);

    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({id}, 'point-select')"
    ))
    .expect("INSERT should succeed");

    let name: Option<String> = conn
        .query_first(format!("SELECT name FROM users WHERE id = {id}"))
        .expect("SELECT should succeed");
    assert_eq!(name.as_deref(), Some("point-select"));

    cleanup_users(&mut conn, &[id]);
}

#[test]
fn test_insert_then_read_back_across_groups() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let (a, b) = ids_on_different_groups(crate::get_shard_count());
    let (a, b) = (HASH_ID_BASE + a, HASH_ID_BASE + b);
    cleanup_users(&mut conn, &[a, b]);

    for (id, name) in [(a, "alpha"), (b, "beta")] {
        conn.query_drop(format!(
            "INSERT INTO users (id, name) VALUES ({id}, '{name}')"
        ))
        .expect("INSERT should succeed");
    }

    // each id comes back from its own group
    let name_a: Option<String> = conn
        .query_first(format!("SELECT name FROM users WHERE id = {a}"))
        .unwrap();
    let name_b: Option<String> = conn
        .query_first(format!("SELECT name FROM users WHERE id = {b}"))
        .unwrap();
    assert_eq!(name_a.as_deref(), Some("alpha"));
    assert_eq!(name_b.as_deref(), Some("beta"));

    cleanup_users(&mut conn, &[a, b]);
}

#[test]
fn test_fan_out_select_merges_groups() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let (a, b) = ids_on_different_groups(crate::get_shard_count());
    let (a, b) = (HASH_ID_BASE + 10 + a, HASH_ID_BASE + 10 + b);
    cleanup_users(&mut conn, &[a, b]);

    for id in [a, b] {
        conn.query_drop(format!(
            "INSERT INTO users (id, name) VALUES ({id}, 'scatter')"
        ))
        .unwrap();
    }

    // the IN list resolves to two groups; both rows must come back merged
    let ids: Vec<i64> = conn
        .query(format!(
            "SELECT id FROM users WHERE name = 'scatter' AND id IN ({a}, {b})"
        ))
        .expect("fan-out SELECT should succeed");
    let mut ids = ids;
    ids.sort_unstable();
    assert_eq!(ids, vec![a, b]);

    cleanup_users(&mut conn, &[a, b]);
}

#[test]
fn test_insert_without_column_list_routes_by_first_value() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let id = HASH_ID_BASE + 30;
    cleanup_users(&mut conn, &[id]);

    // the shard key is read positionally when no column list is given
    conn.query_drop(format!("INSERT INTO users VALUES ({id}, 'positional')"))
        .expect("INSERT without column list should route");

    let name: Option<String> = conn
        .query_first(format!("SELECT name FROM users WHERE id = {id}"))
        .unwrap();
    assert_eq!(name.as_deref(), Some("positional"));

    cleanup_users(&mut conn, &[id]);
}

#[test]
fn test_fan_out_aggregate_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    // a cross-shard COUNT would come back as one row per shard
    let result: Result<Vec<i64>, _> = conn.query("SELECT COUNT(*) FROM users");
    assert_query_error(result, 1105, "not supported");

    // on a single shard the backend computes the aggregate itself
    let count: Option<i64> = conn
        .query_first(format!(
            "SELECT COUNT(*) FROM users WHERE id = {HASH_ID_BASE}"
        ))
        .expect("single-shard aggregate should succeed");
    assert!(count.is_some());
}

#[test]
fn test_fan_out_order_by_with_offset_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    let result: Result<Vec<i64>, _> =
        conn.query("SELECT id FROM users ORDER BY id LIMIT 10 OFFSET 5");
    assert_query_error(result, 1105, "not supported");
}

#[test]
fn test_range_rule_routes_by_slot() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    cleanup_orders(&mut conn, &[RANGE_ID_LOW, RANGE_ID_HIGH]);

    for (id, total) in [(RANGE_ID_LOW, 10), (RANGE_ID_HIGH, 20)] {
        conn.query_drop(format!(
            "INSERT INTO orders (id, total) VALUES ({id}, {total})"
        ))
        .expect("INSERT should succeed");
    }

    let low: Option<i64> = conn
        .query_first(format!("SELECT total FROM orders WHERE id = {RANGE_ID_LOW}"))
        .unwrap();
    let high: Option<i64> = conn
        .query_first(format!(
            "SELECT total FROM orders WHERE id = {RANGE_ID_HIGH}"
        ))
        .unwrap();
    assert_eq!(low, Some(10));
    assert_eq!(high, Some(20));

    // BETWEEN spanning both slots sees both rows
    let totals: Vec<i64> = conn
        .query("SELECT total FROM orders WHERE id BETWEEN 1 AND 200 ORDER BY total")
        .expect("cross-slot SELECT should succeed");
    assert!(totals.contains(&10) && totals.contains(&20));

    cleanup_orders(&mut conn, &[RANGE_ID_LOW, RANGE_ID_HIGH]);
}

#[test]
fn test_multi_shard_write_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    let result: Result<Vec<String>, _> =
        conn.query("UPDATE orders SET total = 0 WHERE id BETWEEN 1 AND 200");
    assert_query_error(result, 1105, "more than one shard");
}

#[test]
fn test_insert_without_shard_column_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    let result: Result<Vec<String>, _> = conn.query("INSERT INTO orders (total) VALUES (5)");
    assert_query_error(result, 1105, "shard column");
}

#[test]
fn test_out_of_range_key_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    let result: Result<Vec<String>, _> =
        conn.query("SELECT * FROM orders WHERE id = 9999");
    assert_query_error(result, 1105, "range");
}

#[test]
fn test_contradictory_predicate_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    // id = 5 AND id = 6 matches nothing; the proxy says so instead of
    // broadcasting
    let result: Result<Vec<String>, _> =
        conn.query("SELECT * FROM users WHERE id = 5 AND id = 6");
    assert_query_error(result, 1105, "no group");
}

#[test]
fn test_limit_is_enforced_on_fan_out() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let (a, b) = ids_on_different_groups(crate::get_shard_count());
    let (a, b) = (HASH_ID_BASE + 20 + a, HASH_ID_BASE + 20 + b);
    cleanup_users(&mut conn, &[a, b]);

    for id in [a, b] {
        conn.query_drop(format!(
            "INSERT INTO users (id, name) VALUES ({id}, 'limited')"
        ))
        .unwrap();
    }

    // each group holds one matching row; LIMIT 1 must trim the merged set
    let rows: Vec<i64> = conn
        .query(format!(
            "SELECT id FROM users WHERE name = 'limited' AND id IN ({a}, {b}) LIMIT 1"
        ))
        .expect("limited fan-out should succeed");
    assert_eq!(rows.len(), 1);

    cleanup_users(&mut conn, &[a, b]);
}

#[test]
fn test_statement_error_does_not_kill_connection() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    let rejected: Result<Vec<String>, _> = conn.query("DELETE FROM users");
    assert_query_error(rejected, 1105, "more than one shard");

    // the same connection keeps working
    let one: Option<i64> = conn
        .query_first(format!("SELECT id FROM users WHERE id = {HASH_ID_BASE}"))
        .expect("connection should survive a rejected statement");
    assert!(one.is_none() || one == Some(HASH_ID_BASE));
}
