//! Transaction pinning behavior seen through a real client.

use crate::{assert_query_error, get_proxy_config, ids_on_different_groups, skip_if_not_enabled};
use mysql::prelude::*;

const TEST_ID: i64 = 990_001;

fn cleanup(conn: &mut mysql::PooledConn, ids: &[i64]) {
    for id in ids {
        let _ = conn.query_drop(format!("DELETE FROM users WHERE id = {id}"));
    }
}

#[test]
fn test_commit_makes_write_visible() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    cleanup(&mut conn, &[TEST_ID]);

    conn.query_drop("BEGIN").expect("BEGIN should be acknowledged");
    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({TEST_ID}, 'committed')"
    ))
    .expect("transactional INSERT should succeed");
    conn.query_drop("COMMIT").expect("COMMIT should succeed");

    let name: Option<String> = conn
        .query_first(format!(
            "/*MASTER*/ SELECT name FROM users WHERE id = {TEST_ID}"
        ))
        .unwrap();
    assert_eq!(name.as_deref(), Some("committed"));

    cleanup(&mut conn, &[TEST_ID]);
}

#[test]
fn test_rollback_discards_write() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    cleanup(&mut conn, &[TEST_ID]);

    conn.query_drop("BEGIN").unwrap();
    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({TEST_ID}, 'rolled-back')"
    ))
    .unwrap();
    conn.query_drop("ROLLBACK").expect("ROLLBACK should succeed");

    let name: Option<String> = conn
        .query_first(format!(
            "/*MASTER*/ SELECT name FROM users WHERE id = {TEST_ID}"
        ))
        .unwrap();
    assert_eq!(name, None);
}

#[test]
fn test_transaction_reads_its_own_writes() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    cleanup(&mut conn, &[TEST_ID]);

    conn.query_drop("BEGIN").unwrap();
    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({TEST_ID}, 'uncommitted')"
    ))
    .unwrap();

    // same transaction, same pinned backend: the row is visible before COMMIT
    let name: Option<String> = conn
        .query_first(format!("SELECT name FROM users WHERE id = {TEST_ID}"))
        .expect("read inside transaction should succeed");
    assert_eq!(name.as_deref(), Some("uncommitted"));

    conn.query_drop("ROLLBACK").unwrap();
}

#[test]
fn test_scatter_statement_inside_transaction_is_rejected() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    conn.query_drop("BEGIN").unwrap();

    // a statement that cannot resolve to one shard has no home group
    let result: Result<Vec<i64>, _> = conn.query("SELECT id FROM users");
    assert_query_error(result, 1105, "single shard");

    // the transaction is over but the connection survives
    let _ = conn.query_drop("ROLLBACK");
    let one: Option<i64> = conn
        .query_first("SELECT 1")
        .expect("connection should survive");
    assert_eq!(one, Some(1));
}

#[test]
fn test_statements_stay_on_pinned_group() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();
    let (a, b) = ids_on_different_groups(crate::get_shard_count());
    let (a, b) = (TEST_ID + 100 + a, TEST_ID + 100 + b);
    cleanup(&mut conn, &[a, b]);

    // `a` pins the transaction to its group; `b` would normally route
    // elsewhere but follows the pin, so the read inside the transaction
    // cannot see any row for it
    conn.query_drop("BEGIN").unwrap();
    conn.query_drop(format!(
        "INSERT INTO users (id, name) VALUES ({a}, 'pinned')"
    ))
    .unwrap();
    let other: Option<String> = conn
        .query_first(format!("SELECT name FROM users WHERE id = {b}"))
        .expect("pinned read should succeed");
    assert_eq!(other, None);
    conn.query_drop("ROLLBACK").unwrap();
}

#[test]
fn test_commit_without_begin_is_acknowledged() {
    skip_if_not_enabled!();

    let config = get_proxy_config();
    let mut conn = config.conn();

    conn.query_drop("COMMIT").expect("bare COMMIT should succeed");
    conn.query_drop("ROLLBACK").expect("bare ROLLBACK should succeed");
}
