use erp_core::db::migrations::latest_version;
use erp_core::db::{open_db, open_db_in_memory, schema_version, DbError};
use rusqlite::Connection;

const TABLES: [&str; 10] = [
    "inputs",
    "processes",
    "products",
    "product_inputs",
    "product_processes",
    "product_discount_ranges",
    "clients",
    "client_product_discounts",
    "locations",
    "production_lines",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    for table in TABLES {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn foreign_keys_are_enforced_on_opened_connections() {
    let conn = open_db_in_memory().unwrap();

    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let orphan = conn.execute(
        "INSERT INTO product_inputs (product_id, input_id, quantity) VALUES (77, 88, '1');",
        [],
    );
    assert!(orphan.is_err(), "orphan child row must be rejected");
}

#[test]
fn reopening_a_database_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("erp.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute("INSERT INTO inputs (name) VALUES ('Glue');", [])
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second).unwrap(), latest_version());
    let inputs: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM inputs;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(inputs, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn sort_order_is_unique_per_product_in_storage() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO products (id, name) VALUES (1, 'Chair');
         INSERT INTO processes (id, name) VALUES (1, 'Cut');
         INSERT INTO product_processes (product_id, process_id, sort_order) VALUES (1, 1, 1);",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO product_processes (product_id, process_id, sort_order) VALUES (1, 1, 1);",
        [],
    );
    assert!(duplicate.is_err());
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
