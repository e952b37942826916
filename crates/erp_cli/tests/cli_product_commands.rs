//! CLI product command integration tests

use rusqlite::Connection;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_cli(db_path: &Path, args: &[&str]) -> Output {
    let cli_bin = env!("CARGO_BIN_EXE_erp");
    Command::new(cli_bin)
        .arg("--db")
        .arg(db_path)
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn write_payload(dir: &TempDir, name: &str, payload: Value) -> String {
    let path = dir.path().join(name);
    fs::write(&path, payload.to_string()).unwrap();
    path.to_str().unwrap().to_string()
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "CLI command should succeed. Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn product_create_then_get_round_trips_through_the_cli() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("erp.db");

    let input_payload = write_payload(&temp_dir, "input.json", json!({ "name": "Oak board" }));
    let input = stdout_json(&run_cli(
        &db_path,
        &["entity", "input", "create", "--payload", &input_payload],
    ));
    let input_id = input["id"].as_i64().unwrap();

    let product_payload = write_payload(
        &temp_dir,
        "product.json",
        json!({
            "name": "Table",
            "sku": "TBL-1",
            "sale_price": "120.00",
            "inputs_manager": { "added": [{ "input_id": input_id, "quantity": "4" }] },
            "processes_manager": {
                "added": [{
                    "process": { "kind": "by_inline_definition", "name": "Assembly" },
                    "sort_order": 1
                }]
            }
        }),
    );
    let created = stdout_json(&run_cli(
        &db_path,
        &["product", "create", "--payload", &product_payload],
    ));
    let product_id = created["id"].as_i64().unwrap();
    assert_eq!(created["inputs"].as_array().unwrap().len(), 1);
    assert_eq!(created["process_steps"].as_array().unwrap().len(), 1);

    let fetched = stdout_json(&run_cli(
        &db_path,
        &["product", "get", &product_id.to_string()],
    ));
    assert_eq!(fetched["sku"], json!("TBL-1"));

    let conn = Connection::open(&db_path).unwrap();
    let processes: i64 = conn
        .query_row("SELECT COUNT(*) FROM processes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(processes, 1, "inline process should be persisted");
}

#[test]
fn missing_product_exits_with_not_found_code() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("erp.db");

    let output = run_cli(&db_path, &["product", "get", "999"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error_code=not_found") && stderr.contains("status=404"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn unknown_entity_kind_is_rejected_by_argument_parsing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("erp.db");

    let output = run_cli(&db_path, &["entity", "warehouse", "get", "1"]);

    assert!(!output.status.success());
}
