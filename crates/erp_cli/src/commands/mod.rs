//! Subcommand implementations and shared I/O helpers.

pub mod client;
pub mod entity;
pub mod product;

use log::info;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;

/// Opens (and migrates) the database named by `--db`.
pub fn open(db: &str) -> Result<Connection, Box<dyn std::error::Error>> {
    info!("event=cli_open module=cli status=start db={db}");
    Ok(erp_core::open_db(db)?)
}

/// Reads a JSON payload from a file path, or from stdin when `path` is `-`.
pub fn read_payload<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let raw = if path == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read payload `{path}`: {err}"))?
    };
    Ok(serde_json::from_str(&raw)?)
}

pub fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_deleted(kind: &str, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    print_json(&serde_json::json!({ "deleted": { "entity": kind, "id": id } }))
}
