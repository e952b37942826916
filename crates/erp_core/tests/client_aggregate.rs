use erp_core::db::open_db_in_memory;
use erp_core::{ClientPayload, ClientService, EntityKind, ProductService, ServiceError};
use rusqlite::Connection;
use serde_json::{json, Value};

fn payload(value: Value) -> ClientPayload {
    serde_json::from_value(value).unwrap()
}

fn create_product(conn: &mut Connection, name: &str) -> i64 {
    let product = ProductService::new(conn)
        .create(serde_json::from_value(json!({ "name": name })).unwrap())
        .unwrap();
    product.product["id"].as_i64().unwrap()
}

fn discount_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM client_product_discounts;", [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn create_client_with_discounts() {
    let mut conn = open_db_in_memory().unwrap();
    let table = create_product(&mut conn, "Table");
    let chair = create_product(&mut conn, "Chair");

    let client = ClientService::new(&mut conn)
        .create(payload(json!({
            "name": "Acme",
            "tax_id": "ACME-01",
            "credit_limit": "1500.00",
            "discounts_manager": {
                "added": [
                    { "product_id": table, "discount_percent": "5" },
                    { "product_id": chair, "discount_percent": 7.5 }
                ]
            }
        })))
        .unwrap();

    assert_eq!(client.client["name"], json!("Acme"));
    assert_eq!(client.product_discounts.len(), 2);
    assert_eq!(client.product_discounts[1]["discount_percent"], json!("7.5"));
}

#[test]
fn two_discounts_for_one_product_are_a_conflict() {
    let mut conn = open_db_in_memory().unwrap();
    let table = create_product(&mut conn, "Table");

    let err = ClientService::new(&mut conn)
        .create(payload(json!({
            "name": "Acme",
            "discounts_manager": {
                "added": [
                    { "product_id": table, "discount_percent": 5 },
                    { "product_id": table, "discount_percent": 10 }
                ]
            }
        })))
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Conflict {
            entity: EntityKind::ClientProductDiscount,
            field: "product_id",
            ..
        }
    ));
    let clients: i64 = conn
        .query_row("SELECT COUNT(*) FROM clients;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(clients, 0, "client insert must be rolled back");
}

#[test]
fn discount_for_missing_product_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();

    let err = ClientService::new(&mut conn)
        .create(payload(json!({
            "name": "Acme",
            "discounts_manager": { "added": [{ "product_id": 9, "discount_percent": 5 }] }
        })))
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::NotFound {
            entity: EntityKind::Product,
            id: 9
        }
    ));
}

#[test]
fn echoed_client_is_a_no_op_and_partial_update_applies() {
    let mut conn = open_db_in_memory().unwrap();
    let table = create_product(&mut conn, "Table");
    let client = ClientService::new(&mut conn)
        .create(payload(json!({
            "name": "Acme",
            "discounts_manager": { "added": [{ "product_id": table, "discount_percent": 5 }] }
        })))
        .unwrap();
    let id = client.client["id"].as_i64().unwrap();
    let discount_id = client.product_discounts[0]["id"].as_i64().unwrap();

    let unchanged = ClientService::new(&mut conn)
        .update(id, client.to_payload())
        .unwrap();
    assert_eq!(unchanged, client);

    let updated = ClientService::new(&mut conn)
        .update(
            id,
            payload(json!({
                "email": "billing@acme.test",
                "discounts_manager": {
                    "updated": [{ "id": discount_id, "discount_percent": "12.5" }]
                }
            })),
        )
        .unwrap();
    assert_eq!(updated.client["email"], json!("billing@acme.test"));
    assert_eq!(updated.product_discounts[0]["discount_percent"], json!("12.5"));
}

#[test]
fn swapping_discounted_products_succeeds() {
    let mut conn = open_db_in_memory().unwrap();
    let table = create_product(&mut conn, "Table");
    let chair = create_product(&mut conn, "Chair");
    let client = ClientService::new(&mut conn)
        .create(payload(json!({
            "name": "Acme",
            "discounts_manager": {
                "added": [
                    { "product_id": table, "discount_percent": 5 },
                    { "product_id": chair, "discount_percent": 10 }
                ]
            }
        })))
        .unwrap();
    let id = client.client["id"].as_i64().unwrap();
    let on_table = client.product_discounts[0]["id"].as_i64().unwrap();
    let on_chair = client.product_discounts[1]["id"].as_i64().unwrap();

    let updated = ClientService::new(&mut conn)
        .update(
            id,
            payload(json!({
                "discounts_manager": {
                    "updated": [
                        { "id": on_table, "product_id": chair },
                        { "id": on_chair, "product_id": table }
                    ]
                }
            })),
        )
        .unwrap();

    assert_eq!(updated.product_discounts[0]["product_id"], json!(chair));
    assert_eq!(updated.product_discounts[0]["discount_percent"], json!("5"));
    assert_eq!(updated.product_discounts[1]["product_id"], json!(table));
    assert_eq!(discount_count(&conn), 2);
}

#[test]
fn duplicate_tax_id_is_a_conflict() {
    let mut conn = open_db_in_memory().unwrap();
    ClientService::new(&mut conn)
        .create(payload(json!({ "name": "Acme", "tax_id": "T-1" })))
        .unwrap();

    let err = ClientService::new(&mut conn)
        .create(payload(json!({ "name": "Globex", "tax_id": "T-1" })))
        .unwrap_err();

    assert!(matches!(err, ServiceError::Conflict { field: "tax_id", .. }));
}

#[test]
fn delete_client_removes_discounts() {
    let mut conn = open_db_in_memory().unwrap();
    let table = create_product(&mut conn, "Table");
    let client = ClientService::new(&mut conn)
        .create(payload(json!({
            "name": "Acme",
            "discounts_manager": { "added": [{ "product_id": table, "discount_percent": 5 }] }
        })))
        .unwrap();
    let id = client.client["id"].as_i64().unwrap();

    ClientService::new(&mut conn).delete(id).unwrap();

    assert_eq!(discount_count(&conn), 0);
    assert!(matches!(
        ClientService::new(&mut conn).delete(id),
        Err(ServiceError::NotFound { .. })
    ));
}
