//! End-to-end tests: HttpConnection against a real dbproxy server
//!
//! The server runs in-process on an ephemeral port over an in-memory SQLite
//! database.

use dbproxy_client::{ClientConfig, DatabaseDriver, DbError, HttpConnection, InsertId};
use dbproxy_server::{serve_with_listener, RemoteExecutor, SqliteConnection};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn start_server(token: Option<&str>) -> String {
    let driver = SqliteConnection::open_in_memory("shop").unwrap();
    let executor = RemoteExecutor::new(Arc::new(driver), token.map(str::to_string));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve_with_listener(listener, executor, "/proxy").await.unwrap();
    });
    format!("http://{}/proxy", addr)
}

fn client(url: &str, token: Option<&str>) -> HttpConnection {
    let mut config = ClientConfig::from_url(url);
    config.token = token.map(str::to_string);
    HttpConnection::connect(&config).unwrap()
}

async fn connect(token: Option<&str>) -> HttpConnection {
    let url = start_server(token).await;
    client(&url, token)
}

const CREATE_PRODUCTS: &str =
    "CREATE TABLE products (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, price INTEGER)";

async fn with_products(db: &HttpConnection) {
    assert!(db.unprepared(CREATE_PRODUCTS).await.unwrap());
}

#[tokio::test]
async fn test_driver_types_survive_round_trip() {
    let db = connect(Some("T")).await;
    with_products(&db).await;

    let inserted = db
        .insert("INSERT INTO products (name, price) VALUES (?, ?)", &[json!("lamp"), json!(30)])
        .await
        .unwrap();
    assert!(inserted);
    db.insert("INSERT INTO products (name, price) VALUES (?, ?)", &[json!("desk"), json!(120)])
        .await
        .unwrap();

    let rows = db
        .select("SELECT name, price FROM products ORDER BY id", &[], true)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("lamp"));
    assert_eq!(rows[1]["price"], json!(120));

    let row = db
        .select_one("SELECT name FROM products WHERE price > ?", &[json!(100)], true)
        .await
        .unwrap();
    assert_eq!(row.unwrap()["name"], json!("desk"));

    let none = db
        .select_one("SELECT name FROM products WHERE price > ?", &[json!(1000)], true)
        .await
        .unwrap();
    assert!(none.is_none());

    let updated = db
        .update("UPDATE products SET price = price + 1", &[])
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let affected = db
        .affecting_statement(
            "UPDATE products SET name = ? WHERE id = ?",
            &[json!("chair"), json!(2)],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let deleted = db
        .delete("DELETE FROM products WHERE name = ?", &[json!("lamp")])
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    assert!(db
        .statement("CREATE INDEX products_name ON products (name)", &[])
        .await
        .unwrap());

    assert_eq!(db.database_name().await.unwrap(), "shop");
}

#[tokio::test]
async fn test_last_insert_id_follows_server() {
    let db = connect(None).await;
    assert_eq!(db.last_insert_id(), InsertId::Unavailable);
    with_products(&db).await;

    for name in ["a", "b", "c"] {
        db.insert("INSERT INTO products (name) VALUES (?)", &[json!(name)])
            .await
            .unwrap();
    }
    assert_eq!(db.last_insert_id(), InsertId::Int(3));

    db.select("SELECT * FROM products", &[], true).await.unwrap();
    assert_eq!(db.last_insert_id(), InsertId::Int(3));
}

#[tokio::test]
async fn test_insert_id_42() {
    let db = connect(None).await;
    with_products(&db).await;
    db.insert("INSERT INTO products (id, name) VALUES (?, ?)", &[json!(42), json!("answer")])
        .await
        .unwrap();
    assert_eq!(db.last_insert_id(), InsertId::Int(42));
}

#[tokio::test]
async fn test_insert_id_stays_with_the_inserting_client() {
    let url = start_server(None).await;
    let a = client(&url, None);
    let b = client(&url, None);
    with_products(&a).await;

    a.insert("INSERT INTO products (id, name) VALUES (?, ?)", &[json!(77), json!("lamp")])
        .await
        .unwrap();
    assert_eq!(a.last_insert_id(), InsertId::Int(77));
    assert_eq!(b.last_insert_id(), InsertId::Unavailable);

    let rows = b.select("SELECT 1 AS one", &[], true).await.unwrap();
    assert_eq!(rows[0]["one"], json!(1));
    assert_eq!(b.last_insert_id(), InsertId::Unavailable);

    a.select("SELECT * FROM products", &[], true).await.unwrap();
    assert_eq!(a.last_insert_id(), InsertId::Int(77));
}

#[tokio::test]
async fn test_remote_error_is_reraised() {
    let db = connect(None).await;
    let err = db
        .select("SELECT * FROM nowhere", &[], true)
        .await
        .unwrap_err();
    match err {
        DbError::Remote { name, message } => {
            assert_eq!(name, "QueryException");
            assert!(message.contains("nowhere"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_call_leaves_cell_untouched() {
    let db = connect(None).await;
    with_products(&db).await;
    db.insert("INSERT INTO products (id, name) VALUES (?, ?)", &[json!(7), json!("x")])
        .await
        .unwrap();
    db.set_last_insert_id(InsertId::Int(100));

    let err = db
        .insert("INSERT INTO products (id, name) VALUES (?, ?)", &[json!(7), json!("dup")])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Remote { .. }));
    assert_eq!(db.last_insert_id(), InsertId::Int(100));
}

#[tokio::test]
async fn test_wrong_token_is_authorization_error() {
    let url = start_server(Some("T")).await;
    let db = HttpConnection::connect(&ClientConfig::from_url(url).with_token("nope")).unwrap();
    let err = db.database_name().await.unwrap_err();
    match err {
        DbError::Remote { name, message } => {
            assert_eq!(name, "AuthorizationException");
            assert_eq!(message, "Bad authorization token");
        }
        other => panic!("expected authorization error, got {:?}", other),
    }
}
