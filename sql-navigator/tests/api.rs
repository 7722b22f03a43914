//! HTTP boundary tests driven through `tower::ServiceExt::oneshot`

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sql_navigator::{NavigatorLayer, SessionRegistry};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

async fn seed(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::raw_sql(
        r#"
        CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
        INSERT INTO books (id, title) VALUES (1, 'Dune'), (2, 'Emma');
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    pool.close().await;
}

fn router() -> Router {
    NavigatorLayer::new("/navigator", SessionRegistry::default()).into_router()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn get(uri: &str, session: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-session-id", session)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, session: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("x-session-id", session)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn connected_router() -> (TempDir, Router) {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("library.db");
    seed(&path).await;

    let router = router();
    let (status, body) = send(
        &router,
        post(
            "/navigator/api/connect",
            "reader",
            json!({ "databaseType": "sqlite", "filePath": path }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));

    let connected: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(connected["schema"], "library.db");
    assert_eq!(connected["tables"][0]["tableName"], "books");

    (directory, router)
}

#[tokio::test]
async fn test_requests_without_session_conflict() {
    let router = router();
    let (status, body) = send(&router, get("/navigator/api/table?name=books", "nobody")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "NoActiveConnection");
    assert_eq!(error["message"], "No active database connection");
}

#[tokio::test]
async fn test_unknown_dialect_is_bad_request() {
    let router = router();
    let (status, _) = send(
        &router,
        post(
            "/navigator/api/connect",
            "reader",
            json!({ "databaseType": "oracle", "host": "db" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_browse_and_query() {
    let (_directory, router) = connected_router().await;

    let (status, body) = send(
        &router,
        get("/navigator/api/table?name=books&page=1&perPage=1", "reader"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["totalRows"], 2);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["table"]["rows"][0]["title"], "Dune");
    assert_eq!(page["table"]["sizeMb"], Value::Null);

    let (status, body) = send(&router, get("/navigator/api/columns/table?name=books", "reader")).await;
    assert_eq!(status, StatusCode::OK);
    let columns: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(columns[0]["key"], "PRI");

    let (status, body) = send(
        &router,
        post(
            "/navigator/api/execute",
            "reader",
            json!({ "query": "SELECT title FROM books ORDER BY id DESC" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(result["affectedRows"], 2);
    assert_eq!(result["rows"][0]["title"], "Emma");

    let (status, _) = send(
        &router,
        post(
            "/navigator/api/update",
            "reader",
            json!({
                "table": "books",
                "column": "title",
                "newValue": "Persuasion",
                "keyColumn": "id",
                "keyValue": "2"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get("/navigator/api/table/size?name=books", "reader")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // another session sees nothing
    let (status, _) = send(&router, get("/navigator/api/schemas", "writer")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_exports_are_attachments() {
    let (_directory, router) = connected_router().await;

    let response = router
        .clone()
        .oneshot(get("/navigator/api/export/csv?name=books", "reader"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"books.csv\""
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"id,title\n1,Dune\n2,Emma\n");

    let (status, body) = send(&router, get("/navigator/api/export/sql", "reader")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("===== TABLE: books ====="));

    let (status, _) = send(&router, post("/navigator/api/disconnect", "reader", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, get("/navigator/api/export/json?name=books", "reader")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
