//! Statement endpoints

use axum::{extract::State, http::HeaderMap, response::Json};

use super::navigator;
use crate::schema::{CellUpdate, QueryRequest, QueryResult};
use crate::session::SessionRegistry;
use crate::Result;

/// Handler for POST /api/execute
///
/// Executes a raw SQL statement in the caller's session.
///
/// # Security Warning
///
/// This endpoint runs ANY SQL statement including INSERT, UPDATE, DELETE and DROP.
/// It should only be used in development environments!
///
/// Request body:
/// ```json
/// { "sql": "SELECT * FROM users LIMIT 10" }
/// ```
pub async fn execute_query_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>> {
    let navigator = navigator(&registry, &headers).await;
    Ok(Json(navigator.execute_raw_query(&request.sql).await?))
}

/// Handler for POST /api/update
///
/// Request body:
/// ```json
/// { "table": "users", "column": "name", "newValue": "bob", "keyColumn": "id", "keyValue": "2" }
/// ```
pub async fn update_cell_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Json(update): Json<CellUpdate>,
) -> Result<Json<QueryResult>> {
    let navigator = navigator(&registry, &headers).await;
    Ok(Json(navigator.update_cell(&update).await?))
}
