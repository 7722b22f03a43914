//! Table browsing endpoints

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use super::navigator;
use crate::schema::{Column, TablePage};
use crate::session::SessionRegistry;
use crate::Result;

/// Query parameters for GET /api/table
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableParams {
    pub name: String,

    #[serde(default = "default_page")]
    pub page: u64,

    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    50
}

/// Query parameters naming a single table
#[derive(Debug, Deserialize)]
pub struct NameParams {
    pub name: String,
}

/// Query parameters naming an optional table
#[derive(Debug, Deserialize)]
pub struct OptionalNameParams {
    pub name: Option<String>,
}

/// Handler for GET /api/table
///
/// Returns one page of rows together with column metadata and pagination.
pub async fn get_table_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Query(params): Query<TableParams>,
) -> Result<Json<TablePage>> {
    let navigator = navigator(&registry, &headers).await;
    let page = navigator
        .get_table(&params.name, params.page, params.per_page)
        .await?;
    Ok(Json(page))
}

/// Handler for GET /api/columns/table
pub async fn get_columns_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Query(params): Query<NameParams>,
) -> Result<Json<Vec<Column>>> {
    let navigator = navigator(&registry, &headers).await;
    Ok(Json(navigator.get_columns(&params.name).await?))
}

/// Handler for GET /api/table/size
///
/// Size of the named table, or of every table when `name` is omitted.
pub async fn table_size_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Query(params): Query<OptionalNameParams>,
) -> Result<Response> {
    let navigator = navigator(&registry, &headers).await;

    match params.name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => Ok(Json(navigator.table_size(name).await?).into_response()),
        None => Ok(Json(navigator.table_sizes().await?).into_response()),
    }
}
