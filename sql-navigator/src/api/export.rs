//! Export endpoints
//!
//! Responses are sent as attachments named after the table (or the schema for
//! the DDL script).

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};

use super::navigator;
use super::tables::NameParams;
use crate::session::SessionRegistry;
use crate::Result;

fn attachment(content_type: &'static str, file_name: &str, body: impl IntoResponse) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        body,
    )
        .into_response()
}

/// Handler for GET /api/export/json
pub async fn export_json_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Query(params): Query<NameParams>,
) -> Result<Response> {
    let navigator = navigator(&registry, &headers).await;
    let body = navigator.export_json(&params.name).await?;
    Ok(attachment(
        "application/json",
        &format!("{}.json", params.name),
        body,
    ))
}

/// Handler for GET /api/export/csv
pub async fn export_csv_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Query(params): Query<NameParams>,
) -> Result<Response> {
    let navigator = navigator(&registry, &headers).await;
    let body = navigator.export_csv(&params.name).await?;
    Ok(attachment(
        "text/csv; charset=utf-8",
        &format!("{}.csv", params.name),
        body,
    ))
}

/// Handler for GET /api/export/sql
pub async fn export_sql_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
) -> Result<Response> {
    let navigator = navigator(&registry, &headers).await;
    let body = navigator.export_schema_ddl().await?;
    let snapshot = navigator.snapshot().await?;
    Ok(attachment(
        "application/sql; charset=utf-8",
        &format!("{}.sql", snapshot.name),
        body,
    ))
}
