//! Session endpoints

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde_json::Value;

use super::navigator;
use crate::schema::Connected;
use crate::session::SessionRegistry;
use crate::{ConnectionProfile, Result};

/// Handler for POST /api/connect
///
/// Opens a session for the caller, replacing any session it already holds,
/// and returns the schema name with every table's columns.
pub async fn connect_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
    Json(profile): Json<ConnectionProfile>,
) -> Result<Json<Connected>> {
    let navigator = navigator(&registry, &headers).await;
    Ok(Json(navigator.connect(profile).await?))
}

/// Handler for POST /api/disconnect
pub async fn disconnect_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    navigator(&registry, &headers).await.disconnect().await?;
    Ok(Json(serde_json::json!({ "message": "Disconnected successfully" })))
}

/// Handler for GET /api/schemas
pub async fn list_schemas_handler(
    State(registry): State<SessionRegistry>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>> {
    let navigator = navigator(&registry, &headers).await;
    Ok(Json(navigator.list_schemas().await?))
}
