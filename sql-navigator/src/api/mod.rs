//! REST API endpoints
//!
//! Thin handlers mapping HTTP verbs and paths onto [`Navigator`](crate::Navigator)
//! calls. The caller's session is chosen by the `x-session-id` header.

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::client::Navigator;
use crate::session::{SessionId, SessionRegistry};
use crate::{Error, ErrorKind};

pub mod connection;
pub mod export;
pub mod query;
pub mod tables;

// Re-export handlers for convenience
pub use connection::{connect_handler, disconnect_handler, list_schemas_handler};
pub use export::{export_csv_handler, export_json_handler, export_sql_handler};
pub use query::{execute_query_handler, update_cell_handler};
pub use tables::{get_columns_handler, get_table_handler, table_size_handler};

/// Header carrying the caller's session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Create the API router with all endpoints
pub fn create_api_router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/connect", post(connect_handler))
        .route("/disconnect", post(disconnect_handler))
        .route("/schemas", get(list_schemas_handler))
        .route("/table", get(get_table_handler))
        .route("/columns/table", get(get_columns_handler))
        .route("/table/size", get(table_size_handler))
        .route("/update", post(update_cell_handler))
        .route("/execute", post(execute_query_handler))
        .route("/export/json", get(export_json_handler))
        .route("/export/csv", get(export_csv_handler))
        .route("/export/sql", get(export_sql_handler))
        .with_state(registry)
}

/// Session id from the request headers, falling back to the default session
pub fn session_id(headers: &HeaderMap) -> SessionId {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
        .unwrap_or_default()
}

pub(crate) async fn navigator(registry: &SessionRegistry, headers: &HeaderMap) -> Arc<Navigator> {
    registry.navigator(&session_id(headers)).await
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ConnectionFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::UnsupportedDialect => StatusCode::BAD_REQUEST,
        ErrorKind::NoActiveConnection => StatusCode::CONFLICT,
        ErrorKind::QueryExecutionFailed => StatusCode::BAD_REQUEST,
        ErrorKind::IntrospectionFailed | ErrorKind::ExportFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (
            status,
            Json(serde_json::json!({
                "message": self.to_string(),
                "error": format!("{:?}", kind),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), SessionId::default());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id(&headers), SessionId::default());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("tab-42"));
        assert_eq!(session_id(&headers).as_str(), "tab-42");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            Error::NoActiveConnection.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::unsupported(crate::DialectKind::Sqlite, "table size")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::ConnectionFailed("refused".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
