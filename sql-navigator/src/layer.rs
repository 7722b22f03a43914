//! NavigatorLayer - Axum integration layer
//!
//! Mounts the navigator API into an Axum application.

use crate::api::create_api_router;
use crate::session::SessionRegistry;
use axum::Router;
use tower_http::cors::CorsLayer;

/// Main layer for integrating the navigator into an Axum application
///
/// # Example
///
/// ```rust,no_run
/// use axum::Router;
/// use sql_navigator::{NavigatorLayer, SessionRegistry};
///
/// let navigator = NavigatorLayer::new("/navigator", SessionRegistry::default());
/// let app: Router = Router::new().merge(navigator.into_router());
/// ```
pub struct NavigatorLayer {
    base_path: String,
    registry: SessionRegistry,
}

impl NavigatorLayer {
    /// Create a new navigator at the given base path
    ///
    /// # Arguments
    ///
    /// * `base_path` - The URL path where the navigator will be mounted (e.g., "/navigator")
    /// * `registry` - Sessions shared by every request
    pub fn new(base_path: impl Into<String>, registry: SessionRegistry) -> Self {
        Self {
            base_path: base_path.into(),
            registry,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Convert into an Axum Router that can be merged
    ///
    /// API endpoints are served at `{base_path}/api/*` behind permissive CORS.
    pub fn into_router(self) -> Router {
        let base_path = self.base_path.trim_end_matches('/');

        Router::new()
            .nest(&format!("{}/api", base_path), create_api_router(self.registry))
            .layer(CorsLayer::permissive())
    }
}
