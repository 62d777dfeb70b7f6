//! Static asset routes: the demo page and its compiled client bundle.
//!
//! Files are read from disk on every request, so the assets directory can
//! be rebuilt while the server runs. A missing file answers 404.

use std::path::Path;

use axum::Router;
use tower_http::services::ServeFile;

/// Page served at `/`.
pub const INDEX_FILE: &str = "index.html";
/// Client bundle served at `/elm.js`.
pub const BUNDLE_FILE: &str = "elm.js";

/// Routes for `/` and `/elm.js`, rooted at `dir`.
pub fn routes<S>(dir: &Path) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route_service("/", ServeFile::new(dir.join(INDEX_FILE)))
        .route_service("/elm.js", ServeFile::new(dir.join(BUNDLE_FILE)))
}
