//! Route definitions
//!
//! This module maps every HTTP route to its handler and builds the Axum router
//! with the application state.

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::database::AppState;
use crate::handler::{
    create_link, go_link, link_stats, redirect_link, render_qr, unlock_link, update_link,
};
use crate::middleware::auth_middleware;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /s/{code}` - Resolves a smart link (public endpoint)
/// - `GET /s/{code}/go` - Counts the click and redirects; target of the browser redirect page
/// - `POST /s/{code}/unlock` - Submits the password of a protected link (public endpoint)
/// - `POST /api/links` - Creates a smart link
/// - `GET /api/links/{code}` - Click count and policy of a link
/// - `PATCH /api/links/{code}` - Changes the destination of a link
/// - `POST /api/qr?format=...` - Renders and exports a QR code
///
/// Everything under `/api` passes through [`auth_middleware`].
///
/// # Example Usage
///
/// ```no_run
/// # use std::sync::Arc;
/// # use qrenzo::asset::DefaultAssetLoader;
/// # use qrenzo::config::AppConfig;
/// # use qrenzo::database::{AppState, RedbStore};
/// # use qrenzo::encoder::QrCodeEncoder;
/// # use qrenzo::pipeline::Renderer;
/// # use qrenzo::route::create_app;
/// let state = AppState {
///     store: Arc::new(RedbStore::open("data.db").unwrap()),
///     renderer: Arc::new(Renderer::new(Arc::new(QrCodeEncoder), Arc::new(DefaultAssetLoader))),
///     config: Arc::new(AppConfig::default()),
/// };
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    // API routes that require authorization check
    let api_routes = Router::new()
        .route("/links", post(create_link))
        .route("/links/{code}", get(link_stats).patch(update_link))
        .route("/qr", post(render_qr))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        // Public smart link endpoints, the URL encoded in QR codes
        .route("/s/{code}", get(redirect_link))
        .route("/s/{code}/go", get(go_link))
        .route("/s/{code}/unlock", post(unlock_link))
        // Mount API routes under /api
        .nest("/api", api_routes)
        // Inject the application state into all handlers
        .with_state(state)
}
