pub mod error;
pub mod routes;
pub mod runs;
pub mod signature;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::{AppState, Services};

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        // Slack Events API
        .route("/events", post(routes::events::slack_events))
        // GitHub webhook relay
        .route("/gitshot", post(routes::gitshot::relay_webhook))
        // Introspection
        .route("/runs", get(routes::runs::list_runs))
        .route("/healthz", get(routes::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the deploybot server on `0.0.0.0:{port}`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the server on a pre-bound listener, so the caller can read the
/// actual port first when binding port 0.
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("deploybot listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
