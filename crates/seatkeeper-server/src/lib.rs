pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        // Venues
        .route(
            "/api/accounts/{user}/venues",
            get(routes::venues::list_venues),
        )
        .route(
            "/api/accounts/{user}/venues/{id}/layout",
            get(routes::venues::get_layout),
        )
        .route(
            "/api/accounts/{user}/frequent-seats",
            get(routes::venues::frequent_seats),
        )
        // Reservation
        .route(
            "/api/accounts/{user}/reservation",
            get(routes::reservation::get_reservation)
                .post(routes::reservation::book)
                .delete(routes::reservation::cancel),
        )
        .route(
            "/api/accounts/{user}/signin",
            post(routes::reservation::sign_in),
        )
        // Tasks
        .route(
            "/api/accounts/{user}/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/accounts/{user}/tasks/{id}",
            put(routes::tasks::update_task).delete(routes::tasks::delete_task),
        )
        .route(
            "/api/accounts/{user}/tasks/{id}/toggle",
            post(routes::tasks::toggle_task),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves.
pub async fn serve<F>(app_state: AppState, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, shutdown).await
}

/// Serve on a pre-bound listener until `shutdown` resolves.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can pick an ephemeral port first.
pub async fn serve_on<F>(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("seatkeeper API listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("seatkeeper API stopped");
    Ok(())
}
