mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::session::SessionHandle;
use crate::store::LocationStore;

pub fn build_router(session: SessionHandle, store: LocationStore) -> Router {
    let state = Arc::new(AppState {
        session,
        store: Mutex::new(store),
    });

    Router::new()
        .route("/api/acquisition", get(handlers::acquisition))
        .route("/api/acquisition/toggle", post(handlers::toggle))
        .route("/api/acquisition/stop", post(handlers::stop))
        .route("/api/categories", get(handlers::categories))
        .route("/api/locations", get(handlers::list_locations).post(handlers::tag_location))
        .route(
            "/api/locations/{id}",
            get(handlers::get_location).delete(handlers::remove_location),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(host: &str, port: u16, session: SessionHandle, store: LocationStore) -> std::io::Result<()> {
    let app = build_router(session, store);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    eprintln!("  MyLocations server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}
