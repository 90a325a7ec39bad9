use axum::{routing::delete, routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::api::feeds as feed_handlers;
use super::api_doc::ApiDoc;
use super::config::Config;
use super::feeds::{AppState, FeedRegistry};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Ingest
        .route(
            "/api/feeds/{faction}/events",
            post(feed_handlers::push_event),
        )
        .route(
            "/api/feeds/{faction}/history",
            post(feed_handlers::ingest_history),
        )
        // Queries
        .route("/api/feeds/{faction}/latest", get(feed_handlers::latest))
        .route("/api/feeds/{faction}/routes", get(feed_handlers::routes))
        .route("/api/feeds/{faction}/stats", get(feed_handlers::stats))
        .route(
            "/api/feeds/{faction}/selection",
            get(feed_handlers::get_selection).put(feed_handlers::put_selection),
        )
        // Eviction
        .route(
            "/api/feeds/{faction}/tracks",
            get(feed_handlers::all_tracks).delete(feed_handlers::clear_tracks),
        )
        .route(
            "/api/feeds/{faction}/tracks/{entity_id}",
            delete(feed_handlers::remove_track),
        )
        // Feed lifecycle
        .route("/api/feeds/{faction}/start", post(feed_handlers::start_feed))
        .route("/api/feeds/{faction}/stop", post(feed_handlers::stop_feed))
        .route(
            "/api/feeds/{faction}/status",
            get(feed_handlers::feed_status),
        )
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();
    let feeds = Arc::new(FeedRegistry::from_config(&config));

    if config.api_keys.is_empty() {
        log::warn!("No API keys configured; every request will be rejected");
    }

    let state = AppState {
        config: Arc::new(config),
        feeds: feeds.clone(),
    };
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feeds.stop_all().await;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
