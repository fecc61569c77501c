use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod engine;
mod models;
mod routes;
mod settings;

use engine::DesignEngine;
use routes::AppState;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "design_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    tracing::info!(
        "   Facility server: {} | base map: {}",
        settings.fetcher.gis_url,
        settings.fetcher.base_url
    );
    tracing::info!(
        "   Design constants: reach {}m, fast-track {}m, pole interval {}m",
        settings.selector.max_reach_m,
        settings.selector.fast_track_m,
        settings.graph.pole_interval_m
    );

    let engine = DesignEngine::new(settings)?;
    let state = AppState {
        engine: Arc::new(engine),
    };

    let api_routes = Router::new()
        .route("/design", post(routes::run_design))
        .route("/design/facilities", post(routes::list_facilities))
        .route("/design/cache", get(routes::cache_stats))
        .with_state(state);

    let app = Router::new()
        .route("/health", get(routes::health))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive());

    let port = std::env::var("GRID_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "18650".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("⚡ Design gateway starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
