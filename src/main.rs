use actix_web::{App, HttpServer, web};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod db;
mod model;
mod service;
#[cfg(test)]
mod testing;

use app::AppState;
use model::Config;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr();

    let state = AppState::new(config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let store = web::Data::from(state.store);
    let cache = web::Data::new(state.cache);
    let project_service = web::Data::from(state.project_service);
    let comment_service = web::Data::from(state.comment_service);
    let report_service = web::Data::from(state.report_service);

    tracing::info!("Starting stance-intel server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(store.clone())
            .app_data(cache.clone())
            .app_data(project_service.clone())
            .app_data(comment_service.clone())
            .app_data(report_service.clone())
            .configure(api::health::configure)
            .configure(api::openapi::configure)
            .configure(api::projects::configure)
            .configure(api::comments::configure)
            .configure(api::reports::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
