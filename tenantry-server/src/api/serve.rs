use axum::{
    Router,
    http::{Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::{sync::Arc, time::Duration};

use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    api::{members, org},
    config::AppConfig,
    db::Mongo,
    mail::Mailer,
    response::ServerResult,
    util::app_state::AppState,
};

async fn get_status() -> impl IntoResponse {
    "ok".to_string()
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            header::HeaderName::from_static("x-pagination-count"),
            header::HeaderName::from_static("x-pagination-offset"),
            header::HeaderName::from_static("x-pagination-limit"),
        ]);

    Router::new()
        .nest("/organizations", org::create_route())
        .nest("/organization-members", members::create_route())
        .route("/status", get(get_status))
        .with_state(state)
        .layer(cors)
        .layer(SetSensitiveHeadersLayer::new(std::iter::once(
            header::AUTHORIZATION,
        )))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}

pub async fn serve(
    db: Arc<Mongo>,
    cfg: Arc<AppConfig>,
    mailer: Arc<dyn Mailer>,
) -> ServerResult<()> {
    let state = AppState {
        db,
        config: cfg.clone(),
        mailer,
    };
    let app = router(state);

    let listener = TcpListener::bind(("0.0.0.0", cfg.rest_port)).await?;
    info!("REST listening on 0.0.0.0:{}", cfg.rest_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e:?}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
