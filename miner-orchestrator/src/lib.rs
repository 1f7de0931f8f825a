//! Process supervisor and control plane for a fleet of external miner
//! worker processes: lifecycle management, crash-loop backoff, hot
//! reconfiguration, round-robin autoswitch, and an authenticated HTTP API.

pub mod adapters;
pub mod api;
pub mod auth;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logrotate;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod supervisor;
pub mod worker_instance;

use poem::middleware::CookieJarManager;
use poem::{EndpointExt, Route};
use tracing::info;

use crate::auth::RateLimitLayer;
use crate::orchestrator::Orchestrator;

/// Builds the full HTTP route: the OpenAPI service, its Swagger UI and raw
/// spec, all wrapped in the cookie jar and rate-limit middleware.
pub fn build_route(orchestrator: &Orchestrator) -> Route {
    let api_service = api::make_open_api_service(orchestrator);
    let ui = api_service.swagger_ui();
    let spec = api_service.spec_endpoint_yaml();
    let rate_limit = RateLimitLayer {
        limiter: orchestrator.rate_limiter().clone(),
    };

    Route::new()
        .nest("/", api_service)
        .nest("/docs", ui)
        .nest("/specs", spec)
        .with(CookieJarManager::new())
        .with(rate_limit)
}

/// Starts the HTTP server on the configured bind address, returning once
/// the listener is bound (the serve loop itself runs until the process
/// exits or errors).
pub async fn serve(orchestrator: Orchestrator) -> anyhow::Result<()> {
    let config = orchestrator.config().await;
    let route = build_route(&orchestrator);
    let addr = format!("{}:{}", config.api.bind_address, config.api.port);

    info!(%addr, "starting HTTP server");
    poem::Server::new(poem::listener::TcpListener::bind(addr))
        .run(route)
        .await?;
    Ok(())
}
