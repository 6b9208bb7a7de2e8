pub use crate::common::RouteResult;

use std::{env, sync::Arc, time::Duration};

use axum::{extract::FromRef, Router};
use directions::DirectionsClient;
use identity::Auth;
use route_execution::RouteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracking::Tracking;

pub mod api;
pub mod common;
pub mod hateoas;
pub mod middleware;
pub mod tracking;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_TRACK_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq)]
pub struct WebConfig {
    pub bind_address: String,
    /// JSON route loaded at startup, the example route otherwise
    pub route_file: Option<String>,
    /// JSON positions replayed instead of accepting pushed ones
    pub track_file: Option<String>,
    /// pause between replayed positions
    pub track_interval: Duration,
}

impl WebConfig {
    /// Reads `BIND_ADDRESS`, `ROUTE_FILE`, `TRACK_FILE` and
    /// `TRACK_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let track_interval = env::var("TRACK_INTERVAL_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TRACK_INTERVAL);
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_owned()),
            route_file: env::var("ROUTE_FILE").ok(),
            track_file: env::var("TRACK_FILE").ok(),
            track_interval,
        }
    }
}

#[derive(Clone, FromRef)]
pub struct WebState {
    pub store: RouteStore,
    pub tracking: Tracking,
    pub auth: Arc<Auth>,
    /// `None` without `MAPBOX_ACCESS_TOKEN`
    pub directions: Option<Arc<DirectionsClient>>,
}

pub fn app(state: WebState) -> Router {
    Router::new()
        .nest_service("/api", api::routes(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(state: WebState, config: &WebConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(&config.bind_address).await?;
    log::info!("listening on {}", config.bind_address);
    axum::serve(listener, app(state).into_make_service()).await?;

    Ok(())
}
