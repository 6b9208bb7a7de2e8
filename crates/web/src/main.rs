use std::{error::Error, process::ExitCode, sync::Arc};

use directions::DirectionsClient;
use identity::{Auth, InMemoryBackend, Settings};
use location::{push::PushProvider, scripted::ScriptedProvider, LocationProvider, Tracker, TrackerConfig};
use model::{position::Position, route::Route, ExampleData};
use route_execution::{ExecutionConfig, RouteExecution, RouteSession, RouteStore};
use tracing_subscriber::EnvFilter;
use web::{start_web_server, tracking::Tracking, WebConfig, WebState};

async fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, Box<dyn Error>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = WebConfig::from_env();

    // route
    let route = match &config.route_file {
        Some(path) => {
            log::info!("loading route from '{path}'");
            read_json::<Route>(path).await?
        }
        None => {
            log::warn!("ROUTE_FILE not set, using the example route");
            Route::example_data()
        }
    };
    let execution_config = ExecutionConfig::from_env();
    let store = RouteStore::spawn(RouteExecution::new(route, execution_config)?);

    // location
    let mut push = None;
    let provider: Arc<dyn LocationProvider> = match &config.track_file {
        Some(path) => {
            log::info!("replaying positions from '{path}'");
            let positions = read_json::<Vec<Position>>(path).await?;
            Arc::new(ScriptedProvider::replay(positions, config.track_interval))
        }
        None => {
            let provider = Arc::new(PushProvider::default());
            push = Some(provider.clone());
            provider
        }
    };
    let tracker = Tracker::new(provider, TrackerConfig::from_env());
    let tracking = Tracking::new(tracker, RouteSession::new(store.clone()), push);

    // identity
    let auth = Auth::new(Arc::new(InMemoryBackend::new()), Settings::from_env());

    // directions
    let directions = match DirectionsClient::from_env() {
        Ok(client) => Some(Arc::new(client)),
        Err(why) => {
            log::warn!("directions disabled: {why}");
            None
        }
    };

    // web server
    let state = WebState {
        store,
        tracking,
        auth: Arc::new(auth),
        directions,
    };
    start_web_server(state, &config).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    if let Err(why) = tracing::subscriber::set_global_default(subscriber) {
        log::warn!("could not install tracing subscriber: {why}");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(why) => {
            log::error!("{why}");
            ExitCode::FAILURE
        }
    }
}
