use std::sync::Arc;

use axum::{
    extract::{OriginalUri, State},
    http::{Method, StatusCode},
    routing::{get, on, post, put},
    Extension, Json, Router,
};
use location::{push::PushProvider, LocationError, PermissionState};
use model::position::Position;
use serde::{Deserialize, Serialize};

use crate::{
    common::{route_not_found, HateoasResult, RouteErrorResponse, RouteResult, METHOD_FILTER_ALL},
    hateoas,
    middleware::base_url::{base_url_middleware, BaseUrl},
    tracking::{NoticeEntry, Tracking},
    WebState,
};

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::v1::resource!("/tracking{}", format_args!($($arg)*))
    };
}
pub(crate) use resource;

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/", get(get_tracking))
        .route("/start", post(start_tracking))
        .route("/stop", post(stop_tracking))
        .route("/positions", post(push_position))
        .route("/permission", put(set_permission))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TrackingDto {
    running: bool,
    watching: bool,
    retry_count: u32,
    max_retries: u32,
    /// positions are accepted over http
    accepts_positions: bool,
    last_position: Option<Position>,
    notices: Vec<NoticeEntry>,
}

/// Either a fix or the error the device reported instead.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PositionPush {
    position: Option<Position>,
    error: Option<LocationError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PermissionUpdate {
    permission: PermissionState,
}

async fn tracking_hateoas(
    tracking: &Tracking,
    base_url: Arc<BaseUrl>,
) -> hateoas::Response<TrackingDto> {
    let tracker = tracking.tracker.lock().await;
    let running = tracker.is_running();
    let dto = TrackingDto {
        running,
        watching: tracker.live_watch().is_some(),
        retry_count: tracker.retry_count(),
        max_retries: tracker.config().max_retries,
        accepts_positions: tracking.push.is_some(),
        last_position: tracking.session.last_position(),
        notices: tracking.notices.entries(),
    };
    drop(tracker);

    hateoas::Response::builder(dto, base_url)
        .link("self", resource!(""))
        .action_if(running, "stop", resource!("/stop"))
        .action_if(!running, "start", resource!("/start"))
        .build()
}

async fn get_tracking(
    State(WebState { tracking, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<TrackingDto> {
    Ok(tracking_hateoas(&tracking, base_url).await.json())
}

async fn start_tracking(
    State(WebState { tracking, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<TrackingDto> {
    tracking.start().await;
    Ok(tracking_hateoas(&tracking, base_url).await.json())
}

async fn stop_tracking(
    State(WebState { tracking, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<TrackingDto> {
    tracking.stop().await;
    Ok(tracking_hateoas(&tracking, base_url).await.json())
}

fn push_provider(
    tracking: &Tracking,
    method: &Method,
    original_uri: &OriginalUri,
) -> RouteResult<Arc<PushProvider>> {
    tracking.push.clone().ok_or_else(|| {
        RouteErrorResponse::new(StatusCode::CONFLICT)
            .with_message("Positions are replayed from a track file.")
            .at(method, original_uri)
    })
}

async fn push_position(
    original_uri: OriginalUri,
    State(WebState { tracking, .. }): State<WebState>,
    Json(push): Json<PositionPush>,
) -> RouteResult<StatusCode> {
    let provider = push_provider(&tracking, &Method::POST, &original_uri)?;
    let event = match (push.position, push.error) {
        (Some(position), None) => Ok(position),
        (None, Some(error)) => Err(error),
        _ => {
            return Err(RouteErrorResponse::new(StatusCode::UNPROCESSABLE_ENTITY)
                .with_message("Send either a position or an error.")
                .at(&Method::POST, &original_uri))
        }
    };

    if provider.push(event) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(RouteErrorResponse::new(StatusCode::CONFLICT)
            .with_message("Tracking is not running.")
            .at(&Method::POST, &original_uri))
    }
}

async fn set_permission(
    original_uri: OriginalUri,
    State(WebState { tracking, .. }): State<WebState>,
    Json(update): Json<PermissionUpdate>,
) -> RouteResult<StatusCode> {
    push_provider(&tracking, &Method::PUT, &original_uri)?.set_permission(update.permission);
    Ok(StatusCode::NO_CONTENT)
}
