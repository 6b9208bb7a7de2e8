use std::sync::Arc;

use axum::{
    extract::{OriginalUri, State},
    http::Method,
    routing::{get, on},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use model::{position::Position, route::Route, segment::Segment, Progress};
use serde::Serialize;
use utility::id::Id;

use crate::{
    common::{route_not_found, schema, HateoasResult, RouteErrorResponse, METHOD_FILTER_ALL},
    hateoas,
    middleware::base_url::{base_url_middleware, BaseUrl},
    WebState,
};

use super::segments::{segment_hateoas, SegmentDto};

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::v1::resource!("/route{}", format_args!($($arg)*))
    };
}
pub(crate) use resource;

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/schema", get(schema::<Route>))
        .route("/", get(get_route).put(put_route))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RouteDto {
    id: Id<Route>,
    name: String,
    due_date: NaiveDate,
    progress: Progress,
    active_segment: Option<Id<Segment>>,
    segments: Vec<hateoas::Response<SegmentDto>>,
}

async fn get_route(
    State(WebState {
        store, tracking, ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<RouteDto> {
    let position = tracking.session.last_position();
    Ok(route_hateoas(&store.snapshot(), position.as_ref(), base_url).json())
}

/// Replaces the assigned route, discarding all progress.
async fn put_route(
    original_uri: OriginalUri,
    State(WebState { store, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Json(route): Json<Route>,
) -> HateoasResult<RouteDto> {
    store
        .load(route)
        .await
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::PUT, &original_uri))?;
    Ok(route_hateoas(&store.snapshot(), None, base_url).json())
}

pub(crate) fn route_hateoas(
    route: &Route,
    position: Option<&Position>,
    base_url: Arc<BaseUrl>,
) -> hateoas::Response<RouteDto> {
    let active_segment = route.active_segment().map(|segment| segment.id.clone());
    let dto = RouteDto {
        id: route.id.clone(),
        name: route.name.clone(),
        due_date: route.due_date,
        progress: route.progress(),
        active_segment: active_segment.clone(),
        segments: route
            .segments
            .iter()
            .map(|segment| segment_hateoas(segment.clone(), position, base_url.clone()))
            .collect(),
    };

    let mut builder = hateoas::Response::builder(dto, base_url)
        .link("self", resource!(""))
        .link("schema", resource!("/schema"));
    if let Some(id) = active_segment {
        builder = builder.link("activeSegment", super::segments::resource!("/{}", id));
    }
    builder.build()
}
