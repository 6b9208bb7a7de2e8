use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{Method, StatusCode},
    routing::{get, on, post},
    Extension, Json, Router,
};
use model::{
    position::{Coordinates, Position},
    segment::{NextPoint, Segment, SegmentStatus},
    Progress,
};
use route_execution::PointExecution;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{
    common::{route_not_found, HateoasResult, RouteErrorResponse, VecResponse, METHOD_FILTER_ALL},
    hateoas,
    middleware::base_url::{base_url_middleware, BaseUrl},
    WebState,
};

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::v1::resource!("/segments{}", format_args!($($arg)*))
    };
}
pub(crate) use resource;

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/", get(get_segments))
        .route("/:id", get(get_segment))
        .route("/:id/start", post(start_segment))
        .route("/:id/resume", post(resume_segment))
        .route("/:id/finish", post(finish_segment))
        .route("/:id/points/:point_id/execute", post(execute_point))
        .route("/:id/directions", get(get_directions))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SegmentDto {
    #[serde(flatten)]
    segment: Segment,
    progress: Progress,
    /// relative to the last tracked position
    #[serde(skip_serializing_if = "Option::is_none")]
    next_point: Option<NextPoint>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FinishRequest {
    justification: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectionsQuery {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

async fn get_segments(
    State(WebState {
        store, tracking, ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> Json<hateoas::Response<VecResponse<hateoas::Response<SegmentDto>>>> {
    let position = tracking.session.last_position();
    let segments = store
        .snapshot()
        .segments
        .iter()
        .map(|segment| segment_hateoas(segment.clone(), position.as_ref(), base_url.clone()))
        .collect();
    VecResponse::new(segments).hateoas().json()
}

async fn get_segment(
    original_uri: OriginalUri,
    Path(id): Path<String>,
    State(WebState {
        store, tracking, ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<SegmentDto> {
    let position = tracking.session.last_position();
    let id: Id<Segment> = Id::new(id);
    store
        .snapshot()
        .segment(&id)
        .cloned()
        .map(|segment| segment_hateoas(segment, position.as_ref(), base_url).json())
        .ok_or_else(|| {
            RouteErrorResponse::new(StatusCode::NOT_FOUND)
                .with_message(format!("Segment '{id}' does not exist."))
                .at(&Method::GET, &original_uri)
        })
}

async fn start_segment(
    original_uri: OriginalUri,
    Path(id): Path<String>,
    State(WebState {
        store, tracking, ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<SegmentDto> {
    let position = tracking.session.last_position();
    store
        .start(&Id::new(id))
        .await
        .map(|segment| segment_hateoas(segment, position.as_ref(), base_url).json())
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))
}

async fn resume_segment(
    original_uri: OriginalUri,
    Path(id): Path<String>,
    State(WebState {
        store, tracking, ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<SegmentDto> {
    let position = tracking.session.last_position();
    store
        .resume(&Id::new(id))
        .await
        .map(|segment| segment_hateoas(segment, position.as_ref(), base_url).json())
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))
}

async fn finish_segment(
    original_uri: OriginalUri,
    Path(id): Path<String>,
    State(WebState {
        store, tracking, ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    body: Option<Json<FinishRequest>>,
) -> HateoasResult<SegmentDto> {
    let position = tracking.session.last_position();
    let request = body.map(|Json(request)| request).unwrap_or_default();
    store
        .finish(&Id::new(id), request.justification)
        .await
        .map(|segment| segment_hateoas(segment, position.as_ref(), base_url).json())
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))
}

/// Manual override for a point whose geofence can not be reached.
async fn execute_point(
    original_uri: OriginalUri,
    Path((id, point_id)): Path<(String, String)>,
    State(WebState { store, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<PointExecution> {
    let execution = store
        .mark_executed_manually(&Id::new(id), &Id::new(point_id))
        .await
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))?;
    let segment = resource!("/{}", execution.segment);
    Ok(hateoas::Response::builder(execution, base_url)
        .link("segment", segment)
        .build()
        .json())
}

/// Driving directions from the given or last tracked position through the
/// unexecuted points of a segment.
async fn get_directions(
    original_uri: OriginalUri,
    Path(id): Path<String>,
    Query(query): Query<DirectionsQuery>,
    State(WebState {
        store,
        tracking,
        directions: client,
        ..
    }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<directions::Polyline> {
    let fail = |why: RouteErrorResponse| why.at(&Method::GET, &original_uri);

    let client = client.ok_or_else(|| {
        fail(RouteErrorResponse::from(directions::ApiError::MissingAccessToken))
    })?;
    let id: Id<Segment> = Id::new(id);
    let snapshot = store.snapshot();
    let segment = snapshot.segment(&id).ok_or_else(|| {
        fail(RouteErrorResponse::from(
            route_execution::ExecutionError::SegmentNotFound(id.clone()),
        ))
    })?;

    let origin = match (query.latitude, query.longitude) {
        (Some(latitude), Some(longitude)) => Coordinates::new(longitude, latitude),
        _ => tracking
            .session
            .last_position()
            .map(|position| position.coordinates())
            .ok_or_else(|| {
                fail(
                    RouteErrorResponse::new(StatusCode::UNPROCESSABLE_ENTITY)
                        .with_message("No position known. Pass latitude and longitude."),
                )
            })?,
    };
    let destinations: Vec<Coordinates> = segment
        .unexecuted_points()
        .map(|point| Coordinates::new(point.longitude, point.latitude))
        .collect();

    let polyline = client
        .get_optimized_route(origin, &destinations)
        .await
        .map_err(|why| fail(RouteErrorResponse::from(why)))?;
    Ok(hateoas::Response::builder(polyline, base_url)
        .link("segment", resource!("/{}", id))
        .debug_info("destinations", destinations.len())
        .build()
        .json())
}

pub(crate) fn segment_hateoas(
    segment: Segment,
    position: Option<&Position>,
    base_url: Arc<BaseUrl>,
) -> hateoas::Response<SegmentDto> {
    let id = segment.id.clone();
    let status = segment.status;
    let dto = SegmentDto {
        progress: segment.progress(),
        next_point: position.and_then(|position| segment.next_point(position)),
        segment,
    };
    hateoas::Response::builder(dto, base_url)
        .link("self", resource!("/{}", id))
        .link("directions", resource!("/{}/directions", id))
        .action_if(
            status == SegmentStatus::Pending,
            "start",
            resource!("/{}/start", id),
        )
        .action_if(
            status == SegmentStatus::Incomplete,
            "resume",
            resource!("/{}/resume", id),
        )
        .action_if(
            status == SegmentStatus::Started,
            "finish",
            resource!("/{}/finish", id),
        )
        .build()
}
