use std::sync::Arc;

use axum::{
    routing::{get, on},
    Extension, Json, Router,
};

use crate::{
    common::{route_not_found, METHOD_FILTER_ALL},
    hateoas,
    middleware::base_url::{base_url_middleware, BaseUrl},
    WebState,
};

mod auth;
mod route;
mod segments;
mod tracking;

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::resource!("/v1{}", format_args!($($arg)*))
    };
}
pub(crate) use resource;

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/", get(index))
        .nest_service("/route", route::routes(state.clone()))
        .nest_service("/segments", segments::routes(state.clone()))
        .nest_service("/tracking", tracking::routes(state.clone()))
        .nest_service("/auth", auth::routes(state.clone()))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

async fn index(Extension(base_url): Extension<Arc<BaseUrl>>) -> Json<hateoas::Response<()>> {
    hateoas::Response::builder((), base_url)
        .link("route", route::resource!(""))
        .link("segments", segments::resource!(""))
        .link("tracking", tracking::resource!(""))
        .link("profile", auth::resource!("/profile"))
        .build()
        .json()
}
