use std::sync::Arc;

use axum::{
    extract::{OriginalUri, State},
    http::{Method, StatusCode},
    routing::{get, on, post},
    Extension, Json, Router,
};
use identity::{IdentityError, Registration};
use model::profile::{Profile, ProfileUpdate};
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{
    common::{route_not_found, HateoasResult, RouteErrorResponse, RouteResult, METHOD_FILTER_ALL},
    hateoas,
    middleware::base_url::{base_url_middleware, BaseUrl},
    WebState,
};

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::v1::resource!("/auth{}", format_args!($($arg)*))
    };
}
pub(crate) use resource;

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/password-reset", post(request_password_reset))
        .route("/profile", get(get_profile).patch(update_profile))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    /// email or CPF
    identifier: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PasswordResetRequest {
    email: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct Registered {
    id: Id<Profile>,
}

fn profile_hateoas(profile: Profile, base_url: Arc<BaseUrl>) -> hateoas::Response<Profile> {
    hateoas::Response::builder(profile, base_url)
        .link("self", resource!("/profile"))
        .action("logout", resource!("/logout"))
        .build()
}

async fn login(
    original_uri: OriginalUri,
    State(WebState { auth, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Json(request): Json<LoginRequest>,
) -> HateoasResult<Profile> {
    auth.login(&request.identifier, &request.password)
        .await
        .map(|profile| profile_hateoas(profile, base_url).json())
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))
}

async fn register(
    original_uri: OriginalUri,
    State(WebState { auth, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Json(registration): Json<Registration>,
) -> RouteResult<(StatusCode, Json<hateoas::Response<Registered>>)> {
    let id = auth
        .register(registration)
        .await
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))?;
    let response = hateoas::Response::builder(Registered { id }, base_url)
        .action("login", resource!("/login"))
        .build();
    Ok((StatusCode::CREATED, response.json()))
}

async fn logout(
    original_uri: OriginalUri,
    State(WebState { auth, .. }): State<WebState>,
) -> RouteResult<StatusCode> {
    auth.logout()
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))
}

/// Answers 202 whether or not the address is registered.
async fn request_password_reset(
    original_uri: OriginalUri,
    State(WebState { auth, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Json(request): Json<PasswordResetRequest>,
) -> RouteResult<StatusCode> {
    let redirect_to = base_url.full_url("/");
    auth.request_password_reset(&request.email, Some(&redirect_to))
        .await
        .map(|_| StatusCode::ACCEPTED)
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))
}

async fn get_profile(
    original_uri: OriginalUri,
    State(WebState { auth, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<Profile> {
    auth.current_profile()
        .await
        .and_then(|profile| profile.ok_or(IdentityError::NotLoggedIn))
        .map(|profile| profile_hateoas(profile, base_url).json())
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::GET, &original_uri))
}

async fn update_profile(
    original_uri: OriginalUri,
    State(WebState { auth, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Json(update): Json<ProfileUpdate>,
) -> HateoasResult<Profile> {
    auth.update_profile(update)
        .await
        .map(|profile| profile_hateoas(profile, base_url).json())
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::PATCH, &original_uri))
}
