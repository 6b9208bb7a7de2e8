use axum::{
    extract::{OriginalUri, Query, Request},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::MethodFilter,
    Json,
};
use directions::ApiError;
use identity::IdentityError;
use model::ExampleData;
use route_execution::ExecutionError;
use schemars::{schema_for, schema_for_value, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::hateoas;

pub type RouteResult<O> = Result<O, RouteErrorResponse>;
pub type HateoasResult<O> = RouteResult<Json<hateoas::Response<O>>>;

/// A `MethodFilter` that matches all http methods.
pub(crate) const METHOD_FILTER_ALL: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PATCH)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VecResponse<T> {
    pub data: Vec<T>,
}

impl<T> VecResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }

    pub fn hateoas(self) -> hateoas::Response<Self> {
        hateoas::Response::new(self)
    }
}

// - Services returning commonly used responses -

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SchemaParams {
    #[serde(default = "Default::default")]
    example_data: bool,
}

pub(crate) async fn schema<T: ExampleData + JsonSchema + Serialize>(
    Query(params): Query<SchemaParams>,
) -> impl IntoResponse {
    if params.example_data {
        Json(schema_for_value!(T::example_data()))
    } else {
        Json(schema_for!(T))
    }
}

pub(crate) async fn route_not_found(
    OriginalUri(original_uri): OriginalUri,
    req: Request,
) -> impl IntoResponse {
    RouteErrorResponse::not_found(req.method(), original_uri.path())
}

// - Commonly used responeses -

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteErrorResponse {
    #[serde(skip)]
    pub status_code: StatusCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_information: Option<String>,
}

impl RouteErrorResponse {
    pub fn new(status_code: StatusCode) -> Self {
        Self {
            status_code,
            http_method: None,
            requested_uri: None,
            message: None,
            detailed_information: None,
        }
    }

    pub fn not_found(method: &Method, uri: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND)
            .with_method(method)
            .with_uri(uri)
            .with_default_message()
    }

    pub fn with_method(mut self, method: &Method) -> Self {
        self.http_method = Some(method.to_string());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.requested_uri = Some(uri.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_default_message(self) -> Self {
        let message = self
            .status_code
            .canonical_reason()
            .unwrap_or("i dunno what happened here :/");
        self.with_message(message)
    }

    pub fn with_detailed_information(mut self, message: impl Into<String>) -> Self {
        self.detailed_information = Some(message.into());
        self
    }

    /// Attaches method and uri of the failed request.
    pub fn at(self, method: &Method, uri: &OriginalUri) -> Self {
        self.with_method(method).with_uri(uri.path())
    }
}

impl From<ExecutionError> for RouteErrorResponse {
    fn from(value: ExecutionError) -> Self {
        let status_code = match &value {
            ExecutionError::SegmentNotFound(_) | ExecutionError::PointNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ExecutionError::Conflict { .. } => StatusCode::CONFLICT,
            ExecutionError::InvalidTransition { .. }
            | ExecutionError::NotStarted { .. }
            | ExecutionError::JustificationRequired { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExecutionError::ManualExecutionDisabled => StatusCode::FORBIDDEN,
            ExecutionError::InvalidRoute(_) => StatusCode::BAD_REQUEST,
            ExecutionError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status_code).with_message(value.to_string())
    }
}

impl From<IdentityError> for RouteErrorResponse {
    fn from(value: IdentityError) -> Self {
        let status_code = match &value {
            IdentityError::MissingFields
            | IdentityError::InvalidCpf
            | IdentityError::InvalidEmail => StatusCode::UNPROCESSABLE_ENTITY,
            IdentityError::UserNotFound | IdentityError::ProfileNotFound => {
                StatusCode::NOT_FOUND
            }
            IdentityError::WrongPassword | IdentityError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            IdentityError::CpfAlreadyRegistered | IdentityError::EmailAlreadyRegistered => {
                StatusCode::CONFLICT
            }
            IdentityError::Backend(_) => StatusCode::BAD_GATEWAY,
            IdentityError::StorageError(_) | IdentityError::JsonError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status_code).with_message(value.to_string())
    }
}

impl From<ApiError> for RouteErrorResponse {
    fn from(value: ApiError) -> Self {
        match value {
            ApiError::InvalidCoordinates(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY).with_message(value.to_string())
            }
            ApiError::NoRoute(_) => {
                Self::new(StatusCode::NOT_FOUND).with_message(value.to_string())
            }
            ApiError::MissingAccessToken => Self::new(StatusCode::SERVICE_UNAVAILABLE)
                .with_message("Directions are not configured."),
            other => Self::new(StatusCode::BAD_GATEWAY)
                .with_message("The directions service failed.")
                .with_detailed_information(other.to_string()),
        }
    }
}

impl IntoResponse for RouteErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use model::segment::SegmentStatus;
    use utility::id::Id;

    use super::*;

    #[test]
    fn execution_errors_map_to_status_codes() {
        let conflict = ExecutionError::Conflict {
            requested: Id::from("seg3"),
            active: Id::from("seg2"),
        };
        assert_eq!(
            RouteErrorResponse::from(conflict).status_code,
            StatusCode::CONFLICT
        );

        let justification = ExecutionError::JustificationRequired {
            segment: Id::from("seg2"),
            unexecuted: 3,
        };
        let response = RouteErrorResponse::from(justification);
        assert_eq!(response.status_code, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.message.unwrap().contains("3 unexecuted points"));

        let transition = ExecutionError::InvalidTransition {
            segment: Id::from("seg1"),
            from: SegmentStatus::Completed,
            to: SegmentStatus::Started,
        };
        assert_eq!(
            RouteErrorResponse::from(transition).status_code,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            RouteErrorResponse::from(ExecutionError::SegmentNotFound(Id::from("x"))).status_code,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn identity_errors_map_to_status_codes() {
        assert_eq!(
            RouteErrorResponse::from(IdentityError::WrongPassword).status_code,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RouteErrorResponse::from(IdentityError::CpfAlreadyRegistered).status_code,
            StatusCode::CONFLICT
        );
    }
}
