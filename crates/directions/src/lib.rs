use std::{error, fmt, sync::Arc};

pub mod client;
pub mod model;

pub use client::{DirectionsClient, DirectionsConfig};
pub use model::Polyline;

#[derive(Debug, Clone)]
pub enum ApiError {
    RequestError(Arc<reqwest::Error>),
    JsonError(Arc<serde_json::Error>),
    InvalidResponse {
        status_code: reqwest::StatusCode,
        url: String,
        response: Option<String>,
    },
    RateLimitReached,
    InvalidCoordinates(String),
    /// The service answered but found no usable route.
    NoRoute(String),
    MissingAccessToken,
}

impl ApiError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestError(_) | Self::RateLimitReached => true,
            Self::InvalidResponse { status_code, .. } => status_code.is_server_error(),
            _ => false,
        }
    }
}

impl error::Error for ApiError {}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::RequestError(e) => write!(f, "HTTP request error: {}", e),
            ApiError::JsonError(e) => write!(f, "JSON parse error: {}", e),
            ApiError::InvalidResponse {
                status_code,
                url,
                response,
            } => match response {
                Some(text) => {
                    write!(f, "Invalid Response ({}) {}: {}", status_code, text, url)
                }
                None => write!(f, "Invalid Response({}) {}", status_code, url),
            },
            ApiError::RateLimitReached => write!(f, "Rate limit reached."),
            ApiError::InvalidCoordinates(why) => write!(f, "Invalid coordinates: {why}"),
            ApiError::NoRoute(why) => write!(f, "No route found: {why}"),
            ApiError::MissingAccessToken => {
                write!(f, "MAPBOX_ACCESS_TOKEN is not set.")
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::RequestError(Arc::new(e))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::JsonError(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    fn status(status_code: StatusCode) -> ApiError {
        ApiError::InvalidResponse {
            status_code,
            url: "https://example.invalid".to_owned(),
            response: None,
        }
    }

    #[test]
    fn transient_errors() {
        assert!(ApiError::RateLimitReached.is_transient());
        assert!(status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(!status(StatusCode::UNAUTHORIZED).is_transient());
        assert!(!status(StatusCode::UNPROCESSABLE_ENTITY).is_transient());
        assert!(!ApiError::NoRoute("NoRoute".to_owned()).is_transient());
    }
}
