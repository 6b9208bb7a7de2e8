use std::{env, future::Future, time::Duration};

use model::position::Coordinates;
use reqwest::{StatusCode, Url};

use crate::{
    model::{DirectionsResponse, DirectionsRoute, Polyline},
    ApiError,
};

pub const MAPBOX_DIRECTIONS_URL: &str = "https://api.mapbox.com/directions/v5/mapbox/driving";

/// Waypoints per request besides the start.
pub const MAX_DESTINATIONS: usize = 24;
pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Clone, Debug)]
pub struct DirectionsConfig {
    pub access_token: String,
    pub base_url: String,
}

impl DirectionsConfig {
    /// Reads `MAPBOX_ACCESS_TOKEN` and optionally `MAPBOX_BASE_URL`.
    pub fn from_env() -> Result<Self, ApiError> {
        let access_token = env::var("MAPBOX_ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or(ApiError::MissingAccessToken)?;
        let base_url =
            env::var("MAPBOX_BASE_URL").unwrap_or_else(|_| MAPBOX_DIRECTIONS_URL.to_owned());
        Ok(Self {
            access_token,
            base_url,
        })
    }
}

/// Splits a trip into requests of at most [`MAX_DESTINATIONS`] stops. Every
/// request starts where the previous one ended. Invalid destinations are
/// dropped, an invalid origin is an error.
pub fn plan_legs(
    origin: Coordinates,
    destinations: &[Coordinates],
) -> Result<Vec<Vec<Coordinates>>, ApiError> {
    if !origin.is_valid() {
        return Err(ApiError::InvalidCoordinates(format!("origin {origin}")));
    }
    let valid: Vec<Coordinates> = destinations
        .iter()
        .filter(|destination| {
            let valid = destination.is_valid();
            if !valid {
                log::warn!("dropping invalid destination {destination}");
            }
            valid
        })
        .copied()
        .collect();
    if valid.is_empty() {
        return Err(ApiError::InvalidCoordinates(
            "no valid destination".to_owned(),
        ));
    }

    let mut start = origin;
    Ok(valid
        .chunks(MAX_DESTINATIONS)
        .map(|chunk| {
            let mut leg = Vec::with_capacity(chunk.len() + 1);
            leg.push(start);
            leg.extend_from_slice(chunk);
            if let Some(last) = chunk.last() {
                start = *last;
            }
            leg
        })
        .collect())
}

/// Runs `operation` until it succeeds, fails permanently or `attempts` are
/// used up. Attempt `n` is followed by a pause of `delay × n`.
pub async fn retry<T, F, Fut>(attempts: u32, delay: Duration, mut operation: F) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(why) if why.is_transient() && attempt < attempts => {
                let pause = delay * attempt;
                log::warn!("attempt {attempt}/{attempts} failed, retrying in {pause:?}: {why}");
                tokio::time::sleep(pause).await;
                attempt += 1;
            }
            Err(why) => return Err(why),
        }
    }
}

pub struct DirectionsClient {
    pub config: DirectionsConfig,
    client: reqwest::Client,
}

impl DirectionsClient {
    pub fn new(config: DirectionsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Ok(Self::new(DirectionsConfig::from_env()?))
    }

    fn url(&self, coordinates: &[Coordinates]) -> Result<Url, ApiError> {
        let path = coordinates
            .iter()
            .map(|coordinates| coordinates.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let base = self.config.base_url.trim_end_matches('/');
        Url::parse_with_params(
            &format!("{base}/{path}"),
            &[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("steps", "true"),
                ("alternatives", "false"),
                ("access_token", self.config.access_token.as_str()),
            ],
        )
        .map_err(|why| ApiError::InvalidCoordinates(why.to_string()))
    }

    async fn fetch_leg(&self, url: &Url) -> Result<DirectionsRoute, ApiError> {
        // the token is part of the query, keep it out of errors and logs
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let path = url.path().to_owned();

        let response: DirectionsResponse = match response.status() {
            StatusCode::OK => serde_json::from_str(&response.text().await?)?,
            StatusCode::TOO_MANY_REQUESTS => return Err(ApiError::RateLimitReached),
            other => {
                return Err(ApiError::InvalidResponse {
                    status_code: other,
                    url: path,
                    response: response.text().await.ok(),
                })
            }
        };
        if response.code != "Ok" {
            return Err(ApiError::NoRoute(
                response.message.unwrap_or(response.code),
            ));
        }
        response
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NoRoute("empty route list".to_owned()))
    }

    /// Driving path from `origin` through `destinations` in the given order.
    pub async fn get_optimized_route(
        &self,
        origin: Coordinates,
        destinations: &[Coordinates],
    ) -> Result<Polyline, ApiError> {
        let legs = plan_legs(origin, destinations)?;
        log::debug!(
            "requesting directions for {} stops in {} requests",
            destinations.len(),
            legs.len()
        );

        let mut polyline = Polyline::default();
        for leg in legs {
            let url = self.url(&leg)?;
            let route = retry(RETRY_ATTEMPTS, RETRY_DELAY, |_| self.fetch_leg(&url)).await?;
            polyline.extend(route);
        }

        if polyline.coordinates.len() < 2 {
            return Err(ApiError::NoRoute(
                "route has fewer than 2 points".to_owned(),
            ));
        }
        Ok(polyline)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use tokio::time::Instant;

    use super::*;

    fn stops(count: usize) -> Vec<Coordinates> {
        (0..count)
            .map(|i| Coordinates::new(-46.66 - i as f64 * 0.001, -23.55))
            .collect()
    }

    fn unavailable() -> ApiError {
        ApiError::InvalidResponse {
            status_code: StatusCode::SERVICE_UNAVAILABLE,
            url: "/directions".to_owned(),
            response: None,
        }
    }

    #[test]
    fn invalid_origin_is_rejected() {
        for origin in [
            Coordinates::new(0.0, -23.55),
            Coordinates::new(-46.66, 0.0),
            Coordinates::new(181.0, -23.55),
            Coordinates::new(-46.66, f64::NAN),
        ] {
            assert!(matches!(
                plan_legs(origin, &stops(2)),
                Err(ApiError::InvalidCoordinates(_))
            ));
        }
    }

    #[test]
    fn invalid_destinations_are_dropped() {
        let origin = Coordinates::new(-46.65, -23.55);
        let mut destinations = stops(2);
        destinations.insert(1, Coordinates::new(0.0, 0.0));

        let legs = plan_legs(origin, &destinations).unwrap();
        assert_eq!(legs, vec![vec![origin, destinations[0], destinations[2]]]);

        let result = plan_legs(origin, &[Coordinates::new(0.0, 0.0)]);
        assert!(matches!(result, Err(ApiError::InvalidCoordinates(_))));
    }

    #[test]
    fn long_trips_are_chunked() {
        let origin = Coordinates::new(-46.65, -23.55);
        let destinations = stops(50);
        let legs = plan_legs(origin, &destinations).unwrap();

        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0].len(), MAX_DESTINATIONS + 1);
        assert_eq!(legs[1].len(), MAX_DESTINATIONS + 1);
        assert_eq!(legs[2].len(), 3);
        assert_eq!(legs[0][0], origin);
        assert_eq!(legs[1][0], destinations[23]);
        assert_eq!(legs[2][0], destinations[47]);
        assert_eq!(legs[2][2], destinations[49]);
    }

    #[test]
    fn request_url() {
        let client = DirectionsClient::new(DirectionsConfig {
            access_token: "pk.test".to_owned(),
            base_url: "https://api.mapbox.com/directions/v5/mapbox/driving/".to_owned(),
        });
        let url = client
            .url(&[Coordinates::new(-46.66, -23.55), Coordinates::new(-46.67, -23.56)])
            .unwrap();
        assert_eq!(
            url.path(),
            "/directions/v5/mapbox/driving/-46.66,-23.55;-46.67,-23.56"
        );
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("geometries".to_owned(), "geojson".to_owned())));
        assert!(query.contains(&("overview".to_owned(), "full".to_owned())));
        assert!(query.contains(&("access_token".to_owned(), "pk.test".to_owned())));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_linearly() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let result = retry(RETRY_ATTEMPTS, RETRY_DELAY, |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(unavailable())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_capped() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = retry(RETRY_ATTEMPTS, RETRY_DELAY, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::RateLimitReached)
            }
        })
        .await;
        assert!(matches!(result, Err(ApiError::RateLimitReached)));
        assert_eq!(calls.load(Ordering::SeqCst), RETRY_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = retry(RETRY_ATTEMPTS, RETRY_DELAY, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::InvalidResponse {
                    status_code: StatusCode::UNAUTHORIZED,
                    url: "/directions".to_owned(),
                    response: None,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
